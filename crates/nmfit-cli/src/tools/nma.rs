use super::run_captured;
use nmfit::engine::collaborators::{CollaboratorError, NormalModeSolver};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// RTB normal-mode toolchain: `makebloc.pl` groups residues into rigid
/// blocks, `rtb2` diagonalizes the block Hessian, and `movemode.pl`
/// displaces a structure along one of the resulting mode files.
#[derive(Debug, Clone)]
pub struct RtbSolver {
    dir: PathBuf,
    /// How many mode vectors `rtb2` is asked to compute (`nvec`).
    mode_count: u32,
}

impl RtbSolver {
    pub fn new(dir: PathBuf, mode_count: u32) -> Self {
        Self { dir, mode_count }
    }

    fn script(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    fn write_rtb_input(&self, work_dir: &Path) -> Result<(), CollaboratorError> {
        let input = format!(
            " &inputs\n   cutoff = 8.00,\n   ncv = 60,\n   tol = 1e-18\n   nstep = 0,\n   nvec = {}\n /&\n\n",
            self.mode_count
        );
        fs::write(work_dir.join("rtb.inp"), input)
            .map_err(|e| CollaboratorError::new("rtb2", format!("failed to write rtb.inp: {e}")))
    }
}

/// Mode files are named `mov000.modNNN` with a zero-padded mode index.
fn mode_file_name(mode: u32) -> String {
    format!("mov000.mod{mode:03}")
}

impl NormalModeSolver for RtbSolver {
    fn compute_modes(&self, work_dir: &Path, structure: &Path) -> Result<(), CollaboratorError> {
        fs::create_dir_all(work_dir).map_err(|e| {
            CollaboratorError::new("rtb2", format!("failed to create mode directory: {e}"))
        })?;

        let file_name = structure
            .file_name()
            .ok_or_else(|| CollaboratorError::new("makebloc.pl", "structure path has no file name"))?;
        let local_structure = work_dir.join(file_name);
        fs::copy(structure, &local_structure).map_err(|e| {
            CollaboratorError::new("makebloc.pl", format!("failed to stage structure: {e}"))
        })?;

        debug!(?work_dir, "Building rigid blocks.");
        let blocks = run_captured(
            "makebloc.pl",
            Command::new(self.script("makebloc.pl"))
                .arg(file_name)
                .current_dir(work_dir),
        )?;
        fs::write(work_dir.join("pdb"), &blocks.stdout).map_err(|e| {
            CollaboratorError::new("makebloc.pl", format!("failed to write block file: {e}"))
        })?;

        self.write_rtb_input(work_dir)?;
        debug!(?work_dir, nvec = self.mode_count, "Diagonalizing block Hessian.");
        run_captured("rtb2", Command::new(self.script("rtb2")).current_dir(work_dir))?;
        Ok(())
    }

    fn perturb(
        &self,
        work_dir: &Path,
        structure: &Path,
        mode: u32,
        amplitude: f64,
        output: &Path,
    ) -> Result<(), CollaboratorError> {
        let mode_file = work_dir.join(mode_file_name(mode));
        let displaced = run_captured(
            "movemode.pl",
            Command::new(self.script("movemode.pl"))
                .arg(structure)
                .arg(&mode_file)
                .arg(format!("{amplitude}")),
        )?;
        fs::write(output, &displaced.stdout).map_err(|e| {
            CollaboratorError::new(
                "movemode.pl",
                format!("failed to write displaced structure: {e}"),
            )
        })
    }
}
