use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Formats an amplitude for file naming: integral values lose the trailing
/// `.0` so the truncated-half schedule yields names like `7#-5.pdb`.
pub fn format_amplitude(amplitude: f64) -> String {
    if amplitude.fract() == 0.0 {
        format!("{}", amplitude as i64)
    } else {
        format!("{amplitude}")
    }
}

/// File name of one perturbed structure within an iteration's modes
/// directory: `{mode}#{amplitude}.{ext}`.
pub fn perturbed_file_name(mode: u32, amplitude: f64, extension: &str) -> String {
    format!("{mode}#{}.{extension}", format_amplitude(amplitude))
}

/// Mutable bookkeeping of one refinement run, owned exclusively by the
/// iteration controller and advanced only at iteration boundaries.
///
/// Iteration `N` lives in `{root}/{base}#s{N}/`, holding that step's
/// structure `{base}#s{N}.{ext}` and a `modes/` subdirectory with the
/// iteration's mode basis and perturbed structures. Accepted structures are
/// also collected under `{root}/summary/`.
#[derive(Debug)]
pub struct RunState {
    root: PathBuf,
    base_name: String,
    extension: String,
    step: u64,
}

impl RunState {
    pub fn new(root: &Path, base_name: &str, extension: &str) -> Self {
        Self {
            root: root.to_path_buf(),
            base_name: base_name.to_string(),
            extension: extension.to_string(),
            step: 0,
        }
    }

    pub fn step(&self) -> u64 {
        self.step
    }

    /// How many deformations have been applied so far; coincides with the
    /// current step index.
    pub fn deformed_times(&self) -> usize {
        self.step as usize
    }

    pub fn conformation_name(&self) -> String {
        format!("{}#s{}", self.base_name, self.step)
    }

    pub fn next_conformation_name(&self) -> String {
        format!("{}#s{}", self.base_name, self.step + 1)
    }

    pub fn iteration_dir(&self) -> PathBuf {
        self.root.join(self.conformation_name())
    }

    pub fn modes_dir(&self) -> PathBuf {
        self.iteration_dir().join("modes")
    }

    pub fn structure_path(&self) -> PathBuf {
        self.iteration_dir()
            .join(format!("{}.{}", self.conformation_name(), self.extension))
    }

    pub fn next_structure_path(&self) -> PathBuf {
        self.root.join(self.next_conformation_name()).join(format!(
            "{}.{}",
            self.next_conformation_name(),
            self.extension
        ))
    }

    pub fn summary_dir(&self) -> PathBuf {
        self.root.join("summary")
    }

    /// Creates the current iteration's directory tree.
    pub fn prepare_iteration(&self) -> io::Result<()> {
        fs::create_dir_all(self.modes_dir())
    }

    /// Creates the directory the next iteration's structure will be written
    /// into.
    pub fn prepare_next_iteration(&self) -> io::Result<()> {
        fs::create_dir_all(self.root.join(self.next_conformation_name()))
    }

    /// Copies this step's structure into the summary directory, along with
    /// any rendered images the simulator left next to it.
    pub fn summarize_structure(&self) -> io::Result<()> {
        let summary = self.summary_dir();
        fs::create_dir_all(&summary)?;
        let name = self.conformation_name();
        fs::copy(
            self.structure_path(),
            summary.join(format!("{name}.{}", self.extension)),
        )?;
        for ext in ["tsv", "svg"] {
            let image = self.iteration_dir().join(format!("{name}.{ext}"));
            if image.is_file() {
                fs::copy(&image, summary.join(format!("{name}.{ext}")))?;
            }
        }
        Ok(())
    }

    pub fn advance(&mut self) {
        self.step += 1;
    }
}
