use super::run_captured;
use nmfit::engine::collaborators::{CollaboratorError, StructureAligner};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::debug;

/// Least-squares structural alignment via ProFit. Each call writes a short
/// fitting script, runs ProFit in batch mode, and scrapes the reported RMS
/// from its output.
#[derive(Debug, Clone)]
pub struct ProFit {
    path: PathBuf,
}

impl ProFit {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

fn parse_rms(output: &str) -> Option<f64> {
    output
        .lines()
        .filter_map(|line| line.split("RMS:").nth(1))
        .filter_map(|value| value.trim().parse::<f64>().ok())
        .last()
}

impl StructureAligner for ProFit {
    fn rmsd(&self, reference: &Path, mobile: &Path) -> Result<f64, CollaboratorError> {
        let parent = mobile
            .parent()
            .ok_or_else(|| CollaboratorError::new("profit", "mobile path has no parent"))?;
        let stem = mobile
            .file_stem()
            .and_then(|n| n.to_str())
            .ok_or_else(|| CollaboratorError::new("profit", "mobile path has no file stem"))?;

        let script_path = parent.join(format!(".{stem}_profit.txt"));
        let script = format!(
            "reference {}\nmobile {}\nfit\nquit\n",
            reference.display(),
            mobile.display()
        );
        fs::write(&script_path, script)
            .map_err(|e| CollaboratorError::new("profit", format!("failed to write script: {e}")))?;

        debug!(mobile = %mobile.display(), "Computing RMSD.");
        let result = run_captured(
            "profit",
            Command::new(&self.path).args(["-h", "-f"]).arg(&script_path),
        );
        let _ = fs::remove_file(&script_path);
        let output = result?;

        let text = String::from_utf8_lossy(&output.stdout);
        parse_rms(&text).ok_or_else(|| {
            CollaboratorError::new("profit", "no RMS value in the fitting output")
                .with_output(text.into_owned())
        })
    }
}
