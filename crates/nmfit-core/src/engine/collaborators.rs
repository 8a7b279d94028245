use super::config::RenderSettings;
use crate::core::image::HeightMap;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Failure of an external tool invoked by the engine. Fatal for the run: no
/// retry is attempted, and the captured diagnostic output is surfaced to the
/// operator verbatim.
#[derive(Debug, Error, Clone, PartialEq)]
pub struct CollaboratorError {
    pub tool: String,
    pub status: Option<i32>,
    pub message: String,
    /// Combined stdout/stderr captured from the tool, if any.
    pub captured_output: String,
}

impl fmt::Display for CollaboratorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tool)?;
        if let Some(code) = self.status {
            write!(f, " (exit status {code})")?;
        }
        write!(f, ": {}", self.message)?;
        if !self.captured_output.is_empty() {
            write!(f, "\n--- captured output ---\n{}", self.captured_output)?;
        }
        Ok(())
    }
}

impl CollaboratorError {
    pub fn new(tool: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            tool: tool.into(),
            status: None,
            message: message.into(),
            captured_output: String::new(),
        }
    }

    pub fn with_status(mut self, status: Option<i32>) -> Self {
        self.status = status;
        self
    }

    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        self.captured_output = output.into();
        self
    }
}

/// Normal-mode analysis and structure perturbation, typically backed by an
/// external RTB toolchain. Structures are opaque file handles; the engine
/// never parses them.
pub trait NormalModeSolver: Sync {
    /// Computes the mode basis of `structure`, leaving whatever files the
    /// perturbation step needs inside `work_dir`. Called once per iteration,
    /// before any perturbation of that iteration.
    fn compute_modes(&self, work_dir: &Path, structure: &Path) -> Result<(), CollaboratorError>;

    /// Displaces `structure` along one mode and writes the result to
    /// `output`. Amplitude 0 must be supported and means "no change";
    /// negative amplitudes displace in the opposite direction.
    fn perturb(
        &self,
        work_dir: &Path,
        structure: &Path,
        mode: u32,
        amplitude: f64,
        output: &Path,
    ) -> Result<(), CollaboratorError>;
}

/// Simulated image generation. All maps rendered within one run must share
/// the same sampled dimensions.
pub trait ImageRenderer: Sync {
    fn render(
        &self,
        structure: &Path,
        settings: &RenderSettings,
    ) -> Result<HeightMap, CollaboratorError>;
}

/// Structural alignment. Only the post-run RMSD annotation consumes this;
/// the move-selection loop never does.
pub trait StructureAligner {
    fn rmsd(&self, reference: &Path, mobile: &Path) -> Result<f64, CollaboratorError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_status_and_captured_output() {
        let err = CollaboratorError::new("afmize", "rendering failed")
            .with_status(Some(2))
            .with_output("probe radius missing");
        let text = err.to_string();
        assert!(text.contains("afmize (exit status 2): rendering failed"));
        assert!(text.contains("captured output"));
        assert!(text.contains("probe radius missing"));
    }

    #[test]
    fn display_omits_empty_output_block() {
        let err = CollaboratorError::new("rtb", "binary not found");
        assert_eq!(err.to_string(), "rtb: binary not found");
    }
}
