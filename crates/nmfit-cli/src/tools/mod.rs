pub mod afmize;
pub mod nma;
pub mod profit;

use nmfit::engine::collaborators::CollaboratorError;
use std::process::{Command, Output};

/// Runs a collaborator process with captured stdout and stderr. A non-zero
/// exit status is fatal and carries everything the tool printed, so the
/// operator sees the tool's own diagnostics instead of a bare exit code.
fn run_captured(tool: &'static str, command: &mut Command) -> Result<Output, CollaboratorError> {
    let output = command
        .output()
        .map_err(|e| CollaboratorError::new(tool, format!("failed to launch: {e}")))?;

    if !output.status.success() {
        return Err(CollaboratorError::new(tool, "exited with a failure status")
            .with_status(output.status.code())
            .with_output(combined_output(&output)));
    }
    Ok(output)
}

fn combined_output(output: &Output) -> String {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);
    match (stdout.trim().is_empty(), stderr.trim().is_empty()) {
        (true, true) => String::new(),
        (false, true) => stdout.into_owned(),
        (true, false) => stderr.into_owned(),
        (false, false) => format!("{stdout}\n{stderr}"),
    }
}
