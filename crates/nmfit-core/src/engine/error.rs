use thiserror::Error;

use super::collaborators::CollaboratorError;
use super::trajectory::LogError;
use crate::core::image::ImageError;
use crate::core::io::tsv::TsvError;
use crate::core::stats::StatsError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Image(#[from] ImageError),

    #[error("Mode {mode}: only {count} amplitude sample(s) scored; slope regression needs at least 2")]
    InsufficientSamples { mode: u32, count: usize },

    #[error("No candidate move: sensitivity table holds no usable sample")]
    NoCandidateMove,

    #[error("External collaborator failed: {0}")]
    Collaborator(#[from] CollaboratorError),

    #[error("Exponential decay fit diverged: {source}")]
    FitDivergence {
        #[source]
        source: StatsError,
    },

    #[error("Trajectory log error: {0}")]
    Trajectory(#[from] LogError),

    #[error("Failed to read rendered height map: {0}")]
    HeightMap(#[from] TsvError),

    #[error("I/O error in run workspace: {0}")]
    Workspace(#[from] std::io::Error),

    #[error("Failed to persist sensitivity tables: {0}")]
    TablePersistence(#[from] csv::Error),

    #[error("Internal logic error: {0}")]
    Internal(String),
}
