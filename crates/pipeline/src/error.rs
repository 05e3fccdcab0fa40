//! Pipeline errors

use crate::orchestrator::Stage;
use thiserror::Error;

/// Errors that abort a pipeline run
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Invalid parameter '{name}': {reason}")]
    InvalidParameter { name: &'static str, reason: String },

    /// A processing step failed; the step's own error is kept as the source
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: slopeclass_core::Error,
    },

    #[error("Cannot load parameters from '{path}': {reason}")]
    Config { path: String, reason: String },
}

impl PipelineError {
    /// The failed stage, if the error came from a processing step
    pub fn stage(&self) -> Option<Stage> {
        match self {
            PipelineError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PipelineError>;
