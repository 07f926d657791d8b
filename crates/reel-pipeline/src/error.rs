//! Pipeline error types.

use thiserror::Error;

pub type PipelineResult<T> = Result<T, PipelineError>;

/// Errors from the scheduling, assembly and orchestration layers.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Caller input or clip-set defect; retrying cannot help.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Concat/encode tool failure; retryable at whole-assembly granularity.
    #[error("Assembly failed: {0}")]
    Assembly(String),

    /// The run finished generation with failed shots and partial output was
    /// not accepted.
    #[error("Run incomplete: {failed} of {total} shots failed")]
    IncompleteRun { failed: u32, total: u32 },

    /// The run was cancelled cooperatively.
    #[error("Run cancelled")]
    Cancelled,

    #[error("Store error: {0}")]
    Store(#[from] reel_store::StoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn assembly(msg: impl Into<String>) -> Self {
        Self::Assembly(msg.into())
    }

    /// Whether the orchestrator may retry the whole assembly step.
    pub fn is_assembly_retryable(&self) -> bool {
        matches!(self, PipelineError::Assembly(_))
    }
}
