//! Generation error taxonomy.

use reel_models::FailureKind;
use thiserror::Error;

/// Result type for generation operations.
pub type GenResult<T> = Result<T, GenerationError>;

/// Errors surfaced by the generation service, classified for retry policy.
#[derive(Debug, Error)]
pub enum GenerationError {
    /// The service signaled resource exhaustion (429 / RESOURCE_EXHAUSTED).
    #[error("Generation quota exceeded: {0}")]
    QuotaExceeded(String),

    /// Network fault or 5xx-class server error.
    #[error("Transient generation failure: {0}")]
    Transient(String),

    /// Malformed prompt or reference asset; retrying cannot help.
    #[error("Generation request rejected: {0}")]
    Validation(String),

    /// The operation did not finish within the poll budget.
    #[error("Generation timed out after {0} seconds")]
    Timeout(u64),
}

impl GenerationError {
    pub fn quota_exceeded(msg: impl Into<String>) -> Self {
        Self::QuotaExceeded(msg.into())
    }

    pub fn transient(msg: impl Into<String>) -> Self {
        Self::Transient(msg.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Serializable classification for job records.
    pub fn kind(&self) -> FailureKind {
        match self {
            GenerationError::QuotaExceeded(_) => FailureKind::QuotaExceeded,
            GenerationError::Transient(_) => FailureKind::Transient,
            GenerationError::Validation(_) => FailureKind::Validation,
            GenerationError::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Whether the error class admits retries at all.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, GenerationError::Validation(_))
    }

    /// Whether this failure counts against the shared quota state.
    pub fn is_quota(&self) -> bool {
        matches!(self, GenerationError::QuotaExceeded(_))
    }

    /// Classify an HTTP status plus response body.
    pub fn from_status(status: u16, body: &str) -> Self {
        if status == 429 || body.contains("RESOURCE_EXHAUSTED") {
            return Self::QuotaExceeded(format!("HTTP {status}: {}", truncate(body, 200)));
        }
        match status {
            400 | 404 | 422 => Self::Validation(format!("HTTP {status}: {}", truncate(body, 200))),
            _ => Self::Transient(format!("HTTP {status}: {}", truncate(body, 200))),
        }
    }
}

impl From<reqwest::Error> for GenerationError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Transient(format!("request timed out: {e}"))
        } else {
            Self::Transient(e.to_string())
        }
    }
}

impl From<std::io::Error> for GenerationError {
    fn from(e: std::io::Error) -> Self {
        Self::Transient(format!("io error: {e}"))
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
