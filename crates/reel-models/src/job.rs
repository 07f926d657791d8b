//! Clip job lifecycle state.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::{ShotId, ShotSpec};

/// Classification of a generation failure.
///
/// This is the serializable mirror of the generation client's error
/// taxonomy; it is what gets persisted in job records and reported in the
/// run summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    /// Upstream service signaled resource exhaustion (retryable after cooldown)
    QuotaExceeded,
    /// Network / 5xx-class fault (retryable with backoff)
    Transient,
    /// Generation did not finish within the poll budget (retryable with backoff)
    Timeout,
    /// Malformed prompt or reference asset (never retried)
    Validation,
    /// Run was cancelled before the job reached a terminal state
    Canceled,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureKind::QuotaExceeded => "quota_exceeded",
            FailureKind::Transient => "transient",
            FailureKind::Timeout => "timeout",
            FailureKind::Validation => "validation",
            FailureKind::Canceled => "canceled",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Last error recorded on a job.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobError {
    /// Failure classification
    pub kind: FailureKind,
    /// Human-readable detail
    pub message: String,
}

impl JobError {
    pub fn new(kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// Job state in the scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Waiting to be dispatched (or waiting out a retry delay)
    #[default]
    Pending,
    /// Submitted to the generation service
    InFlight,
    /// Clip generated and persisted
    Completed,
    /// Gave up after exhausting retries (or a non-retryable error)
    Failed,
}

impl JobState {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobState::Pending => "pending",
            JobState::InFlight => "in_flight",
            JobState::Completed => "completed",
            JobState::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

impl fmt::Display for JobState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A shot spec wrapped with mutable lifecycle state.
///
/// Transitions are owned exclusively by the scheduler; workers report
/// results but never mutate job state directly.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ClipJob {
    /// The immutable shot specification
    pub spec: ShotSpec,

    /// Current lifecycle state
    #[serde(default)]
    pub state: JobState,

    /// Number of submission attempts so far
    #[serde(default)]
    pub attempts: u32,

    /// Last error observed (if any)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<JobError>,

    /// External operation handle for the in-flight generation (if async)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation_id: Option<String>,
}

impl ClipJob {
    /// Create a new pending job for a shot.
    pub fn new(spec: ShotSpec) -> Self {
        Self {
            spec,
            state: JobState::Pending,
            attempts: 0,
            last_error: None,
            operation_id: None,
        }
    }

    /// Shot id shorthand.
    pub fn shot_id(&self) -> ShotId {
        self.spec.id
    }

    /// Mark dispatched; bumps the attempt counter.
    pub fn start_attempt(&mut self) {
        self.state = JobState::InFlight;
        self.attempts += 1;
    }

    /// Mark completed.
    pub fn complete(&mut self) {
        self.state = JobState::Completed;
        self.last_error = None;
        self.operation_id = None;
    }

    /// Record a failure and return the job to Pending for a retry.
    pub fn retry_later(&mut self, error: JobError) {
        self.state = JobState::Pending;
        self.last_error = Some(error);
        self.operation_id = None;
    }

    /// Record the final failure.
    pub fn fail(&mut self, error: JobError) {
        self.state = JobState::Failed;
        self.last_error = Some(error);
        self.operation_id = None;
    }

    /// Persisted row for this job.
    pub fn record(&self) -> JobRecord {
        JobRecord {
            shot_id: self.shot_id(),
            state: self.state,
            attempts: self.attempts,
            error: self.last_error.clone(),
        }
    }
}

/// Per-shot row in the persisted `status.json`, enabling resumption.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct JobRecord {
    /// Shot id
    pub shot_id: ShotId,
    /// Terminal or last-known state
    pub state: JobState,
    /// Attempts consumed
    pub attempts: u32,
    /// Error detail for failed jobs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(id: u32) -> ShotSpec {
        ShotSpec::new(id, "A slow pan across a rainy neon street", 8.0)
    }

    #[test]
    fn test_job_lifecycle() {
        let mut job = ClipJob::new(spec(1));
        assert_eq!(job.state, JobState::Pending);
        assert_eq!(job.attempts, 0);

        job.start_attempt();
        assert_eq!(job.state, JobState::InFlight);
        assert_eq!(job.attempts, 1);

        job.retry_later(JobError::new(FailureKind::Transient, "503"));
        assert_eq!(job.state, JobState::Pending);
        assert!(job.last_error.is_some());

        job.start_attempt();
        job.complete();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.attempts, 2);
        assert!(job.last_error.is_none());
        assert!(job.state.is_terminal());
    }

    #[test]
    fn test_failed_is_terminal() {
        let mut job = ClipJob::new(spec(2));
        job.start_attempt();
        job.fail(JobError::new(FailureKind::Validation, "prompt rejected"));

        assert!(job.state.is_terminal());
        let record = job.record();
        assert_eq!(record.attempts, 1);
        assert_eq!(record.error.unwrap().kind, FailureKind::Validation);
    }
}
