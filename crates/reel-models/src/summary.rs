//! Run status snapshots and the final run summary.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::{JobError, JobRecord, JobState, RenditionFile, ShotId};

/// Unique identifier for a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct RunId(pub String);

impl RunId {
    /// Generate a new random run ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pipeline phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    /// Clip generation in progress
    #[default]
    Generating,
    /// All jobs terminal, renditions being encoded
    Assembling,
    /// Run finished with final outputs
    Completed,
    /// Run aborted (assembly failure, refusal, or cancellation)
    Failed,
}

impl RunPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunPhase::Generating => "generating",
            RunPhase::Assembling => "assembling",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, RunPhase::Completed | RunPhase::Failed)
    }
}

impl fmt::Display for RunPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Per-shot entry in a live status snapshot.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ShotProgress {
    pub shot_id: ShotId,
    pub state: JobState,
    pub attempts: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobError>,
}

/// Mid-run status, queryable by external callers at any time.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunStatus {
    /// Run identifier
    pub run_id: RunId,
    /// Current phase
    pub phase: RunPhase,
    /// Overall progress (0-100)
    pub percent: u8,
    /// Total shots in the run
    pub shots_total: u32,
    /// Shots completed so far
    pub shots_completed: u32,
    /// Shots failed so far
    pub shots_failed: u32,
    /// Whether the upstream quota is currently exhausted
    pub quota_paused: bool,
    /// Per-shot detail
    pub shots: Vec<ShotProgress>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When this snapshot was last updated
    pub updated_at: DateTime<Utc>,
}

impl RunStatus {
    /// Create a fresh status for a run of `shots_total` shots.
    pub fn new(run_id: RunId, shots_total: u32) -> Self {
        let now = Utc::now();
        Self {
            run_id,
            phase: RunPhase::Generating,
            percent: 0,
            shots_total,
            shots_completed: 0,
            shots_failed: 0,
            quota_paused: false,
            shots: Vec::new(),
            started_at: now,
            updated_at: now,
        }
    }

    /// Update the phase and bump the updated_at timestamp.
    pub fn set_phase(&mut self, phase: RunPhase) {
        self.phase = phase;
        self.updated_at = Utc::now();
    }

    /// Update progress (clamped to 100).
    pub fn set_percent(&mut self, percent: u8) {
        self.percent = percent.min(100);
        self.updated_at = Utc::now();
    }
}

/// Final machine-readable run report, serialized to `summary.json`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RunSummary {
    /// Run identifier
    pub run_id: RunId,
    /// Terminal phase (Completed or Failed)
    pub phase: RunPhase,
    /// Shots submitted to the scheduler
    pub shots_submitted: u32,
    /// Shots that produced a clip
    pub shots_completed: u32,
    /// Shots that exhausted retries or hit a non-retryable error
    pub shots_failed: u32,
    /// Retries consumed across all shots (attempts beyond the first)
    pub retries_consumed: u32,
    /// Encoded renditions (empty if assembly did not run)
    pub renditions: Vec<RenditionFile>,
    /// Thumbnail location (if assembly ran)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<std::path::PathBuf>,
    /// Total assembled duration in seconds
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_duration_seconds: Option<f64>,
    /// Hard-failure detail when the run did not complete
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
    /// When the run started
    pub started_at: DateTime<Utc>,
    /// When the run finished
    pub finished_at: DateTime<Utc>,
    /// Total wall-clock seconds
    pub wall_clock_seconds: f64,
    /// Every shot's final state and error detail
    pub shots: Vec<JobRecord>,
}
