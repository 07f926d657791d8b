//! Structured per-shot logging.

use tracing::{error, info, warn};

use reel_models::ShotId;

/// Logger carrying shot context for lifecycle events.
#[derive(Debug, Clone)]
pub struct ShotLogger {
    shot_id: ShotId,
    operation: &'static str,
}

impl ShotLogger {
    /// Create a logger for a shot and operation (e.g. "generate").
    pub fn new(shot_id: ShotId, operation: &'static str) -> Self {
        Self { shot_id, operation }
    }

    pub fn started(&self, attempt: u32) {
        info!(
            shot_id = %self.shot_id,
            operation = self.operation,
            attempt,
            "Shot dispatched"
        );
    }

    pub fn completed(&self, attempts: u32) {
        info!(
            shot_id = %self.shot_id,
            operation = self.operation,
            attempts,
            "Shot completed"
        );
    }

    pub fn retrying(&self, attempt: u32, delay_ms: u128, error: &str) {
        warn!(
            shot_id = %self.shot_id,
            operation = self.operation,
            attempt,
            delay_ms,
            "Shot failed, retrying: {}",
            error
        );
    }

    pub fn failed(&self, attempts: u32, error: &str) {
        error!(
            shot_id = %self.shot_id,
            operation = self.operation,
            attempts,
            "Shot failed permanently: {}",
            error
        );
    }
}
