//! Live run status handle.

use std::sync::{Arc, RwLock};

use reel_models::{RunId, RunStatus};

/// Shared, cheaply clonable handle to the run's live status.
///
/// The scheduler and orchestrator write through it; external callers take
/// snapshots at any time mid-run.
#[derive(Clone)]
pub struct RunStatusHandle {
    inner: Arc<RwLock<RunStatus>>,
}

impl RunStatusHandle {
    /// Create a fresh handle for a run of `shots_total` shots.
    pub fn new(run_id: RunId, shots_total: u32) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RunStatus::new(run_id, shots_total))),
        }
    }

    /// Take a snapshot of the current status.
    pub fn snapshot(&self) -> RunStatus {
        self.inner.read().unwrap().clone()
    }

    /// Apply an update under the write lock.
    pub fn update(&self, f: impl FnOnce(&mut RunStatus)) {
        let mut status = self.inner.write().unwrap();
        f(&mut status);
        status.updated_at = chrono::Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reel_models::RunPhase;

    #[test]
    fn test_snapshot_reflects_updates() {
        let handle = RunStatusHandle::new(RunId::from_string("run-1"), 4);

        handle.update(|s| {
            s.shots_completed = 2;
            s.set_percent(45);
        });

        let snap = handle.snapshot();
        assert_eq!(snap.shots_completed, 2);
        assert_eq!(snap.percent, 45);
        assert_eq!(snap.phase, RunPhase::Generating);

        // Clones observe the same state.
        let clone = handle.clone();
        clone.update(|s| s.set_phase(RunPhase::Assembling));
        assert_eq!(handle.snapshot().phase, RunPhase::Assembling);
    }
}
