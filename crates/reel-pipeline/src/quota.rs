//! Quota tracker for the external generation service.
//!
//! Converts a burst of quota rejections into one system-wide pause instead
//! of N parallel failures. Single-writer: only the scheduler task calls the
//! mutating methods; readers get snapshots.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{info, warn};

/// Health of the upstream quota.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaHealth {
    /// Submitting normally
    Healthy,
    /// Quota rejections observed, below the pause threshold
    Degraded,
    /// Paused; no dispatch until the resume instant, then a single probe
    Exhausted,
}

/// Tracks consecutive quota rejections and the pause/resume cycle.
#[derive(Debug)]
pub struct QuotaTracker {
    health: QuotaHealth,
    consecutive_failures: u32,
    resume_at: Option<Instant>,
    /// How many cool-downs this exhaustion has lasted; scales the next one
    extensions: u32,
    failure_threshold: u32,
    cooldown: Duration,
    max_cooldown: Duration,
}

impl QuotaTracker {
    /// Create a tracker.
    pub fn new(failure_threshold: u32, cooldown: Duration, max_cooldown: Duration) -> Self {
        Self {
            health: QuotaHealth::Healthy,
            consecutive_failures: 0,
            resume_at: None,
            extensions: 0,
            failure_threshold: failure_threshold.max(1),
            cooldown,
            max_cooldown,
        }
    }

    /// Current health.
    pub fn health(&self) -> QuotaHealth {
        self.health
    }

    /// Whether dispatch is currently suspended.
    pub fn is_exhausted(&self) -> bool {
        self.health == QuotaHealth::Exhausted
    }

    /// Instant at which a probe becomes eligible, while exhausted.
    pub fn resume_at(&self) -> Option<Instant> {
        self.resume_at
    }

    /// Record a quota rejection.
    ///
    /// Crossing the threshold moves to Exhausted; a rejection while already
    /// exhausted (the probe failing) extends the cool-down linearly, capped.
    pub fn record_quota_error(&mut self) {
        self.consecutive_failures += 1;

        if self.health == QuotaHealth::Exhausted {
            self.extensions += 1;
            let next = self
                .cooldown
                .saturating_mul(self.extensions + 1)
                .min(self.max_cooldown);
            self.resume_at = Some(Instant::now() + next);
            warn!(
                "Quota probe rejected; extending cool-down to {:?}",
                next
            );
            return;
        }

        if self.consecutive_failures >= self.failure_threshold {
            self.health = QuotaHealth::Exhausted;
            self.extensions = 0;
            self.resume_at = Some(Instant::now() + self.cooldown);
            warn!(
                consecutive_failures = self.consecutive_failures,
                "Quota exhausted; pausing dispatch for {:?}", self.cooldown
            );
        } else {
            self.health = QuotaHealth::Degraded;
        }
    }

    /// Record a successful generation.
    ///
    /// Resets the consecutive-failure counter. Only a probe success lifts
    /// an exhausted tracker back to Healthy; a straggler from before the
    /// pause does not (anti-flap).
    pub fn record_success(&mut self, probe: bool) {
        self.consecutive_failures = 0;
        match self.health {
            QuotaHealth::Exhausted if probe => {
                info!("Quota probe succeeded; resuming dispatch");
                self.health = QuotaHealth::Healthy;
                self.resume_at = None;
                self.extensions = 0;
            }
            QuotaHealth::Exhausted => {}
            _ => {
                self.health = QuotaHealth::Healthy;
                self.resume_at = None;
            }
        }
    }

    /// Record a non-quota failure; breaks the consecutive-rejection streak
    /// without touching the pause state.
    pub fn record_other_failure(&mut self) {
        self.consecutive_failures = 0;
        if self.health == QuotaHealth::Degraded {
            self.health = QuotaHealth::Healthy;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tracker() -> QuotaTracker {
        QuotaTracker::new(3, Duration::from_millis(100), Duration::from_millis(500))
    }

    #[test]
    fn test_threshold_triggers_exhaustion() {
        let mut t = tracker();
        assert_eq!(t.health(), QuotaHealth::Healthy);

        t.record_quota_error();
        assert_eq!(t.health(), QuotaHealth::Degraded);
        t.record_quota_error();
        assert_eq!(t.health(), QuotaHealth::Degraded);
        t.record_quota_error();
        assert_eq!(t.health(), QuotaHealth::Exhausted);
        assert!(t.resume_at().is_some());
    }

    #[test]
    fn test_success_resets_streak() {
        let mut t = tracker();
        t.record_quota_error();
        t.record_quota_error();
        t.record_success(false);
        assert_eq!(t.health(), QuotaHealth::Healthy);

        // Streak restarts from zero.
        t.record_quota_error();
        t.record_quota_error();
        assert_eq!(t.health(), QuotaHealth::Degraded);
    }

    #[test]
    fn test_non_probe_success_does_not_lift_exhaustion() {
        let mut t = tracker();
        for _ in 0..3 {
            t.record_quota_error();
        }
        assert!(t.is_exhausted());

        // A straggler completing after the pause started.
        t.record_success(false);
        assert!(t.is_exhausted());

        t.record_success(true);
        assert_eq!(t.health(), QuotaHealth::Healthy);
        assert!(t.resume_at().is_none());
    }

    #[test]
    fn test_probe_failure_extends_cooldown() {
        let mut t = tracker();
        for _ in 0..3 {
            t.record_quota_error();
        }
        let first_resume = t.resume_at().unwrap();

        t.record_quota_error();
        assert!(t.is_exhausted());
        let extended = t.resume_at().unwrap();
        assert!(extended > first_resume);
    }

    #[test]
    fn test_cooldown_extension_is_capped() {
        let mut t = tracker();
        for _ in 0..3 {
            t.record_quota_error();
        }
        for _ in 0..20 {
            t.record_quota_error();
        }
        let remaining = t.resume_at().unwrap() - Instant::now();
        assert!(remaining <= Duration::from_millis(500));
    }

    #[test]
    fn test_other_failure_breaks_streak() {
        let mut t = tracker();
        t.record_quota_error();
        t.record_quota_error();
        t.record_other_failure();
        t.record_quota_error();
        t.record_quota_error();
        // Only two consecutive quota errors since the transient one.
        assert_eq!(t.health(), QuotaHealth::Degraded);
    }
}
