//! Retry policy for generation failures.
//!
//! A pure decision function: given the failure class and how many attempts
//! the shot has already consumed, answer "wait and retry" or "give up".
//! Quota stalls get a fixed cool-down and their own budget: quota resets
//! are time-based, so exponential growth would only waste the window, and
//! rapid retries would hammer a wall that isn't moving.

use std::time::Duration;

use rand::Rng;

use reel_gen::GenerationError;

use crate::config::PipelineConfig;

/// Outcome of a retry decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryDecision {
    /// Re-queue the job, eligible after the given delay.
    Retry { after: Duration },
    /// Mark the job Failed with its last error.
    GiveUp,
}

/// Per-attempt retry decisions, keyed on failure class.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Transient/timeout retry budget
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub base_delay: Duration,
    /// Cap on the backoff delay
    pub max_delay: Duration,
    /// Jitter fraction (0.0 disables)
    pub jitter_frac: f64,
    /// Fixed cool-down for quota-limited retries
    pub quota_cooldown: Duration,
    /// Quota retry budget (separate from the transient budget)
    pub max_quota_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(300),
            jitter_frac: 0.1,
            quota_cooldown: Duration::from_secs(300),
            max_quota_retries: 5,
        }
    }
}

impl RetryPolicy {
    /// Build from the pipeline config.
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            max_retries: config.max_retries,
            base_delay: config.retry_base_delay,
            max_delay: config.retry_max_delay,
            jitter_frac: config.retry_jitter_frac,
            quota_cooldown: config.quota_cooldown,
            max_quota_retries: config.max_quota_retries,
        }
    }

    /// Decide what to do after attempt number `attempt` (1-based) failed
    /// with `error`.
    pub fn decide(&self, error: &GenerationError, attempt: u32) -> RetryDecision {
        match error {
            GenerationError::Validation(_) => RetryDecision::GiveUp,
            GenerationError::QuotaExceeded(_) => {
                if attempt >= self.max_quota_retries {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::Retry {
                        after: self.quota_cooldown,
                    }
                }
            }
            GenerationError::Transient(_) | GenerationError::Timeout(_) => {
                if attempt >= self.max_retries {
                    RetryDecision::GiveUp
                } else {
                    RetryDecision::Retry {
                        after: self.jittered(self.backoff_delay(attempt)),
                    }
                }
            }
        }
    }

    /// Deterministic exponential delay for a given attempt (1-based).
    fn backoff_delay(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        self.base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay)
    }

    /// Apply symmetric jitter of `jitter_frac` around the delay.
    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter_frac <= 0.0 {
            return delay;
        }
        let spread = self.jitter_frac.min(1.0);
        let factor = 1.0 + rand::rng().random_range(-spread..=spread);
        delay.mul_f64(factor.max(0.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> RetryPolicy {
        RetryPolicy {
            jitter_frac: 0.0,
            ..RetryPolicy::default()
        }
    }

    #[test]
    fn test_validation_never_retried() {
        let p = policy();
        let err = GenerationError::validation("bad prompt");
        assert_eq!(p.decide(&err, 1), RetryDecision::GiveUp);
    }

    #[test]
    fn test_transient_backoff_is_monotonic_and_capped() {
        let p = policy();
        let mut prev = Duration::ZERO;
        for attempt in 1..20 {
            let delay = p.backoff_delay(attempt);
            assert!(delay >= prev, "delay decreased at attempt {attempt}");
            assert!(delay <= p.max_delay);
            prev = delay;
        }
        assert_eq!(p.backoff_delay(1), Duration::from_secs(30));
        assert_eq!(p.backoff_delay(2), Duration::from_secs(60));
        assert_eq!(p.backoff_delay(3), Duration::from_secs(120));
    }

    #[test]
    fn test_transient_gives_up_at_budget() {
        let p = policy();
        let err = GenerationError::transient("503");
        assert!(matches!(p.decide(&err, 1), RetryDecision::Retry { .. }));
        assert!(matches!(p.decide(&err, 2), RetryDecision::Retry { .. }));
        assert_eq!(p.decide(&err, 3), RetryDecision::GiveUp);
    }

    #[test]
    fn test_quota_uses_fixed_cooldown() {
        let p = policy();
        let err = GenerationError::quota_exceeded("429");

        for attempt in 1..p.max_quota_retries {
            match p.decide(&err, attempt) {
                RetryDecision::Retry { after } => assert_eq!(after, p.quota_cooldown),
                RetryDecision::GiveUp => panic!("gave up early at attempt {attempt}"),
            }
        }
        assert_eq!(p.decide(&err, p.max_quota_retries), RetryDecision::GiveUp);
    }

    #[test]
    fn test_timeout_treated_as_transient() {
        let p = policy();
        let err = GenerationError::Timeout(600);
        assert!(matches!(p.decide(&err, 1), RetryDecision::Retry { .. }));
        assert_eq!(p.decide(&err, 3), RetryDecision::GiveUp);
    }

    #[test]
    fn test_jitter_stays_within_bounds() {
        let p = RetryPolicy {
            jitter_frac: 0.1,
            ..RetryPolicy::default()
        };
        let base = Duration::from_secs(100);
        for _ in 0..100 {
            let d = p.jittered(base);
            assert!(d >= Duration::from_secs(90) && d <= Duration::from_secs(110));
        }
    }
}
