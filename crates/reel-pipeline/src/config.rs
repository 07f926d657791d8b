//! Pipeline configuration.

use std::time::Duration;

use reel_models::encoding::DEFAULT_CROSSFADE_SECONDS;

/// What to do when generation finishes with failed shots.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FailurePolicy {
    /// Refuse to assemble unless every shot completed (default).
    #[default]
    RequireComplete,
    /// Assemble whatever completed, skipping failed shots.
    ///
    /// This is an explicit caller opt-in; partial output is never produced
    /// silently.
    AcceptPartial,
}

/// Pipeline configuration.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Maximum concurrent generation requests
    pub max_concurrency: usize,
    /// Maximum retries per shot for transient/timeout failures
    pub max_retries: u32,
    /// Base delay for exponential backoff
    pub retry_base_delay: Duration,
    /// Cap on the backoff delay
    pub retry_max_delay: Duration,
    /// Jitter fraction applied to backoff delays (0.0 disables)
    pub retry_jitter_frac: f64,
    /// Fixed cool-down applied to quota-limited retries
    pub quota_cooldown: Duration,
    /// Cap on cool-down growth while the quota stays exhausted
    pub quota_max_cooldown: Duration,
    /// Maximum quota-limited retries per shot (separate budget)
    pub max_quota_retries: u32,
    /// Consecutive quota failures that flip the tracker to Exhausted
    pub quota_failure_threshold: u32,
    /// Cross-fade between adjacent clips, in seconds
    pub crossfade_seconds: f64,
    /// Whole-assembly retries on encoder failure
    pub assembly_retries: u32,
    /// Timeout for a single encode pass
    pub encode_timeout: Duration,
    /// Failed-shot handling at assembly time
    pub failure_policy: FailurePolicy,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 2,
            max_retries: 3,
            retry_base_delay: Duration::from_secs(30),
            retry_max_delay: Duration::from_secs(300),
            retry_jitter_frac: 0.1,
            quota_cooldown: Duration::from_secs(300),
            quota_max_cooldown: Duration::from_secs(1800),
            max_quota_retries: 5,
            quota_failure_threshold: 3,
            crossfade_seconds: DEFAULT_CROSSFADE_SECONDS,
            assembly_retries: 2,
            encode_timeout: Duration::from_secs(1800),
            failure_policy: FailurePolicy::RequireComplete,
        }
    }
}

impl PipelineConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrency: env_parse("PIPELINE_MAX_CONCURRENCY", defaults.max_concurrency),
            max_retries: env_parse("PIPELINE_MAX_RETRIES", defaults.max_retries),
            retry_base_delay: Duration::from_secs(env_parse("PIPELINE_RETRY_BASE_SECS", 30)),
            retry_max_delay: Duration::from_secs(env_parse("PIPELINE_RETRY_MAX_SECS", 300)),
            retry_jitter_frac: env_parse("PIPELINE_RETRY_JITTER", defaults.retry_jitter_frac),
            quota_cooldown: Duration::from_secs(env_parse("PIPELINE_QUOTA_COOLDOWN_SECS", 300)),
            quota_max_cooldown: Duration::from_secs(env_parse(
                "PIPELINE_QUOTA_MAX_COOLDOWN_SECS",
                1800,
            )),
            max_quota_retries: env_parse("PIPELINE_MAX_QUOTA_RETRIES", defaults.max_quota_retries),
            quota_failure_threshold: env_parse(
                "PIPELINE_QUOTA_FAILURE_THRESHOLD",
                defaults.quota_failure_threshold,
            ),
            crossfade_seconds: env_parse("PIPELINE_CROSSFADE_SECS", defaults.crossfade_seconds),
            assembly_retries: env_parse("PIPELINE_ASSEMBLY_RETRIES", defaults.assembly_retries),
            encode_timeout: Duration::from_secs(env_parse("PIPELINE_ENCODE_TIMEOUT_SECS", 1800)),
            failure_policy: match std::env::var("PIPELINE_ACCEPT_PARTIAL").as_deref() {
                Ok("1") | Ok("true") => FailurePolicy::AcceptPartial,
                _ => FailurePolicy::RequireComplete,
            },
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_concurrency, 2);
        assert_eq!(config.max_retries, 3);
        assert_eq!(config.quota_failure_threshold, 3);
        assert_eq!(config.failure_policy, FailurePolicy::RequireComplete);
        assert!((config.crossfade_seconds - 0.5).abs() < 1e-9);
    }
}
