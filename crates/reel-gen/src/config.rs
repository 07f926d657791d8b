//! Generation client configuration.

use std::time::Duration;

/// Default model requested from the generation service.
pub const DEFAULT_MODEL: &str = "veo-3.0-generate-preview";

/// Negative prompt applied to every generation request.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "cartoon, drawing, low quality, blurry, distorted";

/// Configuration for the generation client.
#[derive(Debug, Clone)]
pub struct GenConfig {
    /// Base URL of the generation service
    pub base_url: String,
    /// API key sent as a bearer token
    pub api_key: String,
    /// Model name
    pub model: String,
    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Delay between operation polls
    pub poll_interval: Duration,
    /// Give up polling after this long
    pub poll_timeout: Duration,
}

impl Default for GenConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8300".to_string(),
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            request_timeout: Duration::from_secs(60),
            poll_interval: Duration::from_secs(10),
            poll_timeout: Duration::from_secs(600),
        }
    }
}

impl GenConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        Self {
            base_url: std::env::var("GEN_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:8300".to_string()),
            api_key: std::env::var("GEN_API_KEY").unwrap_or_default(),
            model: std::env::var("GEN_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string()),
            request_timeout: Duration::from_secs(
                std::env::var("GEN_REQUEST_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(60),
            ),
            poll_interval: Duration::from_secs(
                std::env::var("GEN_POLL_INTERVAL_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(10),
            ),
            poll_timeout: Duration::from_secs(
                std::env::var("GEN_POLL_TIMEOUT_SECS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(600),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = GenConfig::default();
        assert_eq!(config.model, DEFAULT_MODEL);
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert_eq!(config.poll_timeout, Duration::from_secs(600));
    }
}
