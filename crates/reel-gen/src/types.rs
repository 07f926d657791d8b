//! Wire types for the generation service API.

use serde::{Deserialize, Serialize};

/// Body of a generation request.
#[derive(Debug, Clone, Serialize)]
pub struct GenerateRequest {
    /// Model name
    pub model: String,
    /// Shot prompt text
    pub prompt: String,
    /// Negative prompt
    pub negative_prompt: String,
    /// Requested clip duration in seconds
    pub duration_seconds: f64,
    /// Reference-asset locators for visual consistency
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reference_assets: Vec<String>,
}

/// Response to a generation request: a handle to the async operation.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationHandle {
    /// Operation id to poll
    pub operation_id: String,
}

/// Poll response for an in-flight operation.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationStatus {
    /// Whether the operation reached a terminal state
    pub done: bool,
    /// Error detail when the operation failed
    #[serde(default)]
    pub error: Option<OperationError>,
    /// Download URL for the finished clip
    #[serde(default)]
    pub video_url: Option<String>,
}

/// Error reported by a failed operation.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationError {
    /// Service status code (HTTP-style)
    #[serde(default)]
    pub code: Option<u16>,
    /// Error message
    #[serde(default)]
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_status_parse() {
        let running: OperationStatus = serde_json::from_str(r#"{"done": false}"#).unwrap();
        assert!(!running.done);
        assert!(running.error.is_none());

        let failed: OperationStatus = serde_json::from_str(
            r#"{"done": true, "error": {"code": 429, "message": "RESOURCE_EXHAUSTED"}}"#,
        )
        .unwrap();
        assert!(failed.done);
        assert_eq!(failed.error.unwrap().code, Some(429));

        let ok: OperationStatus =
            serde_json::from_str(r#"{"done": true, "video_url": "https://cdn/clip.mp4"}"#).unwrap();
        assert_eq!(ok.video_url.as_deref(), Some("https://cdn/clip.mp4"));
    }
}
