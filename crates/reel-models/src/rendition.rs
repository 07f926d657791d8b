//! Output rendition specs and assembly results.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ShotId;

/// One requested output variant of the assembled timeline.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenditionSpec {
    /// Output label, used as the file stem (`high_quality`, `mobile`, ...)
    pub label: String,

    /// Target video bitrate (FFmpeg syntax, e.g. "5000k")
    pub video_bitrate: String,

    /// Optional height cap; the encoder scales to `-2:height` when set
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_height: Option<u32>,
}

impl RenditionSpec {
    pub fn new(label: impl Into<String>, video_bitrate: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            video_bitrate: video_bitrate.into(),
            max_height: None,
        }
    }

    pub fn with_max_height(mut self, height: u32) -> Self {
        self.max_height = Some(height);
        self
    }
}

/// The standard three-rendition set: high-quality, network-optimized, mobile.
pub fn default_renditions() -> Vec<RenditionSpec> {
    vec![
        RenditionSpec::new("high_quality", "5000k"),
        RenditionSpec::new("web_optimized", "2000k"),
        RenditionSpec::new("mobile", "1000k").with_max_height(720),
    ]
}

/// An encoded output file.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RenditionFile {
    /// Label from the requesting spec
    pub label: String,
    /// Output file location
    pub path: PathBuf,
    /// File size in bytes
    pub size_bytes: u64,
}

/// Result of a successful assembly run. Created once, immutable.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct AssemblyResult {
    /// Shot ids actually concatenated, in timeline order
    pub shot_ids: Vec<ShotId>,
    /// One entry per requested rendition
    pub renditions: Vec<RenditionFile>,
    /// Representative thumbnail location
    pub thumbnail: PathBuf,
    /// Total timeline duration in seconds (cross-fades accounted for)
    pub total_duration_seconds: f64,
}
