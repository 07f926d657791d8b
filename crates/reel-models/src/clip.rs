//! Generated clip records.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::ShotId;

/// Result of a completed clip generation.
///
/// Written once by the generation client, never mutated. A regeneration of
/// the same shot produces a new `Clip` that replaces the prior record.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct Clip {
    /// Shot this clip was generated for (unique per run)
    pub shot_id: ShotId,

    /// Local file location
    pub path: PathBuf,

    /// Clip duration in seconds
    pub duration_seconds: f64,

    /// File size in bytes
    pub size_bytes: u64,

    /// SHA-256 of the clip bytes, hex encoded
    pub sha256: String,

    /// When generation completed
    pub generated_at: DateTime<Utc>,
}

impl Clip {
    /// Create a new clip record.
    pub fn new(
        shot_id: ShotId,
        path: impl Into<PathBuf>,
        duration_seconds: f64,
        size_bytes: u64,
        sha256: impl Into<String>,
    ) -> Self {
        Self {
            shot_id,
            path: path.into(),
            duration_seconds,
            size_bytes,
            sha256: sha256.into(),
            generated_at: Utc::now(),
        }
    }

    /// Returns a copy pointing at a different file location.
    ///
    /// Used by the store when moving a staged clip into the run directory.
    pub fn at_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.path = path.into();
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clip_at_path() {
        let clip = Clip::new(ShotId(1), "/tmp/staging/shot_001.mp4", 8.0, 1024, "abc123");
        let moved = clip.clone().at_path("/run/clips/shot_001.mp4");

        assert_eq!(moved.path, PathBuf::from("/run/clips/shot_001.mp4"));
        assert_eq!(moved.sha256, clip.sha256);
        assert_eq!(moved.shot_id, clip.shot_id);
    }
}
