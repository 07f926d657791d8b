//! Shot specifications.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use validator::Validate;

/// Unique identifier for a shot.
///
/// Shot ids double as the ordering key for the final timeline: assembly
/// always runs in ascending shot-id order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, JsonSchema,
)]
#[serde(transparent)]
pub struct ShotId(pub u32);

impl ShotId {
    /// Get the inner numeric id.
    pub fn as_u32(&self) -> u32 {
        self.0
    }

    /// File-name stem for this shot (`shot_003` style).
    pub fn file_stem(&self) -> String {
        format!("shot_{:03}", self.0)
    }
}

impl fmt::Display for ShotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for ShotId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Specification for a single shot, produced by the upstream scripting stage.
///
/// Immutable once created.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ShotSpec {
    /// Shot identifier (unique within a run, ordering key)
    pub id: ShotId,

    /// Generation prompt text
    #[validate(length(min = 10, max = 2000))]
    pub prompt: String,

    /// Target clip duration in seconds
    #[validate(range(min = 1.0, max = 60.0))]
    pub duration_seconds: f64,

    /// Ordered reference-asset locators (character images etc.)
    #[serde(default)]
    pub reference_assets: Vec<String>,
}

impl ShotSpec {
    /// Create a new shot spec.
    pub fn new(id: impl Into<ShotId>, prompt: impl Into<String>, duration_seconds: f64) -> Self {
        Self {
            id: id.into(),
            prompt: prompt.into(),
            duration_seconds,
            reference_assets: Vec::new(),
        }
    }

    /// Attach reference-asset locators.
    pub fn with_reference_assets(mut self, assets: Vec<String>) -> Self {
        self.reference_assets = assets;
        self
    }
}
