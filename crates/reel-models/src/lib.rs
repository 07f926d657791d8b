//! Shared data models for the ReelForge pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Shot specifications and generated clips
//! - Clip job lifecycle state
//! - Output rendition specs and assembly results
//! - Run status snapshots and the final run summary

pub mod clip;
pub mod encoding;
pub mod job;
pub mod rendition;
pub mod shot;
pub mod summary;

// Re-export common types
pub use clip::Clip;
pub use encoding::EncodingConfig;
pub use job::{ClipJob, FailureKind, JobError, JobRecord, JobState};
pub use rendition::{default_renditions, AssemblyResult, RenditionFile, RenditionSpec};
pub use shot::{ShotId, ShotSpec};
pub use summary::{RunId, RunPhase, RunStatus, RunSummary, ShotProgress};
