//! FFmpeg CLI wrapper for the ReelForge assembly stage.
//!
//! Provides:
//! - A multi-input FFmpeg command builder and runner with timeout and
//!   cancellation
//! - FFprobe-based clip inspection and validation
//! - Cross-fade concat filter graphs
//! - Rendition encoding and thumbnail extraction
//! - EXDEV-safe atomic file moves

pub mod command;
pub mod concat;
pub mod error;
pub mod fs_utils;
pub mod probe;
pub mod render;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegRunner};
pub use concat::{build_crossfade_graph, CrossfadeGraph};
pub use error::{MediaError, MediaResult};
pub use fs_utils::move_file;
pub use probe::{probe_video, validate_clip_file, VideoInfo};
pub use render::{encode_rendition, generate_thumbnail};
