//! Video encoding configuration.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Default video codec (H.264)
pub const DEFAULT_VIDEO_CODEC: &str = "libx264";
/// Default audio codec
pub const DEFAULT_AUDIO_CODEC: &str = "aac";
/// Default encoding preset
pub const DEFAULT_PRESET: &str = "fast";
/// Default audio bitrate
pub const DEFAULT_AUDIO_BITRATE: &str = "128k";
/// Output frame rate for assembled renditions
pub const OUTPUT_FPS: u32 = 24;

/// Thumbnail generation settings
pub const THUMBNAIL_SCALE_WIDTH: u32 = 480;

/// Default cross-fade between adjacent clips, in seconds
pub const DEFAULT_CROSSFADE_SECONDS: f64 = 0.5;

/// Minimum plausible clip file size; anything smaller is treated as corrupt
pub const MIN_CLIP_FILE_BYTES: u64 = 1024;

/// Video encoding configuration for one rendition pass.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct EncodingConfig {
    /// Video codec (e.g., "libx264")
    #[serde(default = "default_video_codec")]
    pub codec: String,

    /// Encoding preset (e.g., "fast", "medium", "slow")
    #[serde(default = "default_preset")]
    pub preset: String,

    /// Target video bitrate (e.g., "5000k")
    pub video_bitrate: String,

    /// Audio codec
    #[serde(default = "default_audio_codec")]
    pub audio_codec: String,

    /// Audio bitrate
    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: String,

    /// Output frame rate
    #[serde(default = "default_fps")]
    pub fps: u32,
}

fn default_video_codec() -> String {
    DEFAULT_VIDEO_CODEC.to_string()
}
fn default_preset() -> String {
    DEFAULT_PRESET.to_string()
}
fn default_audio_codec() -> String {
    DEFAULT_AUDIO_CODEC.to_string()
}
fn default_audio_bitrate() -> String {
    DEFAULT_AUDIO_BITRATE.to_string()
}
fn default_fps() -> u32 {
    OUTPUT_FPS
}

impl EncodingConfig {
    /// Encoding pass for a target bitrate, defaults elsewhere.
    pub fn for_bitrate(video_bitrate: impl Into<String>) -> Self {
        Self {
            codec: DEFAULT_VIDEO_CODEC.to_string(),
            preset: DEFAULT_PRESET.to_string(),
            video_bitrate: video_bitrate.into(),
            audio_codec: DEFAULT_AUDIO_CODEC.to_string(),
            audio_bitrate: DEFAULT_AUDIO_BITRATE.to_string(),
            fps: OUTPUT_FPS,
        }
    }

    /// Convert to FFmpeg output arguments.
    pub fn to_ffmpeg_args(&self) -> Vec<String> {
        vec![
            "-c:v".to_string(),
            self.codec.clone(),
            "-preset".to_string(),
            self.preset.clone(),
            "-b:v".to_string(),
            self.video_bitrate.clone(),
            "-c:a".to_string(),
            self.audio_codec.clone(),
            "-b:a".to_string(),
            self.audio_bitrate.clone(),
            "-r".to_string(),
            self.fps.to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ffmpeg_args() {
        let config = EncodingConfig::for_bitrate("2000k");
        let args = config.to_ffmpeg_args();
        assert!(args.contains(&"-c:v".to_string()));
        assert!(args.contains(&"libx264".to_string()));
        assert!(args.contains(&"-b:v".to_string()));
        assert!(args.contains(&"2000k".to_string()));
        assert!(args.contains(&"24".to_string()));
    }
}
