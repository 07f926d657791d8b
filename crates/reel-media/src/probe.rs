//! FFprobe video information and clip validation.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::{MediaError, MediaResult};
use reel_models::encoding::MIN_CLIP_FILE_BYTES;

/// Video file information.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoInfo {
    /// Duration in seconds
    pub duration: f64,
    /// Width in pixels
    pub width: u32,
    /// Height in pixels
    pub height: u32,
    /// Video codec
    pub codec: String,
    /// File size in bytes
    pub size: u64,
    /// Whether the file carries an audio stream
    pub has_audio: bool,
}

/// FFprobe JSON output format.
#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    format: FfprobeFormat,
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeFormat {
    duration: Option<String>,
    size: Option<String>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: String,
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Probe a video file for information.
pub async fn probe_video(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(MediaError::FileNotFound(path.to_path_buf()));
    }

    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)?;

    let output = Command::new("ffprobe")
        .args([
            "-v",
            "quiet",
            "-print_format",
            "json",
            "-show_format",
            "-show_streams",
        ])
        .arg(path)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .output()
        .await?;

    if !output.status.success() {
        return Err(MediaError::FfprobeFailed {
            message: format!("FFprobe failed for {}", path.display()),
            stderr: Some(String::from_utf8_lossy(&output.stderr).to_string()),
        });
    }

    let probe: FfprobeOutput = serde_json::from_slice(&output.stdout)?;

    let video_stream = probe
        .streams
        .iter()
        .find(|s| s.codec_type == "video")
        .ok_or_else(|| MediaError::invalid_video("No video stream found"))?;

    let has_audio = probe.streams.iter().any(|s| s.codec_type == "audio");

    let duration = probe
        .format
        .duration
        .as_ref()
        .and_then(|d| d.parse::<f64>().ok())
        .unwrap_or(0.0);

    let size = probe
        .format
        .size
        .as_ref()
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0);

    Ok(VideoInfo {
        duration,
        width: video_stream.width.unwrap_or(0),
        height: video_stream.height.unwrap_or(0),
        codec: video_stream
            .codec_name
            .clone()
            .unwrap_or_else(|| "unknown".to_string()),
        size,
        has_audio,
    })
}

/// Validate that a clip file is present, plausibly sized and parsable.
///
/// Used as the assembly precondition: a clip that fails here must abort
/// assembly before any rendition is written.
pub async fn validate_clip_file(path: impl AsRef<Path>) -> MediaResult<VideoInfo> {
    let path = path.as_ref();

    let meta = tokio::fs::metadata(path)
        .await
        .map_err(|_| MediaError::FileNotFound(path.to_path_buf()))?;

    if meta.len() < MIN_CLIP_FILE_BYTES {
        return Err(MediaError::invalid_video(format!(
            "{} is only {} bytes",
            path.display(),
            meta.len()
        )));
    }

    let info = probe_video(path).await?;
    if info.duration <= 0.0 {
        return Err(MediaError::invalid_video(format!(
            "{} has no measurable duration",
            path.display()
        )));
    }

    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_validate_missing_file() {
        let err = validate_clip_file("/nonexistent/shot_001.mp4")
            .await
            .unwrap_err();
        assert!(matches!(err, MediaError::FileNotFound(_)));
    }

    #[tokio::test]
    async fn test_validate_tiny_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("shot_001.mp4");
        tokio::fs::write(&path, b"tiny").await.unwrap();

        let err = validate_clip_file(&path).await.unwrap_err();
        assert!(matches!(err, MediaError::InvalidVideo(_)));
    }

    #[test]
    fn test_probe_output_parse() {
        let json = r#"{
            "format": {"duration": "8.04", "size": "1048576"},
            "streams": [
                {"codec_type": "video", "codec_name": "h264", "width": 1280, "height": 720},
                {"codec_type": "audio", "codec_name": "aac"}
            ]
        }"#;
        let probe: FfprobeOutput = serde_json::from_str(json).unwrap();
        assert_eq!(probe.streams.len(), 2);
        assert_eq!(probe.format.duration.as_deref(), Some("8.04"));
    }
}
