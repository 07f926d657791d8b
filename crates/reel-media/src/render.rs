//! Rendition encoding and thumbnail extraction.

use std::path::{Path, PathBuf};
use tracing::info;

use reel_models::encoding::THUMBNAIL_SCALE_WIDTH;
use reel_models::{EncodingConfig, RenditionSpec};

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::concat::build_crossfade_graph;
use crate::error::{MediaError, MediaResult};

/// Encode one rendition of the assembled timeline.
///
/// Each call is an independent encode pass over the same source clips and
/// filter graph; renditions are never derived from one another.
pub async fn encode_rendition(
    clips: &[PathBuf],
    durations: &[f64],
    with_audio: bool,
    spec: &RenditionSpec,
    fade_seconds: f64,
    output: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<f64> {
    let output = output.as_ref();
    if clips.is_empty() {
        return Err(MediaError::invalid_video("no clips to encode"));
    }
    if clips.len() != durations.len() {
        return Err(MediaError::invalid_video(
            "clip list and duration list length mismatch",
        ));
    }

    let encoding = EncodingConfig::for_bitrate(&spec.video_bitrate);

    let (cmd, total_duration) = if clips.len() == 1 {
        // Single shot: nothing to cross-fade, plain encode.
        let mut cmd = FfmpegCommand::new(&clips[0], output);
        if let Some(height) = spec.max_height {
            cmd = cmd.video_filter(format!("scale=-2:{height}"));
        }
        (cmd.output_args(encoding.to_ffmpeg_args()), durations[0])
    } else {
        let graph = build_crossfade_graph(durations, fade_seconds, with_audio)?;

        let mut filter = graph.filter.clone();
        let video_out = if let Some(height) = spec.max_height {
            filter.push_str(&format!(";[{}]scale=-2:{height}[vscaled]", graph.video_out));
            "vscaled".to_string()
        } else {
            graph.video_out.clone()
        };

        let mut cmd = FfmpegCommand::with_inputs(clips, output)
            .filter_complex(filter)
            .map(format!("[{video_out}]"));
        if let Some(ref audio_out) = graph.audio_out {
            cmd = cmd.map(format!("[{audio_out}]"));
        }
        (cmd.output_args(encoding.to_ffmpeg_args()), graph.total_duration)
    };

    info!(
        label = %spec.label,
        bitrate = %spec.video_bitrate,
        clips = clips.len(),
        "Encoding rendition"
    );

    runner.run(&cmd).await?;
    Ok(total_duration)
}

/// Extract a single representative frame as a thumbnail.
pub async fn generate_thumbnail(
    video_path: impl AsRef<Path>,
    at_seconds: f64,
    output_path: impl AsRef<Path>,
    runner: &FfmpegRunner,
) -> MediaResult<()> {
    let filter = format!("scale={}:-2", THUMBNAIL_SCALE_WIDTH);

    let cmd = FfmpegCommand::new(video_path, output_path)
        .seek(at_seconds.max(0.0))
        .single_frame()
        .video_filter(&filter)
        .output_arg("-q:v")
        .output_arg("2");

    runner.run(&cmd).await
}
