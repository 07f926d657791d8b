//! Clip assembly: validation, cross-fade concat, rendition encoding.

use std::path::{Path, PathBuf};

use tokio::sync::watch;
use tracing::{info, warn};

use reel_media::{encode_rendition, generate_thumbnail, validate_clip_file, FfmpegRunner, MediaError};
use reel_models::{AssemblyResult, Clip, RenditionFile, RenditionSpec};

use crate::error::{PipelineError, PipelineResult};

/// Assembles completed clips into the final renditions plus a thumbnail.
pub struct Assembler {
    fade_seconds: f64,
    encode_timeout_secs: u64,
    cancel_rx: Option<watch::Receiver<bool>>,
}

impl Assembler {
    /// Create an assembler with the given cross-fade length.
    pub fn new(fade_seconds: f64, encode_timeout_secs: u64) -> Self {
        Self {
            fade_seconds,
            encode_timeout_secs,
            cancel_rx: None,
        }
    }

    /// Propagate a cancellation signal into encode passes.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Concatenate `clips` (ascending shot-id order) and encode one output
    /// per rendition spec, plus a midpoint thumbnail.
    ///
    /// Validation failures abort before anything is written; encoder
    /// failures abort the whole step and remove any outputs already
    /// produced; there is no partial-rendition success.
    pub async fn assemble(
        &self,
        clips: &[Clip],
        renditions: &[RenditionSpec],
        final_dir: &Path,
    ) -> PipelineResult<AssemblyResult> {
        let (paths, durations, with_audio) = self.validate(clips).await?;
        if renditions.is_empty() {
            return Err(PipelineError::validation("no output renditions requested"));
        }

        tokio::fs::create_dir_all(final_dir).await?;

        let mut runner = FfmpegRunner::new().with_timeout(self.encode_timeout_secs);
        if let Some(ref cancel_rx) = self.cancel_rx {
            runner = runner.with_cancel(cancel_rx.clone());
        }

        let mut outputs: Vec<RenditionFile> = Vec::new();
        let mut total_duration = 0.0f64;

        let result = async {
            for spec in renditions {
                let output = final_dir.join(format!("{}.mp4", spec.label));
                let part = final_dir.join(format!("{}.mp4.part", spec.label));

                total_duration = encode_rendition(
                    &paths,
                    &durations,
                    with_audio,
                    spec,
                    self.fade_seconds,
                    &part,
                    &runner,
                )
                .await
                .map_err(assembly_error)?;

                tokio::fs::rename(&part, &output).await?;
                let size_bytes = tokio::fs::metadata(&output).await?.len();
                outputs.push(RenditionFile {
                    label: spec.label.clone(),
                    path: output,
                    size_bytes,
                });
            }

            let thumbnail = final_dir.join("thumbnail.jpg");
            generate_thumbnail(
                &outputs[0].path,
                total_duration / 2.0,
                &thumbnail,
                &runner,
            )
            .await
            .map_err(assembly_error)?;

            Ok(AssemblyResult {
                shot_ids: clips.iter().map(|c| c.shot_id).collect(),
                renditions: outputs.clone(),
                thumbnail,
                total_duration_seconds: total_duration,
            })
        }
        .await;

        match result {
            Ok(assembly) => {
                info!(
                    renditions = assembly.renditions.len(),
                    duration = assembly.total_duration_seconds,
                    "Assembly complete"
                );
                Ok(assembly)
            }
            Err(e) => {
                self.cleanup(final_dir, &outputs).await;
                Err(e)
            }
        }
    }

    /// Check the assembly preconditions and probe every clip.
    ///
    /// Returns file paths, probed durations and whether every clip has an
    /// audio stream (mixed audio cannot be cross-faded).
    async fn validate(&self, clips: &[Clip]) -> PipelineResult<(Vec<PathBuf>, Vec<f64>, bool)> {
        if clips.is_empty() {
            return Err(PipelineError::validation("no clips to assemble"));
        }
        for pair in clips.windows(2) {
            if pair[1].shot_id <= pair[0].shot_id {
                return Err(PipelineError::validation(format!(
                    "clips out of order: shot {} follows shot {}",
                    pair[1].shot_id, pair[0].shot_id
                )));
            }
        }

        let mut paths = Vec::with_capacity(clips.len());
        let mut durations = Vec::with_capacity(clips.len());
        let mut with_audio = true;
        let mut dimensions: Option<(u32, u32)> = None;

        for clip in clips {
            let info = validate_clip_file(&clip.path).await.map_err(|e| {
                PipelineError::validation(format!("shot {}: {}", clip.shot_id, e))
            })?;

            match dimensions {
                None => dimensions = Some((info.width, info.height)),
                Some((w, h)) if (info.width, info.height) != (w, h) => {
                    return Err(PipelineError::validation(format!(
                        "shot {} is {}x{}, expected {}x{}",
                        clip.shot_id, info.width, info.height, w, h
                    )));
                }
                Some(_) => {}
            }

            with_audio &= info.has_audio;
            paths.push(clip.path.clone());
            durations.push(info.duration);
        }

        Ok((paths, durations, with_audio))
    }

    /// Best-effort removal of partial outputs after a failed step.
    async fn cleanup(&self, final_dir: &Path, written: &[RenditionFile]) {
        for rendition in written {
            if let Err(e) = tokio::fs::remove_file(&rendition.path).await {
                warn!(
                    "Failed to remove partial rendition {}: {}",
                    rendition.path.display(),
                    e
                );
            }
        }
        if let Ok(mut entries) = tokio::fs::read_dir(final_dir).await {
            while let Ok(Some(entry)) = entries.next_entry().await {
                if entry.file_name().to_string_lossy().ends_with(".part") {
                    let _ = tokio::fs::remove_file(entry.path()).await;
                }
            }
        }
    }
}

/// Encoder/tool failures are retryable at whole-assembly granularity;
/// everything else from the media layer means the inputs are bad.
fn assembly_error(e: MediaError) -> PipelineError {
    match e {
        MediaError::FileNotFound(_) | MediaError::InvalidVideo(_) => {
            PipelineError::validation(e.to_string())
        }
        MediaError::Cancelled => PipelineError::Cancelled,
        other => PipelineError::assembly(other.to_string()),
    }
}
