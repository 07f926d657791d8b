//! Generation service HTTP client.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};
use validator::Validate;

use reel_models::{Clip, ShotSpec};

use crate::config::{GenConfig, DEFAULT_NEGATIVE_PROMPT};
use crate::error::{GenResult, GenerationError};
use crate::types::{GenerateRequest, OperationHandle, OperationStatus};

/// A source of generated clips for shot specifications.
///
/// The scheduler only sees this trait; tests swap in fakes, production uses
/// [`HttpGenClient`].
#[async_trait]
pub trait ClipGenerator: Send + Sync {
    /// Generate a clip for `spec`, writing the bytes under `staging_dir`.
    ///
    /// On success the returned [`Clip`] points at a fully written file; on
    /// failure no file is left under the clip's final staging name.
    async fn generate(&self, spec: &ShotSpec, staging_dir: &Path) -> GenResult<Clip>;
}

/// HTTP client for the async generation API (submit, poll, fetch).
pub struct HttpGenClient {
    http: Client,
    config: GenConfig,
}

impl HttpGenClient {
    /// Create a new client.
    pub fn new(config: GenConfig) -> GenResult<Self> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|e| GenerationError::transient(format!("http client init: {e}")))?;

        Ok(Self { http, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> GenResult<Self> {
        Self::new(GenConfig::from_env())
    }

    /// Submit the generation request, returning the operation handle.
    async fn start_operation(&self, spec: &ShotSpec) -> GenResult<OperationHandle> {
        let url = format!("{}/v1/videos:generate", self.config.base_url);
        let request = GenerateRequest {
            model: self.config.model.clone(),
            prompt: spec.prompt.clone(),
            negative_prompt: DEFAULT_NEGATIVE_PROMPT.to_string(),
            duration_seconds: spec.duration_seconds,
            reference_assets: spec.reference_assets.clone(),
        };

        debug!(shot_id = %spec.id, "Submitting generation request");

        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status, &body));
        }

        let handle: OperationHandle = response
            .json()
            .await
            .map_err(|e| GenerationError::transient(format!("bad submit response: {e}")))?;
        Ok(handle)
    }

    /// Poll the operation until done, suspending `poll_interval` between
    /// polls, up to `poll_timeout`.
    async fn poll_operation(&self, operation_id: &str) -> GenResult<String> {
        let url = format!("{}/v1/operations/{}", self.config.base_url, operation_id);
        let deadline = tokio::time::Instant::now() + self.config.poll_timeout;

        loop {
            let response = self
                .http
                .get(&url)
                .bearer_auth(&self.config.api_key)
                .send()
                .await?;

            if !response.status().is_success() {
                let status = response.status().as_u16();
                let body = response.text().await.unwrap_or_default();
                return Err(GenerationError::from_status(status, &body));
            }

            let status: OperationStatus = response
                .json()
                .await
                .map_err(|e| GenerationError::transient(format!("bad poll response: {e}")))?;

            if status.done {
                if let Some(error) = status.error {
                    let code = error.code.unwrap_or(500);
                    return Err(GenerationError::from_status(code, &error.message));
                }
                return status.video_url.ok_or_else(|| {
                    GenerationError::transient("operation done without a video url")
                });
            }

            if tokio::time::Instant::now() + self.config.poll_interval > deadline {
                warn!(operation_id, "Generation poll budget exhausted");
                return Err(GenerationError::Timeout(self.config.poll_timeout.as_secs()));
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }
    }

    /// Stream the finished clip to `staging_dir`, hashing while writing.
    ///
    /// Bytes land in a `.part` file that is renamed into place only after a
    /// successful flush, so a failed download leaves nothing under the
    /// final name.
    async fn download_clip(
        &self,
        spec: &ShotSpec,
        video_url: &str,
        staging_dir: &Path,
    ) -> GenResult<Clip> {
        tokio::fs::create_dir_all(staging_dir).await?;

        let final_path = staging_dir.join(format!("{}.mp4", spec.id.file_stem()));
        let part_path = final_path.with_extension("mp4.part");

        let response = self
            .http
            .get(video_url)
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(GenerationError::from_status(status, &body));
        }

        let result = async {
            let mut file = tokio::fs::File::create(&part_path).await?;
            let mut hasher = Sha256::new();
            let mut size_bytes = 0u64;

            let mut stream = response.bytes_stream();
            while let Some(chunk) = stream.next().await {
                let chunk = chunk.map_err(GenerationError::from)?;
                hasher.update(&chunk);
                size_bytes += chunk.len() as u64;
                file.write_all(&chunk).await?;
            }

            file.flush().await?;
            file.sync_all().await?;
            drop(file);

            if size_bytes == 0 {
                return Err(GenerationError::transient("downloaded clip is empty"));
            }

            tokio::fs::rename(&part_path, &final_path).await?;

            let sha256 = hasher
                .finalize()
                .iter()
                .map(|b| format!("{:02x}", b))
                .collect::<String>();

            Ok(Clip::new(
                spec.id,
                &final_path,
                spec.duration_seconds,
                size_bytes,
                sha256,
            ))
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&part_path).await;
        }

        result
    }
}

#[async_trait]
impl ClipGenerator for HttpGenClient {
    async fn generate(&self, spec: &ShotSpec, staging_dir: &Path) -> GenResult<Clip> {
        // Reject malformed specs before spending a request on them.
        spec.validate()
            .map_err(|e| GenerationError::validation(format!("invalid shot spec: {e}")))?;

        let handle = self.start_operation(spec).await?;
        debug!(shot_id = %spec.id, operation_id = %handle.operation_id, "Generation submitted");

        let video_url = self.poll_operation(&handle.operation_id).await?;
        let clip = self.download_clip(spec, &video_url, staging_dir).await?;

        info!(
            shot_id = %spec.id,
            size_bytes = clip.size_bytes,
            "Clip downloaded to {}",
            clip.path.display()
        );
        Ok(clip)
    }
}

/// Staging path a clip for `spec` would land at.
pub fn staged_clip_path(staging_dir: &Path, spec: &ShotSpec) -> PathBuf {
    staging_dir.join(format!("{}.mp4", spec.id.file_stem()))
}
