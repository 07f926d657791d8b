//! FFmpeg command builder and runner.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::error::{MediaError, MediaResult};

/// Builder for FFmpeg commands.
///
/// Assembly needs several input clips feeding one filter graph, so unlike a
/// single-file transcode builder this one carries an ordered input list and
/// explicit `-map` selections.
#[derive(Debug, Clone)]
pub struct FfmpegCommand {
    /// Input file paths, in graph order
    inputs: Vec<PathBuf>,
    /// Output file path
    output: PathBuf,
    /// Filter complex graph (if any)
    filter_complex: Option<String>,
    /// Stream selections (after the graph)
    maps: Vec<String>,
    /// Output arguments
    output_args: Vec<String>,
    /// Whether to overwrite output
    overwrite: bool,
    /// Log level
    log_level: String,
}

impl FfmpegCommand {
    /// Create a new FFmpeg command with a single input.
    pub fn new(input: impl AsRef<Path>, output: impl AsRef<Path>) -> Self {
        Self {
            inputs: vec![input.as_ref().to_path_buf()],
            output: output.as_ref().to_path_buf(),
            filter_complex: None,
            maps: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Create a new FFmpeg command over several inputs.
    pub fn with_inputs<I, P>(inputs: I, output: impl AsRef<Path>) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        Self {
            inputs: inputs.into_iter().map(|p| p.as_ref().to_path_buf()).collect(),
            output: output.as_ref().to_path_buf(),
            filter_complex: None,
            maps: Vec::new(),
            output_args: Vec::new(),
            overwrite: true,
            log_level: "error".to_string(),
        }
    }

    /// Set the filter complex graph.
    pub fn filter_complex(mut self, filter: impl Into<String>) -> Self {
        self.filter_complex = Some(filter.into());
        self
    }

    /// Select an output stream (`-map`).
    pub fn map(mut self, selector: impl Into<String>) -> Self {
        self.maps.push(selector.into());
        self
    }

    /// Add an output argument.
    pub fn output_arg(mut self, arg: impl Into<String>) -> Self {
        self.output_args.push(arg.into());
        self
    }

    /// Add multiple output arguments.
    pub fn output_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.output_args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Seek to a position in the (single) input.
    pub fn seek(self, seconds: f64) -> Self {
        self.output_arg("-ss").output_arg(format!("{:.3}", seconds))
    }

    /// Set video filter (simple graph, single input).
    pub fn video_filter(self, filter: impl Into<String>) -> Self {
        self.output_arg("-vf").output_arg(filter)
    }

    /// Extract a single frame.
    pub fn single_frame(self) -> Self {
        self.output_arg("-vframes").output_arg("1")
    }

    /// Set log level.
    pub fn log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Build the command arguments.
    pub fn build_args(&self) -> Vec<String> {
        let mut args = Vec::new();

        if self.overwrite {
            args.push("-y".to_string());
        }

        args.push("-v".to_string());
        args.push(self.log_level.clone());

        for input in &self.inputs {
            args.push("-i".to_string());
            args.push(input.to_string_lossy().to_string());
        }

        if let Some(ref filter) = self.filter_complex {
            args.push("-filter_complex".to_string());
            args.push(filter.clone());
        }

        for map in &self.maps {
            args.push("-map".to_string());
            args.push(map.clone());
        }

        args.extend(self.output_args.clone());

        args.push(self.output.to_string_lossy().to_string());

        args
    }
}

/// Runner for FFmpeg commands with timeout and cancellation.
pub struct FfmpegRunner {
    /// Cancellation signal receiver
    cancel_rx: Option<watch::Receiver<bool>>,
    /// Timeout in seconds
    timeout_secs: Option<u64>,
}

impl Default for FfmpegRunner {
    fn default() -> Self {
        Self::new()
    }
}

impl FfmpegRunner {
    /// Create a new runner.
    pub fn new() -> Self {
        Self {
            cancel_rx: None,
            timeout_secs: None,
        }
    }

    /// Set cancellation signal.
    pub fn with_cancel(mut self, cancel_rx: watch::Receiver<bool>) -> Self {
        self.cancel_rx = Some(cancel_rx);
        self
    }

    /// Set timeout.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }

    /// Run an FFmpeg command to completion.
    pub async fn run(&self, cmd: &FfmpegCommand) -> MediaResult<()> {
        which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)?;

        let args = cmd.build_args();
        debug!("Running FFmpeg: ffmpeg {}", args.join(" "));

        let mut child = Command::new("ffmpeg")
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()?;

        // Collect stderr so failures carry the encoder's own diagnostics.
        let stderr = child.stderr.take();
        let stderr_handle = tokio::spawn(async move {
            let mut lines = Vec::new();
            if let Some(stderr) = stderr {
                let mut reader = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = reader.next_line().await {
                    lines.push(line);
                }
            }
            lines
        });

        let result = self.wait_for_completion(&mut child).await;
        let stderr_lines = stderr_handle.await.unwrap_or_default();

        match result {
            Ok(status) if status.success() => Ok(()),
            Ok(status) => Err(MediaError::ffmpeg_failed(
                "FFmpeg exited with non-zero status",
                Some(tail(&stderr_lines, 20)),
                status.code(),
            )),
            Err(e) => Err(e),
        }
    }

    /// Wait for the child process, honoring cancellation and timeout.
    async fn wait_for_completion(
        &self,
        child: &mut Child,
    ) -> MediaResult<std::process::ExitStatus> {
        let timeout = self
            .timeout_secs
            .map(std::time::Duration::from_secs)
            .unwrap_or(std::time::Duration::from_secs(60 * 60));

        let mut cancel_rx = self.cancel_rx.clone();

        enum Waited {
            Exited(std::io::Result<std::process::ExitStatus>),
            TimedOut,
            Cancelled,
        }

        // The wait future borrows the child; scope it so the kill below
        // can re-borrow.
        let waited = {
            let wait_future = child.wait();
            tokio::pin!(wait_future);
            tokio::select! {
                status = &mut wait_future => Waited::Exited(status),
                _ = tokio::time::sleep(timeout) => Waited::TimedOut,
                _ = wait_cancelled(&mut cancel_rx) => Waited::Cancelled,
            }
        };

        match waited {
            Waited::Exited(status) => Ok(status?),
            Waited::TimedOut => {
                warn!("FFmpeg timed out after {:?}, killing process", timeout);
                let _ = child.kill().await;
                Err(MediaError::Timeout(timeout.as_secs()))
            }
            Waited::Cancelled => {
                info!("FFmpeg cancelled, killing process");
                let _ = child.kill().await;
                Err(MediaError::Cancelled)
            }
        }
    }
}

/// Resolves when the cancellation flag flips to true; pends forever without one.
async fn wait_cancelled(cancel_rx: &mut Option<watch::Receiver<bool>>) {
    match cancel_rx {
        Some(rx) => {
            if *rx.borrow() {
                return;
            }
            while rx.changed().await.is_ok() {
                if *rx.borrow() {
                    return;
                }
            }
            // Sender dropped without cancelling; never resolve.
            std::future::pending::<()>().await;
        }
        None => std::future::pending::<()>().await,
    }
}

fn tail(lines: &[String], n: usize) -> String {
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n")
}

/// Check if FFmpeg is available.
pub fn check_ffmpeg() -> MediaResult<PathBuf> {
    which::which("ffmpeg").map_err(|_| MediaError::FfmpegNotFound)
}

/// Check if FFprobe is available.
pub fn check_ffprobe() -> MediaResult<PathBuf> {
    which::which("ffprobe").map_err(|_| MediaError::FfprobeNotFound)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_input_builder() {
        let cmd = FfmpegCommand::new("input.mp4", "output.jpg")
            .seek(4.0)
            .single_frame()
            .video_filter("scale=480:-2");

        let args = cmd.build_args();
        assert!(args.contains(&"-ss".to_string()));
        assert!(args.contains(&"4.000".to_string()));
        assert!(args.contains(&"-vframes".to_string()));
        assert_eq!(args.last().unwrap(), "output.jpg");
    }

    #[test]
    fn test_multi_input_builder() {
        let cmd = FfmpegCommand::with_inputs(["a.mp4", "b.mp4", "c.mp4"], "out.mp4")
            .filter_complex("[0:v][1:v]xfade=duration=0.5:offset=7.5[v]")
            .map("[v]")
            .output_args(["-b:v", "2000k"]);

        let args = cmd.build_args();
        assert_eq!(args.iter().filter(|a| *a == "-i").count(), 3);

        let fc_pos = args.iter().position(|a| a == "-filter_complex").unwrap();
        let map_pos = args.iter().position(|a| a == "-map").unwrap();
        assert!(fc_pos < map_pos);
        assert!(args.contains(&"[v]".to_string()));
    }

    #[test]
    fn test_tail() {
        let lines: Vec<String> = (0..30).map(|i| format!("line{}", i)).collect();
        let t = tail(&lines, 5);
        assert!(t.starts_with("line25"));
        assert!(t.ends_with("line29"));
    }
}
