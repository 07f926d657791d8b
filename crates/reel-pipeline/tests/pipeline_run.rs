//! End-to-end pipeline runs against a scripted in-memory generator.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use reel_gen::{ClipGenerator, GenerationError};
use reel_models::{default_renditions, Clip, JobState, RunId, RunPhase, ShotSpec};
use reel_pipeline::{FailurePolicy, Pipeline, PipelineConfig};
use reel_store::ClipStore;

/// Generator that succeeds for every shot except a configured reject set.
struct ScriptedGenerator {
    reject: HashSet<u32>,
    calls: Mutex<Vec<u32>>,
}

impl ScriptedGenerator {
    fn new(reject: &[u32]) -> Self {
        Self {
            reject: reject.iter().copied().collect(),
            calls: Mutex::new(Vec::new()),
        }
    }

    fn calls(&self) -> Vec<u32> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ClipGenerator for ScriptedGenerator {
    async fn generate(&self, spec: &ShotSpec, staging_dir: &Path) -> Result<Clip, GenerationError> {
        self.calls.lock().unwrap().push(spec.id.as_u32());
        tokio::time::sleep(Duration::from_millis(2)).await;

        if self.reject.contains(&spec.id.as_u32()) {
            return Err(GenerationError::validation("prompt rejected by service"));
        }

        tokio::fs::create_dir_all(staging_dir).await.unwrap();
        let path = staging_dir.join(format!("{}.mp4", spec.id.file_stem()));
        let bytes = vec![0x42u8; 4096];
        tokio::fs::write(&path, &bytes).await.unwrap();
        Ok(Clip::new(
            spec.id,
            path,
            spec.duration_seconds,
            bytes.len() as u64,
            "scriptedhash",
        ))
    }
}

fn shots(n: u32) -> Vec<ShotSpec> {
    (1..=n)
        .map(|i| ShotSpec::new(i, "A slow pan across a rainy neon street", 8.0))
        .collect()
}

fn fast_config(policy: FailurePolicy) -> PipelineConfig {
    PipelineConfig {
        max_concurrency: 2,
        retry_base_delay: Duration::from_millis(1),
        retry_max_delay: Duration::from_millis(5),
        retry_jitter_frac: 0.0,
        quota_cooldown: Duration::from_millis(20),
        quota_max_cooldown: Duration::from_millis(100),
        failure_policy: policy,
        ..PipelineConfig::default()
    }
}

#[tokio::test]
async fn test_run_with_failed_shot_refuses_assembly() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ClipStore::open(dir.path()).await.unwrap();
    let generator = Arc::new(ScriptedGenerator::new(&[2]));

    let pipeline = Pipeline::new(
        RunId::from_string("run-refuse"),
        store,
        Arc::clone(&generator) as Arc<dyn ClipGenerator>,
        fast_config(FailurePolicy::RequireComplete),
    );

    let summary = pipeline
        .run(shots(3), &default_renditions())
        .await
        .unwrap();

    assert_eq!(summary.phase, RunPhase::Failed);
    assert_eq!(summary.shots_completed, 2);
    assert_eq!(summary.shots_failed, 1);
    assert!(summary.renditions.is_empty());
    assert!(summary.thumbnail.is_none());
    assert!(summary.failure.is_some());

    // The rejected shot was never retried.
    let rejected = summary
        .shots
        .iter()
        .find(|r| r.shot_id.as_u32() == 2)
        .unwrap();
    assert_eq!(rejected.state, JobState::Failed);
    assert_eq!(rejected.attempts, 1);

    // Nothing landed in final/.
    let mut final_entries = tokio::fs::read_dir(dir.path().join("final")).await.unwrap();
    assert!(final_entries.next_entry().await.unwrap().is_none());

    // The summary is on disk and parses back.
    let bytes = tokio::fs::read(dir.path().join("summary.json")).await.unwrap();
    let persisted: reel_models::RunSummary = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(persisted.shots_completed, 2);
    assert_eq!(persisted.shots.len(), 3);
}

#[tokio::test]
async fn test_rerun_resumes_from_persisted_clips() {
    let dir = tempfile::TempDir::new().unwrap();

    // First run: shot 2 is rejected, the other clips persist.
    {
        let store = ClipStore::open(dir.path()).await.unwrap();
        let generator = Arc::new(ScriptedGenerator::new(&[2]));
        let pipeline = Pipeline::new(
            RunId::from_string("run-resume"),
            store,
            Arc::clone(&generator) as Arc<dyn ClipGenerator>,
            fast_config(FailurePolicy::RequireComplete),
        );
        let summary = pipeline.run(shots(3), &default_renditions()).await.unwrap();
        assert_eq!(summary.phase, RunPhase::Failed);
    }

    // Second run with a now-working service: only shot 2 is resubmitted.
    let store = ClipStore::open(dir.path()).await.unwrap();
    let generator = Arc::new(ScriptedGenerator::new(&[]));
    let pipeline = Pipeline::new(
        RunId::from_string("run-resume"),
        store,
        Arc::clone(&generator) as Arc<dyn ClipGenerator>,
        fast_config(FailurePolicy::RequireComplete),
    );
    let summary = pipeline.run(shots(3), &default_renditions()).await.unwrap();

    assert_eq!(summary.shots_completed, 3);
    assert_eq!(generator.calls(), vec![2]);
}

#[tokio::test]
async fn test_cancelled_run_reports_cancellation() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ClipStore::open(dir.path()).await.unwrap();
    let generator = Arc::new(ScriptedGenerator::new(&[]));

    let pipeline = Arc::new(Pipeline::new(
        RunId::from_string("run-cancel"),
        store,
        Arc::clone(&generator) as Arc<dyn ClipGenerator>,
        fast_config(FailurePolicy::RequireComplete),
    ));

    // Cancel before the run starts; the scheduler sees the flag on its
    // first dispatch cycle.
    pipeline.cancel();
    let summary = pipeline.run(shots(3), &default_renditions()).await.unwrap();

    assert_eq!(summary.phase, RunPhase::Failed);
    assert_eq!(summary.failure.as_deref(), Some("run cancelled"));
    assert_eq!(summary.shots_completed, 0);
    assert!(summary
        .shots
        .iter()
        .all(|r| r.state == JobState::Failed));
}

#[tokio::test]
async fn test_status_is_queryable_mid_run() {
    let dir = tempfile::TempDir::new().unwrap();
    let store = ClipStore::open(dir.path()).await.unwrap();
    let generator = Arc::new(ScriptedGenerator::new(&[3]));

    let pipeline = Arc::new(Pipeline::new(
        RunId::from_string("run-status"),
        store,
        Arc::clone(&generator) as Arc<dyn ClipGenerator>,
        fast_config(FailurePolicy::RequireComplete),
    ));
    let status = pipeline.status();

    let runner = Arc::clone(&pipeline);
    let handle = tokio::spawn(async move {
        runner.run(shots(3), &default_renditions()).await.unwrap()
    });

    // Snapshots never panic and converge to a terminal phase.
    let summary = handle.await.unwrap();
    let snap = status.snapshot();
    assert_eq!(snap.shots_total, 3);
    assert!(snap.phase.is_terminal());
    assert_eq!(snap.shots_completed, summary.shots_completed);
    assert_eq!(snap.shots.len(), 3);
}
