//! Pipeline orchestrator: scheduler → assembler, plus the run report.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{error, info, warn};

use reel_gen::ClipGenerator;
use reel_models::{
    ClipJob, JobState, RenditionSpec, RunId, RunPhase, RunSummary, ShotSpec,
};
use reel_store::ClipStore;

use crate::assembler::Assembler;
use crate::config::{FailurePolicy, PipelineConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::scheduler::ClipJobScheduler;
use crate::status::RunStatusHandle;

/// Orchestrates one run: generation, the assembly gate, assembly retries,
/// and the final summary.
pub struct Pipeline {
    run_id: RunId,
    config: PipelineConfig,
    generator: Arc<dyn ClipGenerator>,
    store: Arc<ClipStore>,
    status: RunStatusHandle,
    cancel_tx: watch::Sender<bool>,
}

impl Pipeline {
    /// Create a pipeline over an open store.
    pub fn new(
        run_id: RunId,
        store: ClipStore,
        generator: Arc<dyn ClipGenerator>,
        config: PipelineConfig,
    ) -> Self {
        let (cancel_tx, _) = watch::channel(false);
        Self {
            status: RunStatusHandle::new(run_id.clone(), 0),
            run_id,
            config,
            generator,
            store: Arc::new(store),
            cancel_tx,
        }
    }

    /// Live status handle, queryable mid-run from any task.
    pub fn status(&self) -> RunStatusHandle {
        self.status.clone()
    }

    /// Request cooperative cancellation.
    pub fn cancel(&self) {
        // send_replace works even before any receiver subscribes.
        self.cancel_tx.send_replace(true);
    }

    /// Run the full pipeline and return the run report.
    ///
    /// Per-shot generation failures never abort the batch; they surface in
    /// the summary. Assembly refusal (incomplete set under
    /// `RequireComplete`) and assembly failure yield a summary with phase
    /// Failed and the failure message set.
    pub async fn run(
        &self,
        shots: Vec<ShotSpec>,
        renditions: &[RenditionSpec],
    ) -> PipelineResult<RunSummary> {
        let started_wall = Instant::now();
        let started_at = Utc::now();
        let shots_submitted = shots.len() as u32;

        info!(
            run_id = %self.run_id,
            shots = shots_submitted,
            "Pipeline run starting"
        );
        self.status.update(|s| s.shots_total = shots_submitted);

        let scheduler = ClipJobScheduler::new(
            Arc::clone(&self.generator),
            Arc::clone(&self.store),
            self.config.clone(),
            self.status.clone(),
            self.cancel_tx.subscribe(),
        );
        let jobs = scheduler.run(shots).await?;

        let completed = count_state(&jobs, JobState::Completed);
        let failed = count_state(&jobs, JobState::Failed);
        let retries = jobs
            .iter()
            .map(|j| j.attempts.saturating_sub(1))
            .sum::<u32>();

        let mut summary = RunSummary {
            run_id: self.run_id.clone(),
            phase: RunPhase::Failed,
            shots_submitted,
            shots_completed: completed,
            shots_failed: failed,
            retries_consumed: retries,
            renditions: Vec::new(),
            thumbnail: None,
            total_duration_seconds: None,
            failure: None,
            started_at,
            finished_at: started_at,
            wall_clock_seconds: 0.0,
            shots: jobs.iter().map(|j| j.record()).collect(),
        };

        if *self.cancel_tx.subscribe().borrow() {
            summary.failure = Some("run cancelled".to_string());
            return self.finish(summary, started_wall).await;
        }

        match self.assembly_gate(completed, failed, shots_submitted) {
            Ok(()) => {}
            Err(e) => {
                warn!(run_id = %self.run_id, "Refusing assembly: {e}");
                summary.failure = Some(e.to_string());
                return self.finish(summary, started_wall).await;
            }
        }

        self.status.update(|s| {
            s.set_phase(RunPhase::Assembling);
            s.set_percent(90);
        });

        let clips = self.store.list_completed().await;
        match self.assemble_with_retries(&clips, renditions).await {
            Ok(assembly) => {
                summary.phase = RunPhase::Completed;
                summary.renditions = assembly.renditions;
                summary.thumbnail = Some(assembly.thumbnail);
                summary.total_duration_seconds = Some(assembly.total_duration_seconds);
            }
            Err(e) => {
                error!(run_id = %self.run_id, "Assembly failed: {e}");
                summary.failure = Some(e.to_string());
            }
        }

        self.finish(summary, started_wall).await
    }

    /// Decide whether an incomplete clip set may proceed to assembly.
    fn assembly_gate(
        &self,
        completed: u32,
        failed: u32,
        total: u32,
    ) -> PipelineResult<()> {
        if completed == 0 {
            return Err(PipelineError::IncompleteRun { failed, total });
        }
        if failed > 0 {
            match self.config.failure_policy {
                FailurePolicy::AcceptPartial => {
                    warn!(
                        failed,
                        total, "Assembling partial clip set (caller accepted degraded output)"
                    );
                }
                FailurePolicy::RequireComplete => {
                    return Err(PipelineError::IncompleteRun { failed, total });
                }
            }
        }
        Ok(())
    }

    /// Retry the whole assembly step a small fixed number of times.
    async fn assemble_with_retries(
        &self,
        clips: &[reel_models::Clip],
        renditions: &[RenditionSpec],
    ) -> PipelineResult<reel_models::AssemblyResult> {
        let assembler = Assembler::new(
            self.config.crossfade_seconds,
            self.config.encode_timeout.as_secs(),
        )
        .with_cancel(self.cancel_tx.subscribe());
        let final_dir = self.store.final_dir();

        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match assembler.assemble(clips, renditions, &final_dir).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_assembly_retryable() && attempt <= self.config.assembly_retries => {
                    warn!(attempt, "Assembly attempt failed, retrying: {e}");
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// Stamp timings, persist `summary.json`, push the terminal status.
    async fn finish(
        &self,
        mut summary: RunSummary,
        started_wall: Instant,
    ) -> PipelineResult<RunSummary> {
        summary.finished_at = Utc::now();
        summary.wall_clock_seconds = started_wall.elapsed().as_secs_f64();
        self.store.write_summary(&summary).await?;

        let phase = summary.phase;
        self.status.update(|s| {
            s.set_phase(phase);
            if phase == RunPhase::Completed {
                s.set_percent(100);
            }
        });
        metrics::histogram!("reel_run_wall_clock_seconds").record(summary.wall_clock_seconds);

        info!(
            run_id = %self.run_id,
            phase = %summary.phase,
            completed = summary.shots_completed,
            failed = summary.shots_failed,
            retries = summary.retries_consumed,
            "Pipeline run finished in {:.1}s",
            summary.wall_clock_seconds
        );
        Ok(summary)
    }
}

fn count_state(jobs: &[ClipJob], state: JobState) -> u32 {
    jobs.iter().filter(|j| j.state == state).count() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::Path;

    struct UnusedGenerator;

    #[async_trait]
    impl ClipGenerator for UnusedGenerator {
        async fn generate(
            &self,
            _spec: &ShotSpec,
            _staging_dir: &Path,
        ) -> Result<reel_models::Clip, reel_gen::GenerationError> {
            Err(reel_gen::GenerationError::transient("not wired in tests"))
        }
    }

    async fn pipeline_with(policy: FailurePolicy) -> (tempfile::TempDir, Pipeline) {
        let dir = tempfile::TempDir::new().unwrap();
        let store = ClipStore::open(dir.path()).await.unwrap();
        let config = PipelineConfig {
            failure_policy: policy,
            ..PipelineConfig::default()
        };
        let pipeline = Pipeline::new(
            RunId::from_string("test-run"),
            store,
            Arc::new(UnusedGenerator),
            config,
        );
        (dir, pipeline)
    }

    #[tokio::test]
    async fn test_gate_refuses_incomplete_set_by_default() {
        let (_dir, pipeline) = pipeline_with(FailurePolicy::RequireComplete).await;

        assert!(pipeline.assembly_gate(4, 0, 4).is_ok());
        let err = pipeline.assembly_gate(3, 1, 4).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::IncompleteRun { failed: 1, total: 4 }
        ));
    }

    #[tokio::test]
    async fn test_gate_allows_partial_only_on_opt_in() {
        let (_dir, pipeline) = pipeline_with(FailurePolicy::AcceptPartial).await;

        assert!(pipeline.assembly_gate(3, 1, 4).is_ok());
        // Even with opt-in, zero clips is never assemblable.
        assert!(pipeline.assembly_gate(0, 4, 4).is_err());
    }
}
