//! Clip job scheduler.
//!
//! Owns the pending queue and every job/quota state transition. Workers are
//! spawned up to the concurrency cap and report back over a channel; they
//! never mutate shared state. Retry delays, quota pauses and the
//! single-probe resume all live in the dispatch loop here.

use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::collections::BinaryHeap;
use std::sync::Arc;

use tokio::sync::{mpsc, watch};
use tokio::time::Instant;
use tracing::{debug, info};

use reel_gen::{ClipGenerator, GenerationError};
use reel_models::{Clip, ClipJob, FailureKind, JobError, ShotSpec};
use reel_store::ClipStore;

use crate::config::PipelineConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::logging::ShotLogger;
use crate::quota::QuotaTracker;
use crate::retry::{RetryDecision, RetryPolicy};
use crate::status::RunStatusHandle;

type WorkerResult = (u32, Result<Clip, GenerationError>);

/// Drives every shot job to a terminal state.
pub struct ClipJobScheduler {
    generator: Arc<dyn ClipGenerator>,
    store: Arc<ClipStore>,
    policy: RetryPolicy,
    config: PipelineConfig,
    status: RunStatusHandle,
    cancel_rx: watch::Receiver<bool>,
}

impl ClipJobScheduler {
    /// Create a scheduler.
    pub fn new(
        generator: Arc<dyn ClipGenerator>,
        store: Arc<ClipStore>,
        config: PipelineConfig,
        status: RunStatusHandle,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            generator,
            store,
            policy: RetryPolicy::from_config(&config),
            config,
            status,
            cancel_rx,
        }
    }

    /// Run every shot to a terminal state and return the jobs.
    ///
    /// Shots with a verified Completed record in the store are not
    /// re-submitted. Per-shot failures are absorbed; the batch always runs
    /// to quiescence.
    pub async fn run(&self, shots: Vec<ShotSpec>) -> PipelineResult<Vec<ClipJob>> {
        let mut jobs: BTreeMap<u32, ClipJob> = BTreeMap::new();
        for spec in shots {
            if jobs.insert(spec.id.as_u32(), ClipJob::new(spec)).is_some() {
                return Err(PipelineError::validation("duplicate shot id in run"));
            }
        }

        let mut quota = QuotaTracker::new(
            self.config.quota_failure_threshold,
            self.config.quota_cooldown,
            self.config.quota_max_cooldown,
        );
        let mut pending: BinaryHeap<Reverse<(Instant, u32)>> = BinaryHeap::new();

        // Resume pass: trust only records whose clip file is still intact.
        let prior: BTreeMap<u32, u32> = self
            .store
            .load_records()
            .await
            .into_iter()
            .map(|r| (r.shot_id.as_u32(), r.attempts))
            .collect();
        let now = Instant::now();
        for (id, job) in jobs.iter_mut() {
            if self.store.load_verified(job.shot_id()).await.is_some() {
                job.attempts = prior.get(id).copied().unwrap_or(1);
                job.complete();
                info!(shot_id = %job.shot_id(), "Shot already completed, skipping");
            } else {
                pending.push(Reverse((now, *id)));
            }
        }
        self.store
            .record_jobs(jobs.values().map(|j| j.record()).collect())
            .await?;
        self.push_status(&jobs, &quota);

        let (tx, mut rx) = mpsc::channel::<WorkerResult>(self.config.max_concurrency.max(1));
        let mut in_flight: usize = 0;
        let mut probe_shot: Option<u32> = None;
        let mut cancel_rx = self.cancel_rx.clone();

        loop {
            if *cancel_rx.borrow() {
                self.cancel_remaining(&mut jobs).await?;
                break;
            }
            if jobs.values().all(|j| j.state.is_terminal()) {
                break;
            }

            let now = Instant::now();

            if quota.is_exhausted() {
                // Drain in-flight results first; then wait out the
                // cool-down and send a single probe.
                if in_flight == 0 {
                    if let Some(resume_at) = quota.resume_at() {
                        if resume_at > now {
                            self.status.update(|s| s.quota_paused = true);
                            tokio::select! {
                                _ = tokio::time::sleep_until(resume_at) => {}
                                _ = cancel_changed(&mut cancel_rx) => continue,
                            }
                        }
                    }
                    if let Some(Reverse((_, id))) = pending.pop() {
                        self.dispatch(&mut jobs, id, &tx, &mut in_flight).await?;
                        probe_shot = Some(id);
                        debug!(shot_id = id, "Dispatched quota probe");
                    }
                }
            } else {
                while in_flight < self.config.max_concurrency {
                    match pending.peek() {
                        Some(Reverse((at, _))) if *at <= now => {
                            let Reverse((_, id)) = pending.pop().unwrap();
                            self.dispatch(&mut jobs, id, &tx, &mut in_flight).await?;
                        }
                        _ => break,
                    }
                }
            }

            // Earliest retry eligibility matters only when a slot is free.
            let next_eligible = if !quota.is_exhausted() && in_flight < self.config.max_concurrency
            {
                pending.peek().map(|Reverse((at, _))| *at)
            } else {
                None
            };

            if in_flight == 0 && next_eligible.is_none() {
                // Nothing running and nothing to wait for; the terminal
                // check at the top of the loop decides what happens next.
                continue;
            }

            tokio::select! {
                result = rx.recv(), if in_flight > 0 => {
                    if let Some((id, result)) = result {
                        in_flight -= 1;
                        let was_probe = probe_shot == Some(id);
                        if was_probe {
                            probe_shot = None;
                        }
                        self.handle_result(&mut jobs, &mut pending, &mut quota, id, result, was_probe)
                            .await?;
                    }
                }
                _ = cancel_changed(&mut cancel_rx) => {}
                _ = sleep_until_opt(next_eligible) => {}
            }

            self.push_status(&jobs, &quota);
        }

        self.push_status(&jobs, &quota);
        Ok(jobs.into_values().collect())
    }

    /// Dispatch one job to a worker task.
    async fn dispatch(
        &self,
        jobs: &mut BTreeMap<u32, ClipJob>,
        id: u32,
        tx: &mpsc::Sender<WorkerResult>,
        in_flight: &mut usize,
    ) -> PipelineResult<()> {
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(());
        };
        job.start_attempt();
        ShotLogger::new(job.shot_id(), "generate").started(job.attempts);
        self.store.record_job(job.record()).await?;

        let spec = job.spec.clone();
        let generator = Arc::clone(&self.generator);
        let staging = self.store.staging_dir();
        let tx = tx.clone();
        tokio::spawn(async move {
            let result = generator.generate(&spec, &staging).await;
            // Receiver may be gone after cancellation; late results are
            // deliberately discarded.
            let _ = tx.send((spec.id.as_u32(), result)).await;
        });

        *in_flight += 1;
        metrics::counter!("reel_generation_dispatched_total").increment(1);
        Ok(())
    }

    /// Apply one worker result: the only place job and quota state change.
    async fn handle_result(
        &self,
        jobs: &mut BTreeMap<u32, ClipJob>,
        pending: &mut BinaryHeap<Reverse<(Instant, u32)>>,
        quota: &mut QuotaTracker,
        id: u32,
        result: Result<Clip, GenerationError>,
        was_probe: bool,
    ) -> PipelineResult<()> {
        let Some(job) = jobs.get_mut(&id) else {
            return Ok(());
        };
        let logger = ShotLogger::new(job.shot_id(), "generate");

        match result {
            Ok(clip) => {
                quota.record_success(was_probe);
                job.complete();
                let attempts = job.attempts;
                self.store.save(clip, attempts).await?;
                logger.completed(attempts);
                metrics::counter!("reel_shots_completed_total").increment(1);

                if was_probe {
                    // Quota recovered: stop waiting out per-job cool-downs.
                    let now = Instant::now();
                    let ids: Vec<u32> =
                        pending.drain().map(|Reverse((_, id))| id).collect();
                    for id in ids {
                        pending.push(Reverse((now, id)));
                    }
                }
            }
            Err(e) => {
                if e.is_quota() {
                    quota.record_quota_error();
                    metrics::counter!("reel_quota_rejections_total").increment(1);
                } else {
                    quota.record_other_failure();
                }

                let job_error = JobError::new(e.kind(), e.to_string());
                match self.policy.decide(&e, job.attempts) {
                    RetryDecision::Retry { after } => {
                        logger.retrying(job.attempts, after.as_millis(), &job_error.message);
                        job.retry_later(job_error);
                        pending.push(Reverse((Instant::now() + after, id)));
                        metrics::counter!("reel_shot_retries_total").increment(1);
                    }
                    RetryDecision::GiveUp => {
                        logger.failed(job.attempts, &job_error.message);
                        job.fail(job_error);
                        metrics::counter!("reel_shots_failed_total").increment(1);
                    }
                }
                self.store.record_job(job.record()).await?;
            }
        }

        Ok(())
    }

    /// Mark every non-terminal job Failed/Canceled; in-flight work is
    /// abandoned, its eventual result discarded.
    async fn cancel_remaining(&self, jobs: &mut BTreeMap<u32, ClipJob>) -> PipelineResult<()> {
        info!("Cancellation requested; abandoning remaining shots");
        let mut records = Vec::new();
        for job in jobs.values_mut() {
            if !job.state.is_terminal() {
                job.fail(JobError::new(FailureKind::Canceled, "run cancelled"));
                records.push(job.record());
            }
        }
        if !records.is_empty() {
            self.store.record_jobs(records).await?;
        }
        Ok(())
    }

    fn push_status(&self, jobs: &BTreeMap<u32, ClipJob>, quota: &QuotaTracker) {
        let total = jobs.len() as u32;
        let completed = jobs
            .values()
            .filter(|j| j.state == reel_models::JobState::Completed)
            .count() as u32;
        let failed = jobs
            .values()
            .filter(|j| j.state == reel_models::JobState::Failed)
            .count() as u32;
        let shots = jobs
            .values()
            .map(|j| reel_models::ShotProgress {
                shot_id: j.shot_id(),
                state: j.state,
                attempts: j.attempts,
                error: j.last_error.clone(),
            })
            .collect();
        let quota_paused = quota.is_exhausted();

        self.status.update(|s| {
            s.shots_completed = completed;
            s.shots_failed = failed;
            s.quota_paused = quota_paused;
            s.shots = shots;
            // Generation owns the first 90 points; assembly the rest.
            let pct = if total == 0 {
                90
            } else {
                ((completed + failed) * 90 / total) as u8
            };
            s.set_percent(pct);
        });
    }
}

/// Sleep until the deadline, or forever when there is none.
async fn sleep_until_opt(deadline: Option<Instant>) {
    match deadline {
        Some(d) => tokio::time::sleep_until(d).await,
        None => std::future::pending().await,
    }
}

/// Resolve when the cancellation flag changes; a dropped sender (no
/// cancellation possible anymore) pends forever instead of spinning.
async fn cancel_changed(rx: &mut watch::Receiver<bool>) {
    if rx.changed().await.is_err() {
        std::future::pending::<()>().await;
    }
}
