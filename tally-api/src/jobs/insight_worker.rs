//! Insight Worker Background Task
//!
//! Consumes insight jobs from an in-process queue and processes up to
//! `concurrency` of them at once. Processing an insight:
//!
//! 1. Marks it PROCESSING
//! 2. Summarizes every batch that has neither a summary nor an error,
//!    persisting after each batch so a retried job resumes where it stopped
//! 3. Asks for the overall analysis; success completes the insight, failure
//!    fails it with the provider error in `error_log`
//!
//! A job whose processing returns an error (usually storage) is requeued
//! after `retry_delay`, up to `max_retries` times, then the insight is
//! marked FAILED.
//!
//! Request handlers never wait on the queue. An insight that did not fit is
//! left PENDING and picked up by the sweep that runs every `sweep_interval`.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

use chrono::Utc;
use tally_core::{ConfigError, EntityId, TallyError, TallyResult};
use tally_llm::InsightSummarizer;
use tally_storage::{InsightStore, Store};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::MissedTickBehavior;

use crate::config::parse_env;
use crate::error::{ApiError, ApiResult};
use crate::telemetry::with_metrics;

const DEFAULT_CONCURRENCY: usize = 5;
const DEFAULT_MAX_RETRIES: u32 = 10;
const DEFAULT_RETRY_DELAY_MS: u64 = 5_000;
const DEFAULT_QUEUE_CAPACITY: usize = 1024;
const DEFAULT_SWEEP_INTERVAL_MS: u64 = 30_000;
const MIN_SWEEP_INTERVAL: Duration = Duration::from_millis(10);

// ============================================================================
// CONFIGURATION
// ============================================================================

/// Configuration for the insight worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Jobs processed at the same time (default: 5)
    pub concurrency: usize,

    /// Requeues allowed after a failed attempt (default: 10)
    pub max_retries: u32,

    /// Wait before a failed job is requeued (default: 5 seconds)
    pub retry_delay: Duration,

    /// Bound of the job queue (default: 1024)
    pub queue_capacity: usize,

    /// How often unfinished insights without a job are queued (default: 30 seconds)
    pub sweep_interval: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sweep_interval: Duration::from_millis(DEFAULT_SWEEP_INTERVAL_MS),
        }
    }
}

impl WorkerConfig {
    /// Create WorkerConfig from environment variables.
    ///
    /// # Environment Variables
    /// - `TALLY_INSIGHT_CONCURRENCY`: concurrent jobs (default: 5)
    /// - `TALLY_INSIGHT_MAX_RETRIES`: requeues per job (default: 10)
    /// - `TALLY_INSIGHT_RETRY_DELAY_MS`: delay before a requeue (default: 5000)
    /// - `TALLY_INSIGHT_QUEUE_CAPACITY`: queue bound (default: 1024)
    /// - `TALLY_INSIGHT_SWEEP_INTERVAL_MS`: sweep period (default: 30000)
    pub fn from_env() -> Result<Self, ConfigError> {
        let config = Self {
            concurrency: parse_env("TALLY_INSIGHT_CONCURRENCY", DEFAULT_CONCURRENCY)?,
            max_retries: parse_env("TALLY_INSIGHT_MAX_RETRIES", DEFAULT_MAX_RETRIES)?,
            retry_delay: Duration::from_millis(parse_env(
                "TALLY_INSIGHT_RETRY_DELAY_MS",
                DEFAULT_RETRY_DELAY_MS,
            )?),
            queue_capacity: parse_env("TALLY_INSIGHT_QUEUE_CAPACITY", DEFAULT_QUEUE_CAPACITY)?,
            sweep_interval: Duration::from_millis(parse_env(
                "TALLY_INSIGHT_SWEEP_INTERVAL_MS",
                DEFAULT_SWEEP_INTERVAL_MS,
            )?),
        };
        config.validate()?;
        Ok(config)
    }

    /// Short delays for local runs and tests.
    pub fn development() -> Self {
        Self {
            concurrency: 2,
            max_retries: 3,
            retry_delay: Duration::from_millis(50),
            queue_capacity: 64,
            sweep_interval: Duration::from_millis(250),
        }
    }

    pub fn production() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            max_retries: DEFAULT_MAX_RETRIES,
            retry_delay: Duration::from_secs(30),
            queue_capacity: 4096,
            sweep_interval: Duration::from_secs(60),
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.concurrency == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TALLY_INSIGHT_CONCURRENCY".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "TALLY_INSIGHT_QUEUE_CAPACITY".to_string(),
                value: "0".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }
        if self.sweep_interval < MIN_SWEEP_INTERVAL {
            return Err(ConfigError::InvalidValue {
                field: "TALLY_INSIGHT_SWEEP_INTERVAL_MS".to_string(),
                value: self.sweep_interval.as_millis().to_string(),
                reason: format!("must be at least {}", MIN_SWEEP_INTERVAL.as_millis()),
            });
        }
        Ok(())
    }
}

// ============================================================================
// QUEUE
// ============================================================================

/// One unit of work: process the insight with this id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsightJob {
    pub insight_id: EntityId,
    /// Zero for the first attempt.
    pub attempt: u32,
}

impl InsightJob {
    pub fn new(insight_id: EntityId) -> Self {
        Self {
            insight_id,
            attempt: 0,
        }
    }

    fn retry(self) -> Self {
        Self {
            attempt: self.attempt + 1,
            ..self
        }
    }
}

/// Producer handle for the insight job queue. Cheap to clone.
///
/// An insight is tracked from the moment its job is queued until the worker
/// is done with it, retries included; a tracked insight is never queued twice.
#[derive(Debug, Clone)]
pub struct InsightQueue {
    sender: mpsc::Sender<InsightJob>,
    tracked: Arc<Mutex<HashSet<EntityId>>>,
}

impl InsightQueue {
    /// Create a bounded queue and its consumer end.
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<InsightJob>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = Self {
            sender,
            tracked: Arc::new(Mutex::new(HashSet::new())),
        };
        (queue, receiver)
    }

    /// Queue the first attempt for an insight without waiting. Fails when the
    /// queue is full or the worker is gone.
    pub fn try_enqueue(&self, insight_id: EntityId) -> ApiResult<()> {
        if !self.tracked().insert(insight_id) {
            return Ok(());
        }
        self.sender
            .try_send(InsightJob::new(insight_id))
            .map_err(|err| {
                self.release(insight_id);
                match err {
                    TrySendError::Full(_) => ApiError::service_unavailable("Insight queue is full"),
                    TrySendError::Closed(_) => {
                        ApiError::service_unavailable("Insight worker is not running")
                    }
                }
            })
    }

    /// Queue the first attempt for an insight, waiting while the queue is
    /// full. Fails only when the worker is gone.
    pub async fn enqueue(&self, insight_id: EntityId) -> ApiResult<()> {
        if !self.tracked().insert(insight_id) {
            return Ok(());
        }
        let result = self.send(InsightJob::new(insight_id)).await;
        if result.is_err() {
            self.release(insight_id);
        }
        result
    }

    /// Whether a job for this insight is queued, running or waiting to retry.
    pub fn is_tracked(&self, insight_id: EntityId) -> bool {
        self.tracked().contains(&insight_id)
    }

    async fn send(&self, job: InsightJob) -> ApiResult<()> {
        self.sender.send(job).await.map_err(|_| {
            ApiError::service_unavailable("Insight worker is not running")
        })
    }

    fn release(&self, insight_id: EntityId) {
        self.tracked().remove(&insight_id);
    }

    fn tracked(&self) -> MutexGuard<'_, HashSet<EntityId>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Resolves once shutdown is requested or the sender is dropped.
async fn shutdown_requested(shutdown_rx: &mut watch::Receiver<bool>) {
    while !*shutdown_rx.borrow_and_update() {
        if shutdown_rx.changed().await.is_err() {
            return;
        }
    }
}

// ============================================================================
// METRICS
// ============================================================================

/// Metrics for the insight worker.
#[derive(Debug, Default)]
pub struct InsightWorkerMetrics {
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub skipped: AtomicU64,
    /// Attempts that errored and were requeued
    pub retried: AtomicU64,
    /// Jobs that ran out of retries
    pub abandoned: AtomicU64,
}

impl InsightWorkerMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn snapshot(&self) -> InsightWorkerSnapshot {
        InsightWorkerSnapshot {
            completed: self.completed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            retried: self.retried.load(Ordering::Relaxed),
            abandoned: self.abandoned.load(Ordering::Relaxed),
        }
    }

    fn record(&self, outcome: JobOutcome) {
        let counter = match outcome {
            JobOutcome::Completed => &self.completed,
            JobOutcome::Failed => &self.failed,
            JobOutcome::Skipped => &self.skipped,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

/// Snapshot of worker metrics at a point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsightWorkerSnapshot {
    pub completed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub retried: u64,
    pub abandoned: u64,
}

// ============================================================================
// PROCESSING
// ============================================================================

/// How a single processing attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
    Completed,
    Failed,
    /// The insight was missing or already terminal.
    Skipped,
}

impl JobOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobOutcome::Completed => "completed",
            JobOutcome::Failed => "failed",
            JobOutcome::Skipped => "skipped",
        }
    }
}

/// Process one insight to a terminal state.
///
/// Summarization failures are recorded on the insight; only storage and
/// lifecycle errors are returned.
pub async fn process_insight(
    store: &dyn Store,
    summarizer: &InsightSummarizer,
    insight_id: EntityId,
) -> TallyResult<JobOutcome> {
    let Some(mut insight) = store.insight_get(insight_id).await? else {
        tracing::warn!(insight_id = %insight_id, "Insight no longer exists, skipping job");
        return Ok(JobOutcome::Skipped);
    };
    if insight.status.is_terminal() {
        tracing::debug!(insight_id = %insight_id, status = %insight.status, "Insight already settled");
        return Ok(JobOutcome::Skipped);
    }

    insight.start_processing(Utc::now())?;
    store.insight_update(&insight).await?;

    for index in insight.unsettled_batches() {
        let result = summarizer
            .summarize_batch(insight.id, insight.context_type, &insight.batches[index])
            .await;
        let batch = &mut insight.batches[index];
        match result {
            Ok(summary) => {
                with_metrics(|m| m.record_summary("batch", true));
                batch.summary = Some(summary);
            }
            Err(err) => {
                with_metrics(|m| m.record_summary("batch", false));
                tracing::warn!(
                    insight_id = %insight_id,
                    batch_number = batch.batch_number,
                    error = %err,
                    "Batch summarization failed"
                );
                batch.error = Some(err.to_string());
            }
        }
        insight.updated_at = Utc::now();
        store.insight_update(&insight).await?;
    }

    let overall = summarizer
        .summarize_overall(insight.id, insight.context_type, &insight.batches)
        .await;
    let outcome = match overall {
        Ok(analysis) => {
            with_metrics(|m| m.record_summary("meta", true));
            insight.complete(analysis, Utc::now())?;
            JobOutcome::Completed
        }
        Err(err) => {
            with_metrics(|m| m.record_summary("meta", false));
            tracing::warn!(insight_id = %insight_id, error = %err, "Overall analysis failed");
            insight.fail(err.to_string(), Utc::now())?;
            JobOutcome::Failed
        }
    };
    store.insight_update(&insight).await?;

    Ok(outcome)
}

// ============================================================================
// WORKER
// ============================================================================

/// The insight worker. Clones share the same store, queue and metrics.
#[derive(Clone)]
pub struct InsightWorker {
    store: Arc<dyn Store>,
    summarizer: InsightSummarizer,
    queue: InsightQueue,
    config: WorkerConfig,
    metrics: Arc<InsightWorkerMetrics>,
}

impl InsightWorker {
    pub fn new(
        store: Arc<dyn Store>,
        summarizer: InsightSummarizer,
        queue: InsightQueue,
        config: WorkerConfig,
    ) -> Self {
        Self {
            store,
            summarizer,
            queue,
            config,
            metrics: Arc::new(InsightWorkerMetrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<InsightWorkerMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Requeue every insight left PENDING or PROCESSING by a previous run.
    ///
    /// Call before [`run`](Self::run) is spawned only if the queue can hold
    /// them all; otherwise spawn `run` first.
    pub async fn recover_unfinished(&self) -> TallyResult<usize> {
        let unfinished = self.store.insight_list_unfinished().await?;
        let count = unfinished.len();
        for insight in unfinished {
            if let Err(e) = self.queue.enqueue(insight.id).await {
                tracing::error!(insight_id = %insight.id, error = %e, "Failed to requeue insight");
            }
        }
        if count > 0 {
            tracing::info!(count, "Requeued unfinished insights");
        }
        Ok(count)
    }

    /// Queue every unfinished insight that has no job, such as one whose
    /// request found the queue full. Stops at the first one that does not fit.
    pub async fn sweep_stranded(&self) -> TallyResult<usize> {
        let unfinished = self.store.insight_list_unfinished().await?;
        let mut queued = 0;
        for insight in unfinished {
            if self.queue.is_tracked(insight.id) {
                continue;
            }
            if let Err(e) = self.queue.try_enqueue(insight.id) {
                tracing::debug!(insight_id = %insight.id, error = %e, "Sweep stopped early");
                break;
            }
            queued += 1;
        }
        if queued > 0 {
            tracing::info!(queued, "Queued stranded insights");
        }
        Ok(queued)
    }

    /// Consume jobs until the shutdown signal fires or the queue closes, then
    /// wait for in-flight jobs to finish.
    pub async fn run(
        self,
        mut receiver: mpsc::Receiver<InsightJob>,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Arc<InsightWorkerMetrics> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let mut tasks = JoinSet::new();
        let period = self.config.sweep_interval.max(MIN_SWEEP_INTERVAL);
        let mut sweep = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
        sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!(
            concurrency = self.config.concurrency,
            max_retries = self.config.max_retries,
            retry_delay_ms = self.config.retry_delay.as_millis() as u64,
            summarizer = self.summarizer.provider_name(),
            "Insight worker started"
        );

        loop {
            tokio::select! {
                _ = shutdown_requested(&mut shutdown_rx) => {
                    tracing::info!("Insight worker shutting down");
                    break;
                }

                job = receiver.recv() => {
                    let Some(job) = job else {
                        tracing::info!("Insight queue closed");
                        break;
                    };
                    let permit = tokio::select! {
                        permit = Arc::clone(&semaphore).acquire_owned() => permit.ok(),
                        _ = shutdown_requested(&mut shutdown_rx) => None,
                    };
                    let Some(permit) = permit else {
                        tracing::info!(insight_id = %job.insight_id, "Insight worker shutting down before job start");
                        break;
                    };
                    let worker = self.clone();
                    tasks.spawn(async move {
                        let _permit = permit;
                        worker.handle(job).await;
                    });
                }

                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    if let Err(e) = joined {
                        tracing::error!(error = %e, "Insight job panicked");
                    }
                }

                _ = sweep.tick() => {
                    if let Err(e) = self.sweep_stranded().await {
                        tracing::warn!(error = %e, "Insight sweep failed");
                    }
                }
            }
        }

        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "Insight job panicked");
            }
        }

        let snapshot = self.metrics.snapshot();
        tracing::info!(
            completed = snapshot.completed,
            failed = snapshot.failed,
            skipped = snapshot.skipped,
            retried = snapshot.retried,
            abandoned = snapshot.abandoned,
            "Insight worker stopped"
        );

        self.metrics
    }

    async fn handle(&self, job: InsightJob) {
        let started = Instant::now();
        with_metrics(|m| m.job_started());
        let result = process_insight(self.store.as_ref(), &self.summarizer, job.insight_id).await;
        with_metrics(|m| m.job_finished());
        let elapsed = started.elapsed().as_secs_f64();

        match result {
            Ok(outcome) => {
                self.queue.release(job.insight_id);
                self.metrics.record(outcome);
                with_metrics(|m| m.record_insight_job(outcome.as_str(), elapsed));
                tracing::info!(
                    insight_id = %job.insight_id,
                    outcome = outcome.as_str(),
                    attempt = job.attempt,
                    duration_ms = (elapsed * 1000.0) as u64,
                    "Insight job finished"
                );
            }
            Err(err) if job.attempt < self.config.max_retries => {
                self.metrics.retried.fetch_add(1, Ordering::Relaxed);
                with_metrics(|m| m.record_insight_job("retried", elapsed));
                tracing::warn!(
                    insight_id = %job.insight_id,
                    attempt = job.attempt,
                    error = %err,
                    "Insight job failed, will retry"
                );
                let queue = self.queue.clone();
                let delay = self.config.retry_delay;
                tokio::spawn(async move {
                    tokio::time::sleep(delay).await;
                    if let Err(e) = queue.send(job.retry()).await {
                        queue.release(job.insight_id);
                        tracing::warn!(insight_id = %job.insight_id, error = %e, "Retry dropped");
                    }
                });
            }
            Err(err) => {
                self.metrics.abandoned.fetch_add(1, Ordering::Relaxed);
                with_metrics(|m| m.record_insight_job("abandoned", elapsed));
                tracing::error!(
                    insight_id = %job.insight_id,
                    attempts = job.attempt + 1,
                    error = %err,
                    "Insight job out of retries"
                );
                self.abandon(job.insight_id, &err).await;
                self.queue.release(job.insight_id);
            }
        }
    }

    /// Best-effort: mark an insight FAILED after its retries ran out.
    async fn abandon(&self, insight_id: EntityId, cause: &TallyError) {
        let insight = match self.store.insight_get(insight_id).await {
            Ok(Some(insight)) if !insight.status.is_terminal() => insight,
            Ok(_) => return,
            Err(e) => {
                tracing::error!(insight_id = %insight_id, error = %e, "Failed to load abandoned insight");
                return;
            }
        };

        let mut insight = insight;
        let now = Utc::now();
        let message = format!("processing abandoned: {}", cause);
        if insight.start_processing(now).is_err() || insight.fail(message, now).is_err() {
            return;
        }
        if let Err(e) = self.store.insight_update(&insight).await {
            tracing::error!(insight_id = %insight_id, error = %e, "Failed to mark insight as failed");
        }
    }
}
