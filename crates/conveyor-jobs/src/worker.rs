//! Worker pool for processing jobs.
//!
//! Each of the `max_concurrent` slots runs its own claim loop against the
//! shared queue. Handlers execute on their own task so a panic or a hung
//! handler is contained and bounded by `job_timeout`. A maintenance task
//! recovers expired leases and refreshes gauges.

use crate::backoff::BackoffPolicy;
use crate::config::JobsConfig;
use crate::error::{JobError, JobResult};
use crate::handler::HandlerRegistry;
use crate::hooks::panic_message;
use crate::job::{Job, JobContext, JobId, JobStatus};
use crate::metrics::{JobMetrics, WorkerMetrics};
use crate::queue::JobQueue;
use chrono::Utc;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::{AbortHandle, JoinSet};
use tokio::time::{timeout, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn, Instrument};
use uuid::Uuid;

/// Worker pool configuration.
#[derive(Debug, Clone)]
pub struct WorkerPoolConfig {
    /// Number of concurrent worker slots.
    pub max_concurrent: usize,

    /// Sleep between polls when the queue is empty.
    pub poll_interval: Duration,

    /// Job execution timeout.
    pub job_timeout: Duration,

    /// Drain window on shutdown.
    pub shutdown_timeout: Duration,

    /// Lease age after which a processing job is recovered.
    pub stale_lease_timeout: Option<Duration>,

    /// Maintenance task period.
    pub maintenance_interval: Duration,

    /// Prefix for the pool and worker IDs.
    pub worker_id_prefix: String,

    /// Retry delay policy.
    pub backoff: BackoffPolicy,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::from(&JobsConfig::default())
    }
}

impl From<&JobsConfig> for WorkerPoolConfig {
    fn from(config: &JobsConfig) -> Self {
        Self {
            max_concurrent: config.worker.max_concurrent,
            poll_interval: config.worker.poll_interval(),
            job_timeout: config.worker.job_timeout(),
            shutdown_timeout: config.worker.shutdown_timeout(),
            stale_lease_timeout: config.worker.stale_lease_timeout(),
            maintenance_interval: config.worker.maintenance_interval(),
            worker_id_prefix: config.worker.worker_id_prefix.clone(),
            backoff: config.backoff.policy(),
        }
    }
}

/// A job currently leased by one of this pool's slots.
struct InFlight {
    worker_id: String,
    abort: Option<AbortHandle>,
}

/// State shared between the pool handle and its tasks.
struct Shared {
    pool_id: String,
    queue: Arc<JobQueue>,
    handlers: HandlerRegistry,
    config: WorkerPoolConfig,

    /// Cancelled to stop claiming new work.
    stop: CancellationToken,

    /// Parent of every per-execution token; cancelled when in-flight work is abandoned.
    abandon: CancellationToken,

    in_flight: Mutex<HashMap<JobId, InFlight>>,
    jobs_processed: AtomicU64,
    jobs_failed: AtomicU64,
    jobs_retried: AtomicU64,
}

/// Worker pool for concurrent job processing.
pub struct WorkerPool {
    shared: Arc<Shared>,
    running: AtomicBool,
    tasks: Mutex<Option<JoinSet<()>>>,
}

impl WorkerPool {
    /// Create a new worker pool. The handler registry is fixed for the pool's lifetime.
    pub fn new(queue: Arc<JobQueue>, handlers: HandlerRegistry, config: WorkerPoolConfig) -> Self {
        let suffix = Uuid::new_v4().simple().to_string();
        let pool_id = format!("{}-{}", config.worker_id_prefix, &suffix[..8]);

        Self {
            shared: Arc::new(Shared {
                pool_id,
                queue,
                handlers,
                config,
                stop: CancellationToken::new(),
                abandon: CancellationToken::new(),
                in_flight: Mutex::new(HashMap::new()),
                jobs_processed: AtomicU64::new(0),
                jobs_failed: AtomicU64::new(0),
                jobs_retried: AtomicU64::new(0),
            }),
            running: AtomicBool::new(false),
            tasks: Mutex::new(None),
        }
    }

    /// Spawn the worker slots and the maintenance task, then return.
    pub fn start(&self) -> JobResult<()> {
        if self.shared.stop.is_cancelled() {
            return Err(JobError::Worker("Worker pool has been shut down".to_string()));
        }
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(JobError::Worker("Worker pool already running".to_string()));
        }

        let config = &self.shared.config;
        info!(
            pool_id = %self.shared.pool_id,
            max_concurrent = config.max_concurrent,
            job_types = ?self.shared.handlers.job_types(),
            "Starting worker pool"
        );
        if self.shared.handlers.is_empty() {
            warn!(pool_id = %self.shared.pool_id, "No job handlers registered");
        }

        let mut tasks = JoinSet::new();
        for slot in 0..config.max_concurrent.max(1) {
            let worker_id = format!("{}-{}", self.shared.pool_id, slot);
            let span = tracing::info_span!("worker", worker_id = %worker_id);
            tasks.spawn(self.shared.clone().run_slot(worker_id).instrument(span));
        }
        tasks.spawn(
            self.shared
                .clone()
                .run_maintenance()
                .instrument(tracing::info_span!("maintenance")),
        );

        WorkerMetrics::update_workers(&self.shared.pool_id, 0, config.max_concurrent);
        *self.tasks.lock() = Some(tasks);
        Ok(())
    }

    /// Stop claiming, drain in-flight jobs, and release whatever is left after the drain window.
    pub async fn shutdown(&self) -> JobResult<()> {
        info!(pool_id = %self.shared.pool_id, "Stopping worker pool...");
        self.shared.stop.cancel();

        let tasks = self.tasks.lock().take();
        if let Some(mut tasks) = tasks {
            let drained = timeout(self.shared.config.shutdown_timeout, async {
                while tasks.join_next().await.is_some() {}
            })
            .await;

            if drained.is_err() {
                warn!(
                    pool_id = %self.shared.pool_id,
                    in_flight = self.shared.in_flight.lock().len(),
                    "Shutdown timeout elapsed, abandoning in-flight jobs"
                );
                self.shared.abandon.cancel();
                tasks.abort_all();
                while tasks.join_next().await.is_some() {}
                self.shared.release_abandoned().await;
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!(
            pool_id = %self.shared.pool_id,
            processed = self.jobs_processed(),
            failed = self.jobs_failed(),
            retried = self.jobs_retried(),
            "Worker pool stopped"
        );
        Ok(())
    }

    /// Claim and process a single job on the caller's task.
    ///
    /// Returns `false` when no job was eligible.
    pub async fn process_next(&self) -> JobResult<bool> {
        let worker_id = format!("{}-inline", self.shared.pool_id);
        match self.shared.queue.claim_next(&worker_id, Utc::now()).await? {
            Some(job) => {
                self.shared.process(job, &worker_id).await;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Check if the pool is running.
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Get the number of jobs completed.
    pub fn jobs_processed(&self) -> u64 {
        self.shared.jobs_processed.load(Ordering::Relaxed)
    }

    /// Get the number of jobs failed terminally.
    pub fn jobs_failed(&self) -> u64 {
        self.shared.jobs_failed.load(Ordering::Relaxed)
    }

    /// Get the number of retries scheduled.
    pub fn jobs_retried(&self) -> u64 {
        self.shared.jobs_retried.load(Ordering::Relaxed)
    }

    /// Get the pool ID.
    pub fn id(&self) -> &str {
        &self.shared.pool_id
    }

    /// Get pool statistics.
    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            id: self.shared.pool_id.clone(),
            running: self.is_running(),
            concurrency: self.shared.config.max_concurrent,
            in_flight: self.shared.in_flight.lock().len(),
            jobs_processed: self.jobs_processed(),
            jobs_failed: self.jobs_failed(),
            jobs_retried: self.jobs_retried(),
        }
    }
}

impl Shared {
    async fn run_slot(self: Arc<Self>, worker_id: String) {
        debug!("Worker slot started");

        loop {
            if self.stop.is_cancelled() {
                break;
            }

            match self.queue.claim_next(&worker_id, Utc::now()).await {
                Ok(Some(job)) => {
                    self.process(job, &worker_id).await;
                    continue;
                }
                Ok(None) => {}
                Err(e) => error!(error = %e, "Failed to claim job"),
            }

            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = tokio::time::sleep(self.config.poll_interval) => {}
            }
        }

        debug!("Worker slot stopped");
    }

    async fn process(&self, job: Job, worker_id: &str) {
        self.in_flight.lock().insert(
            job.id.clone(),
            InFlight {
                worker_id: worker_id.to_string(),
                abort: None,
            },
        );

        debug!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts + 1,
            "Processing job"
        );
        self.queue.hooks().start(&job);

        let ctx = job.to_context(worker_id, self.abandon.child_token());
        let started = Instant::now();
        let outcome = self.execute(&job, ctx).await;
        let elapsed = started.elapsed();

        match outcome {
            Ok(()) => self.record_success(&job, worker_id, elapsed).await,
            Err(err) => self.record_failure(&job, worker_id, err).await,
        }

        self.in_flight.lock().remove(&job.id);
    }

    async fn execute(&self, job: &Job, ctx: JobContext) -> Result<(), JobError> {
        let handler = self
            .handlers
            .get(&job.job_type)
            .ok_or_else(|| JobError::UnknownJobType(job.job_type.clone()))?;

        let token = ctx.cancellation.clone();
        let mut task = tokio::spawn(handler(job.payload.clone(), ctx));
        if let Some(entry) = self.in_flight.lock().get_mut(&job.id) {
            entry.abort = Some(task.abort_handle());
        }

        match timeout(self.config.job_timeout, &mut task).await {
            Ok(Ok(result)) => result,
            Ok(Err(join_err)) if join_err.is_panic() => {
                let panic = join_err.into_panic();
                Err(JobError::retry(format!(
                    "handler panicked: {}",
                    panic_message(panic.as_ref())
                )))
            }
            Ok(Err(_)) => Err(JobError::Worker("handler task was cancelled".to_string())),
            Err(_) => {
                token.cancel();
                task.abort();
                let ms = u64::try_from(self.config.job_timeout.as_millis()).unwrap_or(u64::MAX);
                Err(JobError::Timeout(ms))
            }
        }
    }

    async fn record_success(&self, job: &Job, worker_id: &str, elapsed: Duration) {
        match self.queue.complete(&job.id, worker_id).await {
            Ok(done) => {
                self.jobs_processed.fetch_add(1, Ordering::Relaxed);
                debug!(job_id = %job.id, "Job completed successfully");
                self.queue.hooks().complete(&done, elapsed);
            }
            Err(e @ JobError::InvalidState { .. }) => lost_lease(job, worker_id, &e),
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to mark job as complete"),
        }
    }

    async fn record_failure(&self, job: &Job, worker_id: &str, err: JobError) {
        let attempt = u32::try_from(job.attempts + 1).unwrap_or(u32::MAX);
        let retry_delay = (err.is_retryable() && job.can_retry())
            .then(|| self.config.backoff.delay_for_attempt(attempt));
        let retry_at = retry_delay.map(|delay| {
            Utc::now() + chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero())
        });

        warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt,
            max_attempts = job.max_attempts,
            error_kind = err.kind(),
            error = %err,
            will_retry = retry_at.is_some(),
            "Job execution failed"
        );

        match self
            .queue
            .fail(&job.id, worker_id, &err.to_string(), retry_at)
            .await
        {
            Ok(updated) if updated.status == JobStatus::Pending => {
                self.jobs_retried.fetch_add(1, Ordering::Relaxed);
                self.queue
                    .hooks()
                    .retry(&updated, &err, retry_delay.unwrap_or_default());
            }
            Ok(updated) => {
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                self.queue.hooks().fail(&updated, &err);
            }
            Err(e @ JobError::InvalidState { .. }) => lost_lease(job, worker_id, &e),
            Err(e) => error!(job_id = %job.id, error = %e, "Failed to record job failure"),
        }
    }

    /// Abort abandoned handlers and hand their jobs back to the queue.
    async fn release_abandoned(&self) {
        let abandoned: Vec<(JobId, InFlight)> = self.in_flight.lock().drain().collect();

        for (job_id, flight) in abandoned {
            if let Some(abort) = &flight.abort {
                abort.abort();
            }
            match self.queue.release(&job_id, &flight.worker_id).await {
                Ok(Some(_)) => info!(job_id = %job_id, "Released abandoned job"),
                Ok(None) => {}
                Err(e) => error!(job_id = %job_id, error = %e, "Failed to release abandoned job"),
            }
        }
    }

    async fn run_maintenance(self: Arc<Self>) {
        let period = self.config.maintenance_interval.max(Duration::from_millis(10));
        let mut ticker = tokio::time::interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = self.stop.cancelled() => break,
                _ = ticker.tick() => {}
            }

            if let Some(horizon) = self.config.stale_lease_timeout {
                self.recover_stale(horizon).await;
            }

            match self.queue.stats().await {
                Ok(stats) => JobMetrics::update_queue_sizes(&stats),
                Err(e) => warn!(error = %e, "Failed to refresh queue stats"),
            }
            let in_flight = self.in_flight.lock().len() as u64;
            WorkerMetrics::update_workers(&self.pool_id, in_flight, self.config.max_concurrent);
        }
    }

    async fn recover_stale(&self, horizon: Duration) {
        let recovered = match self.queue.recover_stale(horizon).await {
            Ok(jobs) => jobs,
            Err(e) => {
                error!(error = %e, "Failed to recover expired leases");
                return;
            }
        };

        let err = JobError::Worker("lease expired".to_string());
        for job in recovered {
            warn!(job_id = %job.id, status = %job.status, "Recovered job with expired lease");
            if job.status == JobStatus::Pending {
                self.jobs_retried.fetch_add(1, Ordering::Relaxed);
                self.queue.hooks().retry(&job, &err, Duration::ZERO);
            } else {
                self.jobs_failed.fetch_add(1, Ordering::Relaxed);
                self.queue.hooks().fail(&job, &err);
            }
        }
    }
}

/// The lease moved on while the handler ran; its outcome is discarded.
fn lost_lease(job: &Job, worker_id: &str, err: &JobError) {
    warn!(
        job_id = %job.id,
        worker_id = %worker_id,
        error = %err,
        "Lease no longer held, dropping job outcome"
    );
}

/// Worker pool statistics.
#[derive(Debug, Clone, Serialize)]
pub struct WorkerPoolStats {
    /// Pool ID.
    pub id: String,

    /// Is running.
    pub running: bool,

    /// Configured concurrency.
    pub concurrency: usize,

    /// Jobs currently executing.
    pub in_flight: usize,

    /// Jobs completed.
    pub jobs_processed: u64,

    /// Jobs failed terminally.
    pub jobs_failed: u64,

    /// Retries scheduled.
    pub jobs_retried: u64,
}
