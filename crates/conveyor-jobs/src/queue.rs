//! Job queue abstraction.
//!
//! [`JobStore`] is the persistence contract implemented by each backend.
//! [`JobQueue`] wraps a store with input validation and lifecycle hooks and
//! is what the worker pool and the HTTP layer talk to.

use crate::error::{JobError, JobResult};
use crate::hooks::{HookRunner, JobHooks};
use crate::job::{Job, JobId, JobStatus, TypedJob, DEFAULT_MAX_ATTEMPTS};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Job priority levels.
///
/// Declaration order matches the database enum so `ORDER BY priority DESC`
/// yields critical first.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "job_priority", rename_all = "snake_case")]
pub enum Priority {
    /// Background work.
    Low,
    /// Default.
    #[default]
    Normal,
    /// Important work.
    High,
    /// Time-sensitive work.
    Critical,
}

impl Priority {
    /// Ordering weight; only ever compared, never stored.
    pub fn weight(&self) -> u8 {
        match self {
            Priority::Low => 25,
            Priority::Normal => 50,
            Priority::High => 75,
            Priority::Critical => 100,
        }
    }

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Normal => "normal",
            Priority::High => "high",
            Priority::Critical => "critical",
        }
    }
}

impl fmt::Display for Priority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "low" => Ok(Priority::Low),
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "critical" => Ok(Priority::Critical),
            other => Err(format!("unknown priority: {}", other)),
        }
    }
}

/// Builder for enqueuing jobs with options.
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub job_type: String,
    pub payload: serde_json::Value,
    pub priority: Priority,
    /// Falls back to the queue default when unset.
    pub max_attempts: Option<i32>,
    pub scheduled_for: Option<DateTime<Utc>>,
    pub metadata: Option<serde_json::Value>,
}

impl NewJob {
    /// Create a new job request.
    pub fn new(job_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            job_type: job_type.into(),
            payload,
            priority: Priority::Normal,
            max_attempts: None,
            scheduled_for: None,
            metadata: None,
        }
    }

    /// Build a request from a typed job.
    pub fn typed<J: TypedJob>(job: &J) -> JobResult<Self> {
        Ok(Self::new(J::JOB_TYPE, serde_json::to_value(job)?).max_attempts(J::MAX_ATTEMPTS))
    }

    /// Set the priority.
    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    /// Set the attempt ceiling.
    pub fn max_attempts(mut self, max_attempts: i32) -> Self {
        self.max_attempts = Some(max_attempts);
        self
    }

    /// Schedule for a specific time.
    pub fn at(mut self, scheduled_for: DateTime<Utc>) -> Self {
        self.scheduled_for = Some(scheduled_for);
        self
    }

    /// Set a delay before the job becomes eligible.
    pub fn delay(mut self, delay: Duration) -> Self {
        let delay = chrono::Duration::from_std(delay).unwrap_or_else(|_| chrono::Duration::zero());
        self.scheduled_for = Some(Utc::now() + delay);
        self
    }

    /// Attach application metadata.
    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Check caller-supplied fields.
    pub fn validate(&self) -> JobResult<()> {
        if self.job_type.trim().is_empty() {
            return Err(JobError::Validation("job_type is required".to_string()));
        }
        if let Some(max) = self.max_attempts {
            if max < 1 {
                return Err(JobError::Validation(format!(
                    "max_attempts must be at least 1, got {}",
                    max
                )));
            }
        }
        Ok(())
    }
}

/// Aggregate job counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueStats {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total: u64,
}

impl QueueStats {
    /// Add `count` jobs of `status`.
    pub fn record(&mut self, status: JobStatus, count: u64) {
        match status {
            JobStatus::Pending => self.pending += count,
            JobStatus::Processing => self.processing += count,
            JobStatus::Completed => self.completed += count,
            JobStatus::Failed => self.failed += count,
            JobStatus::Cancelled => self.cancelled += count,
        }
        self.total += count;
    }
}

/// Persistence contract for job backends.
///
/// `claim_next` must be atomic: concurrent callers never receive the same job.
#[async_trait]
pub trait JobStore: Send + Sync {
    /// Insert a validated job as `pending` with zero attempts.
    async fn insert(&self, job: NewJob, max_attempts: i32, now: DateTime<Utc>) -> JobResult<Job>;

    /// Lease the best eligible job to `worker_id`.
    async fn claim_next(&self, worker_id: &str, now: DateTime<Utc>) -> JobResult<Option<Job>>;

    /// Mark a job leased by `worker_id` completed. Idempotent for completed jobs.
    async fn complete(&self, id: &JobId, worker_id: &str, now: DateTime<Utc>) -> JobResult<Job>;

    /// Record a failed attempt by `worker_id`; requeue at `retry_at` or fail terminally.
    ///
    /// A retry that would exhaust `max_attempts` is recorded as terminal.
    /// Fails with `InvalidState` once the lease belongs to another worker.
    async fn fail(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> JobResult<Job>;

    /// Cancel a pending or failed job.
    async fn cancel(&self, id: &JobId, now: DateTime<Utc>) -> JobResult<Job>;

    /// Return a job leased by `worker_id` to `pending` without consuming an attempt.
    async fn release(&self, id: &JobId, worker_id: &str, now: DateTime<Utc>)
        -> JobResult<Option<Job>>;

    /// Treat leases older than `horizon` as failed attempts.
    async fn recover_stale(&self, now: DateTime<Utc>, horizon: Duration) -> JobResult<Vec<Job>>;

    /// Fetch a job by ID.
    async fn get(&self, id: &JobId) -> JobResult<Job>;

    /// Pending jobs, oldest first.
    async fn list_pending(&self, limit: usize) -> JobResult<Vec<Job>>;

    /// Processing jobs, oldest first.
    async fn list_processing(&self) -> JobResult<Vec<Job>>;

    /// Counts by status.
    async fn stats(&self) -> JobResult<QueueStats>;

    /// Backend liveness probe.
    async fn health_check(&self) -> JobResult<()>;
}

/// Queue façade over a [`JobStore`].
#[derive(Clone)]
pub struct JobQueue {
    store: Arc<dyn JobStore>,
    hooks: HookRunner,
    default_max_attempts: i32,
}

impl JobQueue {
    /// Create a queue without hooks.
    pub fn new(store: Arc<dyn JobStore>) -> Self {
        Self {
            store,
            hooks: HookRunner::default(),
            default_max_attempts: DEFAULT_MAX_ATTEMPTS,
        }
    }

    /// Add a hook implementation.
    pub fn with_hooks(mut self, hooks: Arc<dyn JobHooks>) -> Self {
        self.hooks.push(hooks);
        self
    }

    /// Override the attempt ceiling applied when a request omits one.
    pub fn with_default_max_attempts(mut self, max_attempts: i32) -> Self {
        self.default_max_attempts = max_attempts.max(1);
        self
    }

    /// Lifecycle hooks attached to this queue.
    pub fn hooks(&self) -> &HookRunner {
        &self.hooks
    }

    /// The underlying store.
    pub fn store(&self) -> &Arc<dyn JobStore> {
        &self.store
    }

    /// Validate and persist a new job.
    pub async fn enqueue(&self, new_job: NewJob) -> JobResult<Job> {
        new_job.validate()?;
        let max_attempts = new_job.max_attempts.unwrap_or(self.default_max_attempts);
        let job = self.store.insert(new_job, max_attempts, Utc::now()).await?;
        self.hooks.enqueue(&job);
        Ok(job)
    }

    /// Enqueue a typed job.
    pub async fn enqueue_typed<J: TypedJob>(&self, job: &J) -> JobResult<Job> {
        self.enqueue(NewJob::typed(job)?).await
    }

    /// Lease the next eligible job.
    pub async fn claim_next(&self, worker_id: &str, now: DateTime<Utc>) -> JobResult<Option<Job>> {
        let claimed = self.store.claim_next(worker_id, now).await?;
        if let Some(job) = &claimed {
            debug!(job_id = %job.id, job_type = %job.job_type, worker_id = %worker_id, "Job claimed");
        }
        Ok(claimed)
    }

    /// Mark a job completed on behalf of the lease holder.
    pub async fn complete(&self, id: &JobId, worker_id: &str) -> JobResult<Job> {
        self.store.complete(id, worker_id, Utc::now()).await
    }

    /// Record a failed attempt on behalf of the lease holder.
    pub async fn fail(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
    ) -> JobResult<Job> {
        self.store.fail(id, worker_id, error, retry_at, Utc::now()).await
    }

    /// Cancel a pending or failed job.
    pub async fn cancel(&self, id: &JobId) -> JobResult<Job> {
        let job = self.store.cancel(id, Utc::now()).await?;
        self.hooks.cancel(&job);
        Ok(job)
    }

    /// Return a leased job to the queue.
    pub async fn release(&self, id: &JobId, worker_id: &str) -> JobResult<Option<Job>> {
        self.store.release(id, worker_id, Utc::now()).await
    }

    /// Recover jobs whose lease is older than `horizon`.
    pub async fn recover_stale(&self, horizon: Duration) -> JobResult<Vec<Job>> {
        self.store.recover_stale(Utc::now(), horizon).await
    }

    /// Fetch a job by ID.
    pub async fn get(&self, id: &JobId) -> JobResult<Job> {
        self.store.get(id).await
    }

    /// Pending jobs, oldest first.
    pub async fn list_pending(&self, limit: usize) -> JobResult<Vec<Job>> {
        self.store.list_pending(limit).await
    }

    /// Processing jobs, oldest first.
    pub async fn list_processing(&self) -> JobResult<Vec<Job>> {
        self.store.list_processing().await
    }

    /// Counts by status.
    pub async fn stats(&self) -> JobResult<QueueStats> {
        self.store.stats().await
    }

    /// Backend liveness probe.
    pub async fn health_check(&self) -> JobResult<()> {
        self.store.health_check().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hooks::HookResult;
    use crate::memory::MemoryJobStore;
    use parking_lot::Mutex;
    use serde_json::json;

    #[derive(Default)]
    struct RecordingHooks {
        events: Mutex<Vec<String>>,
    }

    impl JobHooks for RecordingHooks {
        fn on_enqueue(&self, job: &Job) -> HookResult {
            self.events.lock().push(format!("enqueue:{}", job.job_type));
            Ok(())
        }

        fn on_cancel(&self, job: &Job) -> HookResult {
            self.events.lock().push(format!("cancel:{}", job.job_type));
            Ok(())
        }
    }

    fn queue() -> JobQueue {
        JobQueue::new(Arc::new(MemoryJobStore::new()))
    }

    #[test]
    fn test_priority_ordering() {
        assert!(Priority::Critical > Priority::High);
        assert!(Priority::High > Priority::Normal);
        assert!(Priority::Normal > Priority::Low);
    }

    #[test]
    fn test_priority_default_is_normal() {
        assert_eq!(Priority::default(), Priority::Normal);
    }

    #[test]
    fn test_priority_weights() {
        assert_eq!(Priority::Low.weight(), 25);
        assert_eq!(Priority::Normal.weight(), 50);
        assert_eq!(Priority::High.weight(), 75);
        assert_eq!(Priority::Critical.weight(), 100);
    }

    #[test]
    fn test_priority_parse() {
        assert_eq!("CRITICAL".parse::<Priority>(), Ok(Priority::Critical));
        assert!("urgent".parse::<Priority>().is_err());
    }

    #[test]
    fn test_new_job_validation() {
        assert!(NewJob::new("export", json!({})).validate().is_ok());
        assert!(matches!(
            NewJob::new("  ", json!({})).validate(),
            Err(JobError::Validation(_))
        ));
        assert!(matches!(
            NewJob::new("export", json!({})).max_attempts(0).validate(),
            Err(JobError::Validation(_))
        ));
    }

    #[test]
    fn test_queue_stats_record() {
        let mut stats = QueueStats::default();
        stats.record(JobStatus::Pending, 3);
        stats.record(JobStatus::Failed, 1);
        assert_eq!(stats.pending, 3);
        assert_eq!(stats.failed, 1);
        assert_eq!(stats.total, 4);
    }

    #[tokio::test]
    async fn test_enqueue_sets_initial_state() {
        let queue = queue();
        let job = queue
            .enqueue(NewJob::new("export", json!({"x": 1})))
            .await
            .unwrap();

        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.attempts, 0);
        assert_eq!(job.max_attempts, DEFAULT_MAX_ATTEMPTS);
        assert_eq!(job.payload, json!({"x": 1}));
        assert!(job.completed_at.is_none());
    }

    #[tokio::test]
    async fn test_enqueue_rejects_empty_job_type() {
        let queue = queue();
        let err = queue.enqueue(NewJob::new("", json!({}))).await.unwrap_err();
        assert!(matches!(err, JobError::Validation(_)));
        assert_eq!(queue.stats().await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_default_max_attempts_override() {
        let queue = queue().with_default_max_attempts(5);
        let job = queue.enqueue(NewJob::new("export", json!({}))).await.unwrap();
        assert_eq!(job.max_attempts, 5);

        let explicit = queue
            .enqueue(NewJob::new("export", json!({})).max_attempts(2))
            .await
            .unwrap();
        assert_eq!(explicit.max_attempts, 2);
    }

    #[tokio::test]
    async fn test_hooks_fire_on_enqueue_and_cancel() {
        let hooks = Arc::new(RecordingHooks::default());
        let queue = queue().with_hooks(hooks.clone());

        let job = queue.enqueue(NewJob::new("export", json!({}))).await.unwrap();
        queue.cancel(&job.id).await.unwrap();

        assert_eq!(
            *hooks.events.lock(),
            vec!["enqueue:export".to_string(), "cancel:export".to_string()]
        );
    }

    #[tokio::test]
    async fn test_cancel_processing_is_rejected() {
        let queue = queue();
        let job = queue.enqueue(NewJob::new("export", json!({}))).await.unwrap();
        queue.claim_next("w1", Utc::now()).await.unwrap().unwrap();

        let err = queue.cancel(&job.id).await.unwrap_err();
        assert!(matches!(
            err,
            JobError::InvalidState {
                status: JobStatus::Processing,
                ..
            }
        ));
    }
}
