//! Job record, lifecycle status and execution context.

use crate::error::JobError;
use crate::queue::Priority;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::fmt;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Attempt ceiling used when an enqueue request does not specify one.
pub const DEFAULT_MAX_ATTEMPTS: i32 = 3;

/// Unique job identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(transparent)]
#[sqlx(transparent)]
pub struct JobId(String);

impl JobId {
    /// Creates a new time-ordered job ID.
    pub fn new() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Creates a job ID from a string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Returns the job ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for JobId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for JobId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Job status enumeration.
///
/// ```text
/// pending ──claim──▶ processing ──ok──▶ completed
///    ▲                   │
///    └──── retry ────────┤
///                        └──terminal──▶ failed
/// pending | failed ──cancel──▶ cancelled
/// ```
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(type_name = "job_status", rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting to be claimed.
    #[default]
    Pending,
    /// Leased by exactly one worker.
    Processing,
    /// Handler succeeded.
    Completed,
    /// Attempts exhausted or non-retriable failure.
    Failed,
    /// Cancelled before it could run.
    Cancelled,
}

impl JobStatus {
    /// All statuses, in lifecycle order.
    pub const ALL: [JobStatus; 5] = [
        JobStatus::Pending,
        JobStatus::Processing,
        JobStatus::Completed,
        JobStatus::Failed,
        JobStatus::Cancelled,
    ];

    /// Returns the lowercase wire name.
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
        }
    }

    /// Returns true for `completed`, `failed` and `cancelled`.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled
        )
    }

    /// Returns true if an explicit cancel is allowed from this status.
    pub fn is_cancellable(&self) -> bool {
        matches!(self, JobStatus::Pending | JobStatus::Failed)
    }

    /// Returns true if `self -> next` is a legal transition.
    pub fn can_transition_to(&self, next: JobStatus) -> bool {
        use JobStatus::*;
        matches!(
            (self, next),
            (Pending, Processing)
                | (Processing, Completed)
                | (Processing, Pending)
                | (Processing, Failed)
                | (Pending, Cancelled)
                | (Failed, Cancelled)
        )
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(JobStatus::Pending),
            "processing" => Ok(JobStatus::Processing),
            "completed" => Ok(JobStatus::Completed),
            "failed" => Ok(JobStatus::Failed),
            "cancelled" => Ok(JobStatus::Cancelled),
            other => Err(format!("unknown job status: {}", other)),
        }
    }
}

/// The durable unit of work.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Job {
    /// Job ID.
    pub id: JobId,

    /// Selects the handler.
    pub job_type: String,

    /// Opaque document handed verbatim to the handler.
    pub payload: serde_json::Value,

    /// Lifecycle status.
    pub status: JobStatus,

    /// Scheduling priority.
    pub priority: Priority,

    /// Execution attempts made so far.
    pub attempts: i32,

    /// Ceiling on attempts before terminal failure.
    pub max_attempts: i32,

    /// Not eligible for claiming before this instant.
    pub scheduled_for: Option<DateTime<Utc>>,

    /// Error from the most recent failed attempt.
    pub last_error: Option<String>,

    /// Application annotations, never interpreted by the queue.
    pub metadata: Option<serde_json::Value>,

    /// Worker currently holding the lease.
    pub locked_by: Option<String>,

    /// When the current lease was taken.
    pub locked_at: Option<DateTime<Utc>>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Job {
    /// Returns true if the job can be claimed at `now`.
    pub fn is_eligible(&self, now: DateTime<Utc>) -> bool {
        self.status == JobStatus::Pending && self.scheduled_for.map_or(true, |at| at <= now)
    }

    /// Returns true if `worker_id` holds the current lease.
    pub fn is_leased_by(&self, worker_id: &str) -> bool {
        self.locked_by.as_deref() == Some(worker_id)
    }

    /// Returns true if one more failed attempt still leaves room for a retry.
    pub fn can_retry(&self) -> bool {
        self.attempts + 1 < self.max_attempts
    }

    /// Create the execution context for a claimed job.
    pub fn to_context(&self, worker_id: &str, cancellation: CancellationToken) -> JobContext {
        JobContext {
            job_id: self.id.clone(),
            job_type: self.job_type.clone(),
            attempt: self.attempts + 1,
            max_attempts: self.max_attempts,
            worker_id: worker_id.to_string(),
            started_at: Utc::now(),
            metadata: self.metadata.clone(),
            cancellation,
        }
    }
}

/// Job execution context.
#[derive(Debug, Clone)]
pub struct JobContext {
    /// Job ID.
    pub job_id: JobId,

    /// Job type.
    pub job_type: String,

    /// Current attempt number (1-based).
    pub attempt: i32,

    /// Maximum attempts allowed.
    pub max_attempts: i32,

    /// Worker ID processing this job.
    pub worker_id: String,

    /// Job started executing at this time.
    pub started_at: DateTime<Utc>,

    /// Application metadata attached at enqueue.
    pub metadata: Option<serde_json::Value>,

    /// Cancelled when the pool gives up on this execution.
    pub cancellation: CancellationToken,
}

impl JobContext {
    /// Returns true if this is the last attempt.
    pub fn is_last_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Returns remaining attempts.
    pub fn remaining_attempts(&self) -> i32 {
        (self.max_attempts - self.attempt).max(0)
    }

    /// Returns true once the pool has abandoned this execution.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// A job whose payload is a concrete Rust type.
///
/// # Example
///
/// ```rust,ignore
/// use conveyor_jobs::{JobContext, JobError, TypedJob};
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Debug, Serialize, Deserialize)]
/// struct ExportJob {
///     report_id: u64,
/// }
///
/// #[async_trait::async_trait]
/// impl TypedJob for ExportJob {
///     const JOB_TYPE: &'static str = "export";
///
///     async fn execute(self, ctx: JobContext) -> Result<(), JobError> {
///         tracing::info!(report_id = self.report_id, attempt = ctx.attempt, "exporting");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait TypedJob: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Handler key.
    const JOB_TYPE: &'static str;

    /// Attempt ceiling used by [`NewJob::typed`](crate::queue::NewJob::typed).
    const MAX_ATTEMPTS: i32 = DEFAULT_MAX_ATTEMPTS;

    /// Execute the job.
    async fn execute(self, ctx: JobContext) -> Result<(), JobError>;
}
