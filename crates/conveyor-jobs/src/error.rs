//! Job error types.

use crate::job::{JobId, JobStatus};
use conveyor_core::ConveyorError;
use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Job-related errors.
#[derive(Debug, Error)]
pub enum JobError {
    /// Bad enqueue input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Job not found.
    #[error("Job not found: {0}")]
    NotFound(JobId),

    /// Operation not permitted in the job's current status.
    #[error("Cannot {operation} job {id} in status {status}")]
    InvalidState {
        id: JobId,
        status: JobStatus,
        operation: &'static str,
    },

    /// Raised or returned by a job handler.
    #[error("Job execution failed: {message}")]
    Handler { message: String, retryable: bool },

    /// Handler exceeded the per-job wall-clock budget.
    #[error("Job timed out after {0} ms")]
    Timeout(u64),

    /// No handler registered for the job type.
    #[error("No handler registered for job type: {0}")]
    UnknownJobType(String),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Database error.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Worker error.
    #[error("Worker error: {0}")]
    Worker(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl JobError {
    /// A handler failure that may be retried.
    pub fn retry(message: impl Into<String>) -> Self {
        JobError::Handler {
            message: message.into(),
            retryable: true,
        }
    }

    /// A handler failure that must not be retried.
    pub fn permanent(message: impl Into<String>) -> Self {
        JobError::Handler {
            message: message.into(),
            retryable: false,
        }
    }

    /// Returns true if this error is retryable.
    ///
    /// Only an explicit permanent handler failure, a missing handler or an
    /// undecodable payload skip the retry budget. Anything else a handler
    /// returns, including errors bubbled up with `?`, is retried.
    pub fn is_retryable(&self) -> bool {
        match self {
            JobError::Handler { retryable, .. } => *retryable,
            JobError::UnknownJobType(_) | JobError::Serialization(_) => false,
            JobError::Timeout(_)
            | JobError::Database(_)
            | JobError::Worker(_)
            | JobError::Validation(_)
            | JobError::NotFound(_)
            | JobError::InvalidState { .. }
            | JobError::Configuration(_) => true,
        }
    }

    /// Short machine label used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            JobError::Validation(_) => "validation",
            JobError::NotFound(_) => "not_found",
            JobError::InvalidState { .. } => "invalid_state",
            JobError::Handler { .. } => "handler",
            JobError::Timeout(_) => "timeout",
            JobError::UnknownJobType(_) => "unknown_job_type",
            JobError::Serialization(_) => "serialization",
            JobError::Database(_) => "database",
            JobError::Worker(_) => "worker",
            JobError::Configuration(_) => "configuration",
        }
    }
}

impl From<JobError> for ConveyorError {
    fn from(err: JobError) -> Self {
        match err {
            JobError::Validation(msg) => ConveyorError::Validation(msg),
            JobError::NotFound(id) => ConveyorError::not_found("Job", id),
            err @ JobError::InvalidState { .. } => ConveyorError::InvalidState(err.to_string()),
            JobError::Database(e) => ConveyorError::Database(e.to_string()),
            JobError::Timeout(ms) => ConveyorError::Timeout(format!("{} ms", ms)),
            JobError::Configuration(msg) => ConveyorError::Configuration(msg),
            other => ConveyorError::Internal(other.to_string()),
        }
    }
}
