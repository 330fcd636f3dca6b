//! Job management REST API controller.

use crate::{
    extractors::ValidatedJson,
    responses::{created, ok, ApiResult, AppError},
    state::AppState,
};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::{DateTime, Utc};
use conveyor_core::ConveyorError;
use conveyor_jobs::{Job, JobId, JobStatus, NewJob, Priority, QueueStats, WorkerPoolStats};
use serde::{Deserialize, Serialize};
use validator::Validate;

/// Default page size for `GET /jobs/pending`.
pub const DEFAULT_PENDING_LIMIT: usize = 100;

/// Upper bound for `GET /jobs/pending?limit=`.
pub const MAX_PENDING_LIMIT: usize = 1000;

/// Create the jobs router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/jobs", post(enqueue_job).get(lookup_job))
        .route("/jobs/stats", get(queue_stats))
        .route("/jobs/pending", get(list_pending))
        .route("/jobs/processing", get(list_processing))
        .route("/jobs/workers", get(worker_stats))
        .route("/jobs/:job_id", get(get_job))
        .route("/jobs/:job_id/cancel", post(cancel_job))
}

// ============================================================================
// Request/Response Types
// ============================================================================

/// Body of `POST /jobs`.
#[derive(Debug, Deserialize, Validate)]
pub struct EnqueueJobRequest {
    /// Selects the handler. Required.
    #[serde(default)]
    #[validate(length(min = 1, max = 255, message = "job_type is required"))]
    pub job_type: String,

    /// Opaque handler input.
    #[serde(default)]
    pub payload: serde_json::Value,

    #[serde(default)]
    pub priority: Priority,

    /// Falls back to the queue default.
    #[validate(range(min = 1, message = "max_attempts must be at least 1"))]
    pub max_attempts: Option<i32>,

    /// Earliest time the job may run.
    pub scheduled_for: Option<DateTime<Utc>>,

    #[serde(default)]
    pub metadata: Option<serde_json::Value>,
}

impl From<EnqueueJobRequest> for NewJob {
    fn from(req: EnqueueJobRequest) -> Self {
        NewJob {
            job_type: req.job_type,
            payload: req.payload,
            priority: req.priority,
            max_attempts: req.max_attempts,
            scheduled_for: req.scheduled_for,
            metadata: req.metadata,
        }
    }
}

/// Response for an accepted job.
#[derive(Debug, Serialize)]
pub struct EnqueueJobResponse {
    pub id: JobId,
    pub status: JobStatus,
}

/// Query parameters for `GET /jobs`.
#[derive(Debug, Deserialize)]
pub struct JobLookupParams {
    pub id: Option<String>,
}

/// Query parameters for `GET /jobs/pending`.
///
/// `limit` is kept as text so a malformed value gets the JSON error body.
#[derive(Debug, Deserialize)]
pub struct PendingParams {
    pub limit: Option<String>,
}

impl PendingParams {
    fn effective_limit(&self) -> Result<usize, ConveyorError> {
        let limit = match self.limit.as_deref() {
            None => DEFAULT_PENDING_LIMIT,
            Some(raw) => raw.trim().parse::<usize>().map_err(|_| {
                ConveyorError::validation(format!(
                    "limit must be a non-negative integer, got '{}'",
                    raw
                ))
            })?,
        };
        Ok(limit.min(MAX_PENDING_LIMIT))
    }
}

/// A list of jobs with its length.
#[derive(Debug, Serialize)]
pub struct JobListResponse {
    pub jobs: Vec<Job>,
    pub count: usize,
}

impl From<Vec<Job>> for JobListResponse {
    fn from(jobs: Vec<Job>) -> Self {
        Self {
            count: jobs.len(),
            jobs,
        }
    }
}

/// Simple message response.
#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub id: JobId,
    pub message: String,
}

// ============================================================================
// Handler Functions
// ============================================================================

/// Enqueue a job.
async fn enqueue_job(
    State(state): State<AppState>,
    ValidatedJson(request): ValidatedJson<EnqueueJobRequest>,
) -> Result<(StatusCode, Json<EnqueueJobResponse>), AppError> {
    let job = state.queue.enqueue(request.into()).await?;

    Ok(created(EnqueueJobResponse {
        id: job.id,
        status: job.status,
    }))
}

/// Look up a job by `?id=`.
async fn lookup_job(
    State(state): State<AppState>,
    Query(params): Query<JobLookupParams>,
) -> ApiResult<Job> {
    let id = params
        .id
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ConveyorError::validation("id query parameter is required"))?;

    ok(state.queue.get(&JobId::from(id)).await?)
}

/// Get a job by path id.
async fn get_job(State(state): State<AppState>, Path(job_id): Path<String>) -> ApiResult<Job> {
    ok(state.queue.get(&JobId::from(job_id)).await?)
}

/// Cancel a pending or failed job.
async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<MessageResponse> {
    let job = state.queue.cancel(&JobId::from(job_id)).await?;

    ok(MessageResponse {
        id: job.id,
        message: "Job cancelled".to_string(),
    })
}

/// Job counts by status.
async fn queue_stats(State(state): State<AppState>) -> ApiResult<QueueStats> {
    ok(state.queue.stats().await?)
}

/// Pending jobs, oldest first.
async fn list_pending(
    State(state): State<AppState>,
    Query(params): Query<PendingParams>,
) -> ApiResult<JobListResponse> {
    let jobs = state.queue.list_pending(params.effective_limit()?).await?;
    ok(jobs.into())
}

/// Jobs currently leased by a worker.
async fn list_processing(State(state): State<AppState>) -> ApiResult<JobListResponse> {
    let jobs = state.queue.list_processing().await?;
    ok(jobs.into())
}

/// Statistics of the worker pool running in this process.
async fn worker_stats(State(state): State<AppState>) -> ApiResult<WorkerPoolStats> {
    let pool = state
        .workers
        .as_ref()
        .ok_or_else(|| ConveyorError::not_found("WorkerPool", "local"))?;
    ok(pool.stats())
}
