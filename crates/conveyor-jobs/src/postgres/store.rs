//! PostgreSQL job store.
//!
//! Claiming uses `FOR UPDATE SKIP LOCKED` so concurrent workers, in one
//! process or many, never lease the same row. Every other transition is a
//! single conditional `UPDATE` whose `WHERE` clause encodes the allowed
//! source status and, for outcome write-backs, the lease owner; a zero-row
//! result is resolved to `NotFound` or `InvalidState` by re-reading the row.

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobStatus};
use crate::queue::{JobStore, NewJob, QueueStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgPool;
use std::time::Duration;
use tracing::{debug, info, instrument};

const COLUMNS: &str = "id, job_type, payload, status, priority, attempts, max_attempts, \
     scheduled_for, last_error, metadata, locked_by, locked_at, created_at, updated_at, \
     completed_at";

/// Postgres-backed [`JobStore`].
#[derive(Clone)]
pub struct PgJobStore {
    pool: PgPool,
}

impl PgJobStore {
    /// Creates a store over an existing pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Returns a reference to the underlying pool.
    #[must_use]
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn find(&self, id: &JobId) -> JobResult<Option<Job>> {
        let sql = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(job)
    }

    /// Explain why a conditional update matched nothing.
    async fn rejected(&self, id: &JobId, operation: &'static str) -> JobError {
        match self.find(id).await {
            Ok(Some(job)) => JobError::InvalidState {
                id: job.id,
                status: job.status,
                operation,
            },
            Ok(None) => JobError::NotFound(id.clone()),
            Err(e) => e,
        }
    }
}

impl std::fmt::Debug for PgJobStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgJobStore")
            .field("size", &self.pool.size())
            .field("num_idle", &self.pool.num_idle())
            .finish()
    }
}

#[async_trait]
impl JobStore for PgJobStore {
    #[instrument(skip(self, job), fields(job_type = %job.job_type))]
    async fn insert(&self, job: NewJob, max_attempts: i32, now: DateTime<Utc>) -> JobResult<Job> {
        let sql = format!(
            r#"
            INSERT INTO jobs (id, job_type, payload, status, priority, attempts, max_attempts,
                              scheduled_for, metadata, created_at, updated_at)
            VALUES ($1, $2, $3, 'pending', $4, 0, $5, $6, $7, $8, $8)
            RETURNING {COLUMNS}
            "#
        );

        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(JobId::new())
            .bind(&job.job_type)
            .bind(&job.payload)
            .bind(job.priority)
            .bind(max_attempts)
            .bind(job.scheduled_for)
            .bind(&job.metadata)
            .bind(now)
            .fetch_one(&self.pool)
            .await?;

        Ok(job)
    }

    async fn claim_next(&self, worker_id: &str, now: DateTime<Utc>) -> JobResult<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'processing', locked_by = $2, locked_at = $1, updated_at = $1
            WHERE id = (
                SELECT id FROM jobs
                WHERE status = 'pending'
                  AND (scheduled_for IS NULL OR scheduled_for <= $1)
                ORDER BY priority DESC, created_at ASC
                LIMIT 1
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {COLUMNS}
            "#
        );

        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(now)
            .bind(worker_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(job)
    }

    async fn complete(&self, id: &JobId, worker_id: &str, now: DateTime<Utc>) -> JobResult<Job> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'completed', completed_at = $3, updated_at = $3,
                locked_by = NULL, locked_at = NULL
            WHERE id = $1 AND status = 'processing' AND locked_by = $2
            RETURNING {COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(worker_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(job) => Ok(job),
            None => match self.find(id).await? {
                Some(job) if job.status == JobStatus::Completed => Ok(job),
                Some(job) => Err(JobError::InvalidState {
                    id: job.id,
                    status: job.status,
                    operation: "complete",
                }),
                None => Err(JobError::NotFound(id.clone())),
            },
        }
    }

    async fn fail(
        &self,
        id: &JobId,
        worker_id: &str,
        error: &str,
        retry_at: Option<DateTime<Utc>>,
        now: DateTime<Utc>,
    ) -> JobResult<Job> {
        // $4 is NULL for a terminal failure. A retry at the attempt limit is
        // recorded as terminal so attempts never exceed max_attempts.
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = CASE WHEN $4::timestamptz IS NOT NULL AND attempts + 1 < max_attempts
                              THEN 'pending'::job_status ELSE 'failed'::job_status END,
                scheduled_for = CASE WHEN $4::timestamptz IS NOT NULL AND attempts + 1 < max_attempts
                                     THEN GREATEST(scheduled_for, $4) ELSE scheduled_for END,
                completed_at = CASE WHEN $4::timestamptz IS NOT NULL AND attempts + 1 < max_attempts
                                    THEN NULL ELSE $5 END,
                attempts = attempts + 1,
                last_error = $3,
                locked_by = NULL,
                locked_at = NULL,
                updated_at = $5
            WHERE id = $1 AND status = 'processing' AND locked_by = $2
            RETURNING {COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(worker_id)
            .bind(error)
            .bind(retry_at)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(job) => Ok(job),
            None => Err(self.rejected(id, "fail").await),
        }
    }

    async fn cancel(&self, id: &JobId, now: DateTime<Utc>) -> JobResult<Job> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'cancelled', completed_at = $2, updated_at = $2
            WHERE id = $1 AND status IN ('pending', 'failed')
            RETURNING {COLUMNS}
            "#
        );

        let updated = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        match updated {
            Some(job) => Ok(job),
            None => Err(self.rejected(id, "cancel").await),
        }
    }

    async fn release(
        &self,
        id: &JobId,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobResult<Option<Job>> {
        let sql = format!(
            r#"
            UPDATE jobs
            SET status = 'pending', locked_by = NULL, locked_at = NULL, updated_at = $3
            WHERE id = $1 AND status = 'processing' AND locked_by = $2
            RETURNING {COLUMNS}
            "#
        );

        let job = sqlx::query_as::<_, Job>(&sql)
            .bind(id)
            .bind(worker_id)
            .bind(now)
            .fetch_optional(&self.pool)
            .await?;

        if let Some(job) = &job {
            debug!(job_id = %job.id, worker_id = %worker_id, "Released job lease");
        }
        Ok(job)
    }

    async fn recover_stale(&self, now: DateTime<Utc>, horizon: Duration) -> JobResult<Vec<Job>> {
        let Some(cutoff) = chrono::Duration::from_std(horizon)
            .ok()
            .and_then(|h| now.checked_sub_signed(h))
        else {
            return Ok(Vec::new());
        };

        let sql = format!(
            r#"
            UPDATE jobs
            SET status = CASE WHEN attempts + 1 < max_attempts
                              THEN 'pending'::job_status ELSE 'failed'::job_status END,
                scheduled_for = CASE WHEN attempts + 1 < max_attempts
                                     THEN GREATEST(scheduled_for, $1) ELSE scheduled_for END,
                completed_at = CASE WHEN attempts + 1 < max_attempts THEN NULL ELSE $1 END,
                attempts = attempts + 1,
                last_error = 'lease expired',
                locked_by = NULL,
                locked_at = NULL,
                updated_at = $1
            WHERE id IN (
                SELECT id FROM jobs
                WHERE status = 'processing' AND (locked_at IS NULL OR locked_at < $2)
                FOR UPDATE SKIP LOCKED
            )
            RETURNING {COLUMNS}
            "#
        );

        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(now)
            .bind(cutoff)
            .fetch_all(&self.pool)
            .await?;

        if !jobs.is_empty() {
            info!(count = jobs.len(), "Recovered jobs with expired leases");
        }
        Ok(jobs)
    }

    async fn get(&self, id: &JobId) -> JobResult<Job> {
        self.find(id)
            .await?
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    async fn list_pending(&self, limit: usize) -> JobResult<Vec<Job>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status = 'pending' ORDER BY created_at ASC LIMIT $1"
        );
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);

        let jobs = sqlx::query_as::<_, Job>(&sql)
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    async fn list_processing(&self) -> JobResult<Vec<Job>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM jobs WHERE status = 'processing' ORDER BY created_at ASC"
        );

        let jobs = sqlx::query_as::<_, Job>(&sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(jobs)
    }

    async fn stats(&self) -> JobResult<QueueStats> {
        let rows: Vec<(JobStatus, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM jobs GROUP BY status")
                .fetch_all(&self.pool)
                .await?;

        let mut stats = QueueStats::default();
        for (status, count) in rows {
            stats.record(status, u64::try_from(count).unwrap_or(0));
        }
        Ok(stats)
    }

    async fn health_check(&self) -> JobResult<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
