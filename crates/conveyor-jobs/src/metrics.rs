//! Prometheus metrics for job queue monitoring.

use crate::error::JobError;
use crate::hooks::{HookResult, JobHooks};
use crate::job::Job;
use crate::queue::QueueStats;
use metrics::{counter, describe_counter, describe_gauge, describe_histogram, gauge, histogram};
use std::time::Duration;

/// Metric names for the job queue system.
pub mod names {
    /// Total jobs enqueued.
    pub const JOBS_ENQUEUED_TOTAL: &str = "conveyor_jobs_enqueued_total";
    /// Total jobs started by a worker.
    pub const JOBS_STARTED_TOTAL: &str = "conveyor_jobs_started_total";
    /// Total jobs completed successfully.
    pub const JOBS_COMPLETED_TOTAL: &str = "conveyor_jobs_completed_total";
    /// Total jobs failed permanently.
    pub const JOBS_FAILED_TOTAL: &str = "conveyor_jobs_failed_total";
    /// Total jobs retried.
    pub const JOBS_RETRIED_TOTAL: &str = "conveyor_jobs_retried_total";
    /// Total jobs cancelled.
    pub const JOBS_CANCELLED_TOTAL: &str = "conveyor_jobs_cancelled_total";

    /// Current jobs by status.
    pub const JOBS_BY_STATUS: &str = "conveyor_jobs";

    /// Job execution duration in seconds.
    pub const JOB_DURATION_SECONDS: &str = "conveyor_job_duration_seconds";
    /// Job wait time (time in queue) in seconds.
    pub const JOB_WAIT_TIME_SECONDS: &str = "conveyor_job_wait_time_seconds";

    /// Jobs currently executing in a pool.
    pub const WORKERS_ACTIVE: &str = "conveyor_workers_active";
    /// Worker pool concurrency.
    pub const WORKERS_CONCURRENCY: &str = "conveyor_workers_concurrency";
}

/// Register all metric descriptions.
pub fn register_metrics() {
    describe_counter!(names::JOBS_ENQUEUED_TOTAL, "Total number of jobs enqueued");
    describe_counter!(names::JOBS_STARTED_TOTAL, "Total number of job attempts started");
    describe_counter!(
        names::JOBS_COMPLETED_TOTAL,
        "Total number of jobs completed successfully"
    );
    describe_counter!(
        names::JOBS_FAILED_TOTAL,
        "Total number of jobs that failed permanently"
    );
    describe_counter!(names::JOBS_RETRIED_TOTAL, "Total number of job retries");
    describe_counter!(names::JOBS_CANCELLED_TOTAL, "Total number of jobs cancelled");

    describe_gauge!(names::JOBS_BY_STATUS, "Current number of jobs by status");

    describe_histogram!(
        names::JOB_DURATION_SECONDS,
        "Job execution duration in seconds"
    );
    describe_histogram!(
        names::JOB_WAIT_TIME_SECONDS,
        "Time between enqueue and first start in seconds"
    );

    describe_gauge!(names::WORKERS_ACTIVE, "Jobs currently executing");
    describe_gauge!(names::WORKERS_CONCURRENCY, "Worker pool concurrency setting");
}

/// Job metrics recorder.
#[derive(Clone)]
pub struct JobMetrics;

impl JobMetrics {
    /// Record a job enqueued.
    pub fn job_enqueued(job_type: &str, priority: &str) {
        counter!(
            names::JOBS_ENQUEUED_TOTAL,
            "job_type" => job_type.to_string(),
            "priority" => priority.to_string()
        )
        .increment(1);
    }

    /// Record a job attempt started.
    pub fn job_started(job_type: &str) {
        counter!(
            names::JOBS_STARTED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record a job completed.
    pub fn job_completed(job_type: &str, duration: Duration) {
        counter!(
            names::JOBS_COMPLETED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);

        histogram!(
            names::JOB_DURATION_SECONDS,
            "job_type" => job_type.to_string(),
            "status" => "completed"
        )
        .record(duration.as_secs_f64());
    }

    /// Record a permanent failure.
    pub fn job_failed(job_type: &str, error_type: &str) {
        counter!(
            names::JOBS_FAILED_TOTAL,
            "job_type" => job_type.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);
    }

    /// Record a job retried.
    pub fn job_retried(job_type: &str, error_type: &str) {
        counter!(
            names::JOBS_RETRIED_TOTAL,
            "job_type" => job_type.to_string(),
            "error_type" => error_type.to_string()
        )
        .increment(1);
    }

    /// Record a job cancelled.
    pub fn job_cancelled(job_type: &str) {
        counter!(
            names::JOBS_CANCELLED_TOTAL,
            "job_type" => job_type.to_string()
        )
        .increment(1);
    }

    /// Record job wait time.
    pub fn job_wait_time(job_type: &str, wait_time: Duration) {
        histogram!(
            names::JOB_WAIT_TIME_SECONDS,
            "job_type" => job_type.to_string()
        )
        .record(wait_time.as_secs_f64());
    }

    /// Update per-status gauges.
    pub fn update_queue_sizes(stats: &QueueStats) {
        for (status, count) in [
            ("pending", stats.pending),
            ("processing", stats.processing),
            ("completed", stats.completed),
            ("failed", stats.failed),
            ("cancelled", stats.cancelled),
        ] {
            gauge!(names::JOBS_BY_STATUS, "status" => status).set(count as f64);
        }
    }
}

/// Worker metrics recorder.
#[derive(Clone)]
pub struct WorkerMetrics;

impl WorkerMetrics {
    /// Update worker gauges.
    pub fn update_workers(pool_id: &str, active: u64, concurrency: usize) {
        gauge!(
            names::WORKERS_ACTIVE,
            "pool_id" => pool_id.to_string()
        )
        .set(active as f64);

        gauge!(
            names::WORKERS_CONCURRENCY,
            "pool_id" => pool_id.to_string()
        )
        .set(concurrency as f64);
    }
}

/// Hooks that feed [`JobMetrics`].
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsHooks;

impl JobHooks for MetricsHooks {
    fn on_enqueue(&self, job: &Job) -> HookResult {
        JobMetrics::job_enqueued(&job.job_type, job.priority.as_str());
        Ok(())
    }

    fn on_start(&self, job: &Job) -> HookResult {
        JobMetrics::job_started(&job.job_type);
        if job.attempts == 0 {
            let waited = (chrono::Utc::now() - job.created_at)
                .to_std()
                .unwrap_or_default();
            JobMetrics::job_wait_time(&job.job_type, waited);
        }
        Ok(())
    }

    fn on_complete(&self, job: &Job, elapsed: Duration) -> HookResult {
        JobMetrics::job_completed(&job.job_type, elapsed);
        Ok(())
    }

    fn on_fail(&self, job: &Job, error: &JobError) -> HookResult {
        JobMetrics::job_failed(&job.job_type, error.kind());
        Ok(())
    }

    fn on_retry(&self, job: &Job, error: &JobError, _delay: Duration) -> HookResult {
        JobMetrics::job_retried(&job.job_type, error.kind());
        Ok(())
    }

    fn on_cancel(&self, job: &Job) -> HookResult {
        JobMetrics::job_cancelled(&job.job_type);
        Ok(())
    }
}
