//! Job queue configuration.

use crate::backoff::BackoffPolicy;
use crate::error::{JobError, JobResult};
use crate::job::DEFAULT_MAX_ATTEMPTS;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the job queue system.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct JobsConfig {
    /// Worker pool configuration.
    #[serde(default)]
    pub worker: WorkerConfig,

    /// Retry backoff configuration.
    #[serde(default)]
    pub backoff: BackoffConfig,
}

impl JobsConfig {
    /// Check cross-field constraints.
    pub fn validate(&self) -> JobResult<()> {
        self.worker.validate()?;
        self.backoff.validate()
    }
}

/// Worker pool configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    /// Number of concurrent worker slots.
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,

    /// Sleep between polls of an empty queue, in milliseconds.
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,

    /// Per-job execution budget, in milliseconds.
    #[serde(default = "default_job_timeout")]
    pub job_timeout_ms: u64,

    /// How long shutdown waits for in-flight jobs, in milliseconds.
    #[serde(default = "default_shutdown_timeout")]
    pub graceful_shutdown_timeout_ms: u64,

    /// Leases older than this are recovered, in milliseconds (0 = disabled).
    #[serde(default = "default_stale_lease_timeout")]
    pub stale_lease_timeout_ms: u64,

    /// Interval of the maintenance task, in milliseconds.
    #[serde(default = "default_maintenance_interval")]
    pub maintenance_interval_ms: u64,

    /// Prefix for generated worker IDs.
    #[serde(default = "default_worker_id_prefix")]
    pub worker_id_prefix: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
            poll_interval_ms: default_poll_interval(),
            job_timeout_ms: default_job_timeout(),
            graceful_shutdown_timeout_ms: default_shutdown_timeout(),
            stale_lease_timeout_ms: default_stale_lease_timeout(),
            maintenance_interval_ms: default_maintenance_interval(),
            worker_id_prefix: default_worker_id_prefix(),
        }
    }
}

fn default_max_concurrent() -> usize {
    4
}

fn default_poll_interval() -> u64 {
    1000
}

fn default_job_timeout() -> u64 {
    300_000 // 5 minutes
}

fn default_shutdown_timeout() -> u64 {
    30_000
}

fn default_stale_lease_timeout() -> u64 {
    600_000 // 10 minutes
}

fn default_maintenance_interval() -> u64 {
    15_000
}

fn default_worker_id_prefix() -> String {
    "worker".to_string()
}

impl WorkerConfig {
    /// Returns job timeout as Duration.
    pub fn job_timeout(&self) -> Duration {
        Duration::from_millis(self.job_timeout_ms)
    }

    /// Returns poll interval as Duration.
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Returns shutdown timeout as Duration.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.graceful_shutdown_timeout_ms)
    }

    /// Returns the stale-lease horizon, if recovery is enabled.
    pub fn stale_lease_timeout(&self) -> Option<Duration> {
        (self.stale_lease_timeout_ms > 0).then(|| Duration::from_millis(self.stale_lease_timeout_ms))
    }

    /// Returns maintenance interval as Duration.
    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_millis(self.maintenance_interval_ms)
    }

    fn validate(&self) -> JobResult<()> {
        if self.max_concurrent == 0 {
            return Err(JobError::Configuration(
                "jobs.worker.max_concurrent must be at least 1".to_string(),
            ));
        }
        if self.job_timeout_ms == 0 {
            return Err(JobError::Configuration(
                "jobs.worker.job_timeout_ms must be greater than 0".to_string(),
            ));
        }
        if self.stale_lease_timeout_ms > 0 && self.stale_lease_timeout_ms <= self.job_timeout_ms {
            return Err(JobError::Configuration(
                "jobs.worker.stale_lease_timeout_ms must exceed job_timeout_ms".to_string(),
            ));
        }
        Ok(())
    }
}

/// Retry backoff configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackoffConfig {
    /// Delay after the first failed attempt, in milliseconds.
    #[serde(default = "default_base_delay")]
    pub base_delay_ms: u64,

    /// Maximum delay in milliseconds.
    #[serde(default = "default_max_delay")]
    pub max_delay_ms: u64,

    /// Backoff multiplier.
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,

    /// Random spread as a fraction of the delay.
    #[serde(default)]
    pub jitter_factor: f64,

    /// Attempt ceiling for jobs enqueued without one.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: i32,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            base_delay_ms: default_base_delay(),
            max_delay_ms: default_max_delay(),
            multiplier: default_multiplier(),
            jitter_factor: 0.0,
            default_max_attempts: default_max_attempts(),
        }
    }
}

fn default_base_delay() -> u64 {
    1000
}

fn default_max_delay() -> u64 {
    60_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> i32 {
    DEFAULT_MAX_ATTEMPTS
}

impl BackoffConfig {
    /// Build the policy used by the worker pool.
    pub fn policy(&self) -> BackoffPolicy {
        BackoffPolicy::exponential(
            Duration::from_millis(self.base_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
        )
        .with_jitter(self.jitter_factor)
    }

    fn validate(&self) -> JobResult<()> {
        if self.default_max_attempts < 1 {
            return Err(JobError::Configuration(
                "jobs.backoff.default_max_attempts must be at least 1".to_string(),
            ));
        }
        if self.multiplier.is_nan() || self.multiplier < 1.0 {
            return Err(JobError::Configuration(
                "jobs.backoff.multiplier must be at least 1.0".to_string(),
            ));
        }
        if self.base_delay_ms > self.max_delay_ms {
            return Err(JobError::Configuration(
                "jobs.backoff.base_delay_ms must not exceed max_delay_ms".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.jitter_factor) {
            return Err(JobError::Configuration(
                "jobs.backoff.jitter_factor must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}
