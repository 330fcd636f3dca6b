//! In-process job store.
//!
//! Keeps jobs in a mutex-guarded map. Follows the same contract as the
//! Postgres store and is used by tests and single-process deployments.

use crate::error::{JobError, JobResult};
use crate::job::{Job, JobId, JobStatus};
use crate::queue::{JobStore, NewJob, QueueStats};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::cmp::Reverse;
use std::collections::HashMap;
use std::time::Duration;

#[derive(Debug)]
struct Entry {
    seq: u64,
    job: Job,
}

#[derive(Debug, Default)]
struct State {
    jobs: HashMap<JobId, Entry>,
    next_seq: u64,
}

impl State {
    fn job_mut(&mut self, id: &JobId) -> JobResult<&mut Job> {
        self.jobs
            .get_mut(id)
            .map(|entry| &mut entry.job)
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    fn sorted_by_age(&self, status: JobStatus) -> Vec<Job> {
        let mut entries: Vec<&Entry> = self
            .jobs
            .values()
            .filter(|entry| entry.job.status == status)
            .collect();
        entries.sort_by_key(|entry| (entry.job.created_at, entry.seq));
        entries.into_iter().map(|entry| entry.job.clone()).collect()
    }
}

/// Mutex-guarded in-memory store.
#[derive(Debug, Default)]
pub struct MemoryJobStore {
    state: Mutex<State>,
}

impl MemoryJobStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn invalid(job: &Job, operation: &'static str) -> JobError {
    JobError::InvalidState {
        id: job.id.clone(),
        status: job.status,
        operation,
    }
}

/// Apply a failed attempt to a processing job.
fn record_failure(job: &mut Job, error: &str, retry_at: Option<DateTime<Utc>>, now: DateTime<Utc>) {
    let retry = retry_at.filter(|_| job.can_retry());
    job.attempts += 1;
    job.last_error = Some(error.to_string());
    job.locked_by = None;
    job.locked_at = None;
    job.updated_at = now;

    match retry {
        Some(at) => {
            job.status = JobStatus::Pending;
            job.scheduled_for = Some(job.scheduled_for.map_or(at, |prev| prev.max(at)));
        }
        None => {
            job.status = JobStatus::Failed;
            job.completed_at = Some(now);
        }
    }
}

#[async_trait]
impl JobStore for MemoryJobStore {
    async fn insert(&self, job: NewJob, max_attempts: i32, now: DateTime<Utc>) -> JobResult<Job> {
        let record = Job {
            id: JobId::new(),
            job_type: job.job_type,
            payload: job.payload,
            status: JobStatus::Pending,
            priority: job.priority,
            attempts: 0,
            max_attempts,
            scheduled_for: job.scheduled_for,
            last_error: None,
            metadata: job.metadata,
            locked_by: None,
            locked_at: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        };

        let mut state = self.state.lock();
        let seq = state.next_seq;
        state.next_seq += 1;
        state.jobs.insert(
            record.id.clone(),
            Entry {
                seq,
                job: record.clone(),
            },
        );
        Ok(record)
    }

    async fn claim_next(&self, worker_id: &str, now: DateTime<Utc>) -> JobResult<Option<Job>> {
        let mut state = self.state.lock();

        let best = state
            .jobs
            .values_mut()
            .filter(|entry| entry.job.is_eligible(now))
            .max_by_key(|entry| {
                (
                    entry.job.priority,
                    Reverse(entry.job.created_at),
                    Reverse(entry.seq),
                )
            });

        Ok(best.map(|entry| {
            let job = &mut entry.job;
            job.status = JobStatus::Processing;
            job.locked_by = Some(worker_id.to_string());
            job.locked_at = Some(now);
            job.updated_at = now;
            job.clone()
        }))
    }

    async fn complete(&self, id: &JobId, worker_id: &str, now: DateTime<Utc>) -> JobResult<Job> {
        let mut state = self.state.lock();
        let job = state.job_mut(id)?;

        match job.status {
            JobStatus::Processing if job.is_leased_by(worker_id) => {
                job.status = JobStatus::Completed;
                job.completed_at = Some(now);
                job.updated_at = now;
                job.locked_by = None;
                job.locked_at = None;
                Ok(job.clone())
            }
            JobStatus::Completed => Ok(job.clone()),
            _ => Err(invalid(job, "complete")),
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
        let mut state = self.state.lock();
        let job = state.job_mut(id)?;

        if job.status != JobStatus::Processing || !job.is_leased_by(worker_id) {
            return Err(invalid(job, "fail"));
        }
        record_failure(job, error, retry_at, now);
        Ok(job.clone())
    }

    async fn cancel(&self, id: &JobId, now: DateTime<Utc>) -> JobResult<Job> {
        let mut state = self.state.lock();
        let job = state.job_mut(id)?;

        if !job.status.is_cancellable() {
            return Err(invalid(job, "cancel"));
        }
        job.status = JobStatus::Cancelled;
        job.completed_at = Some(now);
        job.updated_at = now;
        Ok(job.clone())
    }

    async fn release(
        &self,
        id: &JobId,
        worker_id: &str,
        now: DateTime<Utc>,
    ) -> JobResult<Option<Job>> {
        let mut state = self.state.lock();
        let job = state.job_mut(id)?;

        if job.status != JobStatus::Processing || !job.is_leased_by(worker_id) {
            return Ok(None);
        }
        job.status = JobStatus::Pending;
        job.locked_by = None;
        job.locked_at = None;
        job.updated_at = now;
        Ok(Some(job.clone()))
    }

    async fn recover_stale(&self, now: DateTime<Utc>, horizon: Duration) -> JobResult<Vec<Job>> {
        let Some(cutoff) = chrono::Duration::from_std(horizon)
            .ok()
            .and_then(|h| now.checked_sub_signed(h))
        else {
            return Ok(Vec::new());
        };
        let mut state = self.state.lock();

        let mut recovered = Vec::new();
        for entry in state.jobs.values_mut() {
            let job = &mut entry.job;
            let expired = job.status == JobStatus::Processing
                && job.locked_at.map_or(true, |at| at < cutoff);
            if expired {
                record_failure(job, "lease expired", Some(now), now);
                recovered.push(job.clone());
            }
        }
        Ok(recovered)
    }

    async fn get(&self, id: &JobId) -> JobResult<Job> {
        let state = self.state.lock();
        state
            .jobs
            .get(id)
            .map(|entry| entry.job.clone())
            .ok_or_else(|| JobError::NotFound(id.clone()))
    }

    async fn list_pending(&self, limit: usize) -> JobResult<Vec<Job>> {
        let mut jobs = self.state.lock().sorted_by_age(JobStatus::Pending);
        jobs.truncate(limit);
        Ok(jobs)
    }

    async fn list_processing(&self) -> JobResult<Vec<Job>> {
        Ok(self.state.lock().sorted_by_age(JobStatus::Processing))
    }

    async fn stats(&self) -> JobResult<QueueStats> {
        let state = self.state.lock();
        let mut stats = QueueStats::default();
        for entry in state.jobs.values() {
            stats.record(entry.job.status, 1);
        }
        Ok(stats)
    }

    async fn health_check(&self) -> JobResult<()> {
        Ok(())
    }
}
