//! Lifecycle hooks.
//!
//! Hooks observe job transitions. They run inline on the worker or request
//! path, so a failing or panicking hook is logged and swallowed; it never
//! changes the job's outcome.

use crate::error::JobError;
use crate::job::Job;
use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Result returned by hook callbacks.
pub type HookResult = anyhow::Result<()>;

/// Observer for job lifecycle events.
///
/// Every method defaults to a no-op.
pub trait JobHooks: Send + Sync {
    /// A job was persisted.
    fn on_enqueue(&self, _job: &Job) -> HookResult {
        Ok(())
    }

    /// A worker is about to run the handler.
    fn on_start(&self, _job: &Job) -> HookResult {
        Ok(())
    }

    /// The handler succeeded.
    fn on_complete(&self, _job: &Job, _elapsed: Duration) -> HookResult {
        Ok(())
    }

    /// The job failed terminally.
    fn on_fail(&self, _job: &Job, _error: &JobError) -> HookResult {
        Ok(())
    }

    /// The job was requeued after a failed attempt.
    fn on_retry(&self, _job: &Job, _error: &JobError, _delay: Duration) -> HookResult {
        Ok(())
    }

    /// The job was cancelled.
    fn on_cancel(&self, _job: &Job) -> HookResult {
        Ok(())
    }
}

/// Hooks that do nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopHooks;

impl JobHooks for NoopHooks {}

/// Fans events out to every registered hook, isolating failures.
#[derive(Clone, Default)]
pub struct HookRunner {
    hooks: Vec<Arc<dyn JobHooks>>,
}

impl HookRunner {
    /// Create a runner with the given hooks.
    pub fn new(hooks: Vec<Arc<dyn JobHooks>>) -> Self {
        Self { hooks }
    }

    /// Add a hook.
    pub fn push(&mut self, hooks: Arc<dyn JobHooks>) {
        self.hooks.push(hooks);
    }

    /// Number of registered hooks.
    pub fn len(&self) -> usize {
        self.hooks.len()
    }

    /// Returns true if no hooks are registered.
    pub fn is_empty(&self) -> bool {
        self.hooks.is_empty()
    }

    pub fn enqueue(&self, job: &Job) {
        self.dispatch("on_enqueue", job, |h| h.on_enqueue(job));
    }

    pub fn start(&self, job: &Job) {
        self.dispatch("on_start", job, |h| h.on_start(job));
    }

    pub fn complete(&self, job: &Job, elapsed: Duration) {
        self.dispatch("on_complete", job, |h| h.on_complete(job, elapsed));
    }

    pub fn fail(&self, job: &Job, error: &JobError) {
        self.dispatch("on_fail", job, |h| h.on_fail(job, error));
    }

    pub fn retry(&self, job: &Job, error: &JobError, delay: Duration) {
        self.dispatch("on_retry", job, |h| h.on_retry(job, error, delay));
    }

    pub fn cancel(&self, job: &Job) {
        self.dispatch("on_cancel", job, |h| h.on_cancel(job));
    }

    fn dispatch<F>(&self, event: &'static str, job: &Job, f: F)
    where
        F: Fn(&dyn JobHooks) -> HookResult,
    {
        for hook in &self.hooks {
            match catch_unwind(AssertUnwindSafe(|| f(hook.as_ref()))) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(
                        target: "conveyor::hooks",
                        hook = event,
                        job_id = %job.id,
                        error = %e,
                        "Hook returned an error"
                    );
                }
                Err(panic) => {
                    warn!(
                        target: "conveyor::hooks",
                        hook = event,
                        job_id = %job.id,
                        panic = %panic_message(panic.as_ref()),
                        "Hook panicked"
                    );
                }
            }
        }
    }
}

/// Extract a readable message from a panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Logs every transition through `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingHooks;

impl JobHooks for TracingHooks {
    fn on_enqueue(&self, job: &Job) -> HookResult {
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            priority = %job.priority,
            max_attempts = job.max_attempts,
            scheduled_for = ?job.scheduled_for,
            "Job enqueued"
        );
        Ok(())
    }

    fn on_start(&self, job: &Job) -> HookResult {
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempt = job.attempts + 1,
            max_attempts = job.max_attempts,
            "Job started"
        );
        Ok(())
    }

    fn on_complete(&self, job: &Job, elapsed: Duration) -> HookResult {
        info!(
            job_id = %job.id,
            job_type = %job.job_type,
            duration_ms = elapsed.as_millis() as u64,
            "Job completed"
        );
        Ok(())
    }

    fn on_fail(&self, job: &Job, error: &JobError) -> HookResult {
        warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            error = %error,
            "Job failed permanently"
        );
        Ok(())
    }

    fn on_retry(&self, job: &Job, error: &JobError, delay: Duration) -> HookResult {
        warn!(
            job_id = %job.id,
            job_type = %job.job_type,
            attempts = job.attempts,
            max_attempts = job.max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %error,
            "Job scheduled for retry"
        );
        Ok(())
    }

    fn on_cancel(&self, job: &Job) -> HookResult {
        info!(job_id = %job.id, job_type = %job.job_type, "Job cancelled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::{JobId, JobStatus};
    use crate::queue::Priority;
    use chrono::Utc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn job() -> Job {
        let now = Utc::now();
        Job {
            id: JobId::new(),
            job_type: "export".to_string(),
            payload: serde_json::json!({}),
            status: JobStatus::Processing,
            priority: Priority::Normal,
            attempts: 0,
            max_attempts: 3,
            scheduled_for: None,
            last_error: None,
            metadata: None,
            locked_by: Some("w1".to_string()),
            locked_at: Some(now),
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    #[derive(Default)]
    struct Counting {
        calls: AtomicUsize,
    }

    impl JobHooks for Counting {
        fn on_start(&self, _job: &Job) -> HookResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct Failing;

    impl JobHooks for Failing {
        fn on_start(&self, _job: &Job) -> HookResult {
            anyhow::bail!("sink unavailable")
        }
    }

    struct Panicking;

    impl JobHooks for Panicking {
        fn on_start(&self, _job: &Job) -> HookResult {
            panic!("hook exploded");
        }
    }

    #[test]
    fn test_noop_defaults() {
        let runner = HookRunner::new(vec![Arc::new(NoopHooks)]);
        let job = job();
        runner.enqueue(&job);
        runner.start(&job);
        runner.complete(&job, Duration::from_millis(5));
        runner.fail(&job, &JobError::permanent("x"));
        runner.retry(&job, &JobError::retry("x"), Duration::from_secs(1));
        runner.cancel(&job);
    }

    #[test]
    fn test_tracing_hooks_log_every_transition() {
        let hooks = TracingHooks;
        let job = job();
        assert!(hooks.on_enqueue(&job).is_ok());
        assert!(hooks.on_start(&job).is_ok());
        assert!(hooks.on_complete(&job, Duration::from_millis(5)).is_ok());
        assert!(hooks.on_fail(&job, &JobError::permanent("x")).is_ok());
        assert!(hooks
            .on_retry(&job, &JobError::retry("x"), Duration::from_secs(1))
            .is_ok());
        assert!(hooks.on_cancel(&job).is_ok());
    }

    #[test]
    fn test_error_and_panic_do_not_stop_later_hooks() {
        let counting = Arc::new(Counting::default());
        let runner = HookRunner::new(vec![
            Arc::new(Failing),
            Arc::new(Panicking),
            counting.clone(),
        ]);

        runner.start(&job());

        assert_eq!(counting.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_panic_message_extraction() {
        let payload: Box<dyn Any + Send> = Box::new("static message");
        assert_eq!(panic_message(payload.as_ref()), "static message");

        let payload: Box<dyn Any + Send> = Box::new(String::from("owned message"));
        assert_eq!(panic_message(payload.as_ref()), "owned message");

        let payload: Box<dyn Any + Send> = Box::new(42u8);
        assert_eq!(panic_message(payload.as_ref()), "unknown panic");
    }

    #[test]
    fn test_push_and_len() {
        let mut runner = HookRunner::default();
        assert!(runner.is_empty());
        runner.push(Arc::new(TracingHooks));
        assert_eq!(runner.len(), 1);
    }
}
