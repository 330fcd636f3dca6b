//! Handler registry.
//!
//! Maps a job type to the function that runs it. The registry is built up
//! front and handed to the worker pool; it is not mutated while the pool
//! is running.

use crate::error::JobError;
use crate::job::{JobContext, TypedJob};
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::info;

/// Job handler function type.
pub type JobHandler =
    Arc<dyn Fn(serde_json::Value, JobContext) -> BoxFuture<'static, Result<(), JobError>> + Send + Sync>;

/// Job type to handler mapping.
#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<String, JobHandler>,
}

impl HandlerRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler for raw JSON payloads. Replaces any existing handler.
    pub fn register<F, Fut>(&mut self, job_type: impl Into<String>, handler: F) -> &mut Self
    where
        F: Fn(serde_json::Value, JobContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), JobError>> + Send + 'static,
    {
        let job_type = job_type.into();
        let handler_fn: JobHandler = Arc::new(move |payload, ctx| handler(payload, ctx).boxed());

        info!(job_type = %job_type, "Registered job handler");
        self.handlers.insert(job_type, handler_fn);
        self
    }

    /// Register a typed job; its payload is deserialized before execution.
    ///
    /// A payload that does not deserialize fails the attempt permanently.
    pub fn register_job<J: TypedJob>(&mut self) -> &mut Self {
        let handler_fn: JobHandler = Arc::new(|payload, ctx| {
            async move {
                let job: J = serde_json::from_value(payload).map_err(|e| {
                    JobError::permanent(format!("invalid payload for {}: {}", J::JOB_TYPE, e))
                })?;
                job.execute(ctx).await
            }
            .boxed()
        });

        info!(job_type = J::JOB_TYPE, "Registered job type");
        self.handlers.insert(J::JOB_TYPE.to_string(), handler_fn);
        self
    }

    /// Look up the handler for `job_type`.
    pub fn get(&self, job_type: &str) -> Option<JobHandler> {
        self.handlers.get(job_type).cloned()
    }

    /// Returns true if a handler is registered for `job_type`.
    pub fn contains(&self, job_type: &str) -> bool {
        self.handlers.contains_key(job_type)
    }

    /// Registered job types, sorted.
    pub fn job_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

impl std::fmt::Debug for HandlerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerRegistry")
            .field("job_types", &self.job_types())
            .finish()
    }
}
