//! Application state for Axum handlers.

use conveyor_jobs::{JobQueue, WorkerPool};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub queue: Arc<JobQueue>,
    /// Present when this process also runs workers.
    pub workers: Option<Arc<WorkerPool>>,
    /// Present when the Prometheus recorder is installed.
    pub metrics: Option<PrometheusHandle>,
}

impl AppState {
    /// Creates a new application state.
    pub fn new(queue: Arc<JobQueue>) -> Self {
        Self {
            queue,
            workers: None,
            metrics: None,
        }
    }

    /// Attaches the local worker pool for `/jobs/workers`.
    #[must_use]
    pub fn with_workers(mut self, workers: Arc<WorkerPool>) -> Self {
        self.workers = Some(workers);
        self
    }

    /// Attaches the Prometheus handle used to render `/metrics`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }
}
