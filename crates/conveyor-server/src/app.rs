//! Application builder.
//!
//! Wires configuration into a running system: job store, queue with hooks,
//! worker pool and HTTP router. [`App::run`] owns the process lifecycle.

use crate::handlers::builtin_handlers;
use axum::Router;
use conveyor_config::AppConfig;
use conveyor_core::{ConveyorError, ConveyorResult};
use conveyor_jobs::postgres::{connect, run_migrations};
use conveyor_jobs::{
    register_metrics, HandlerRegistry, JobQueue, JobStore, MetricsHooks, PgJobStore,
    TracingHooks, WorkerPool, WorkerPoolConfig,
};
use conveyor_rest::{create_router, AppState};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::future::Future;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{info, warn};

/// Installs the global Prometheus recorder and describes the job metrics.
pub fn install_metrics_recorder() -> ConveyorResult<PrometheusHandle> {
    let handle = PrometheusBuilder::new().install_recorder().map_err(|e| {
        ConveyorError::Internal(format!("Failed to install metrics recorder: {}", e))
    })?;
    register_metrics();
    Ok(handle)
}

/// Application builder for constructing the server.
#[derive(Default)]
pub struct AppBuilder {
    config: Option<AppConfig>,
    handlers: Option<HandlerRegistry>,
    store: Option<Arc<dyn JobStore>>,
    metrics: Option<PrometheusHandle>,
}

impl AppBuilder {
    /// Creates a new application builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the configuration.
    #[must_use]
    pub fn with_config(mut self, config: AppConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Replaces the built-in handlers.
    #[must_use]
    pub fn with_handlers(mut self, handlers: HandlerRegistry) -> Self {
        self.handlers = Some(handlers);
        self
    }

    /// Uses `store` instead of connecting to PostgreSQL.
    #[must_use]
    pub fn with_store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Serves `/metrics` from `handle`.
    #[must_use]
    pub fn with_metrics(mut self, handle: PrometheusHandle) -> Self {
        self.metrics = Some(handle);
        self
    }

    /// Builds the application. Connects to the database and applies
    /// migrations unless a store was supplied.
    pub async fn build(self) -> ConveyorResult<App> {
        let config = self.config.unwrap_or_default();

        let (store, postgres): (Arc<dyn JobStore>, Option<PgJobStore>) = match self.store {
            Some(store) => (store, None),
            None => {
                let pool = connect(&config.database.pool_settings()).await?;
                if config.database.run_migrations {
                    run_migrations(&pool).await?;
                }
                let pg = PgJobStore::new(pool);
                (Arc::new(pg.clone()), Some(pg))
            }
        };

        let mut queue = JobQueue::new(store)
            .with_hooks(Arc::new(TracingHooks))
            .with_default_max_attempts(config.jobs.backoff.default_max_attempts);
        if config.observability.metrics_enabled {
            queue = queue.with_hooks(Arc::new(MetricsHooks));
        }
        let queue = Arc::new(queue);

        let handlers = self.handlers.unwrap_or_else(builtin_handlers);
        info!(job_types = ?handlers.job_types(), "Registered job handlers");

        let workers = Arc::new(WorkerPool::new(
            queue.clone(),
            handlers,
            WorkerPoolConfig::from(&config.jobs),
        ));

        let mut state = AppState::new(queue.clone()).with_workers(workers.clone());
        if let Some(handle) = self.metrics {
            state = state.with_metrics(handle);
        }
        let router = create_router(state, &config.server, &config.observability.metrics_path);

        Ok(App {
            config,
            queue,
            workers,
            router,
            postgres,
        })
    }
}

/// A fully wired application, ready to run.
pub struct App {
    config: AppConfig,
    queue: Arc<JobQueue>,
    workers: Arc<WorkerPool>,
    router: Router,
    postgres: Option<PgJobStore>,
}

impl App {
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn queue(&self) -> &Arc<JobQueue> {
        &self.queue
    }

    pub fn workers(&self) -> &Arc<WorkerPool> {
        &self.workers
    }

    /// The HTTP router, for serving or for in-process requests.
    pub fn router(&self) -> Router {
        self.router.clone()
    }

    /// Binds the configured address and runs until `shutdown` resolves.
    pub async fn run<F>(self, shutdown: F) -> ConveyorResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = self.config.server.addr();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ConveyorError::Internal(format!("Failed to bind {}: {}", addr, e)))?;
        self.run_with_listener(listener, shutdown).await
    }

    /// Starts the workers, serves HTTP on `listener` until `shutdown`
    /// resolves, then drains the workers and closes the database pool.
    pub async fn run_with_listener<F>(self, listener: TcpListener, shutdown: F) -> ConveyorResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.workers.start()?;

        if let Ok(addr) = listener.local_addr() {
            info!(%addr, "HTTP server listening");
        }

        let served = axum::serve(listener, self.router)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| ConveyorError::Internal(format!("HTTP server error: {}", e)));

        info!("HTTP server stopped, draining workers");
        if let Err(e) = self.workers.shutdown().await {
            warn!(error = %e, "Worker pool shutdown reported an error");
        }

        if let Some(pg) = self.postgres {
            pg.pool().close().await;
            info!("Database pool closed");
        }

        served
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use conveyor_jobs::{MemoryJobStore, NewJob};
    use std::time::Duration;

    fn memory_builder() -> AppBuilder {
        AppBuilder::new().with_store(Arc::new(MemoryJobStore::new()))
    }

    #[tokio::test]
    async fn test_build_with_memory_store() {
        let app = memory_builder().build().await.unwrap();

        assert!(app.postgres.is_none());
        assert!(!app.workers().is_running());
        assert_eq!(app.workers().stats().concurrency, 4);
    }

    #[tokio::test]
    async fn test_default_max_attempts_from_config() {
        let mut config = AppConfig::default();
        config.jobs.backoff.default_max_attempts = 6;

        let app = memory_builder().with_config(config).build().await.unwrap();
        let job = app
            .queue()
            .enqueue(NewJob::new("noop", serde_json::json!({})))
            .await
            .unwrap();

        assert_eq!(job.max_attempts, 6);
    }

    #[tokio::test]
    async fn test_run_processes_jobs_and_stops_on_shutdown() {
        let mut config = AppConfig::default();
        config.jobs.worker.poll_interval_ms = 10;

        let app = memory_builder().with_config(config).build().await.unwrap();
        let queue = app.queue().clone();
        let workers = app.workers().clone();
        let job = queue
            .enqueue(NewJob::new("noop", serde_json::json!({})))
            .await
            .unwrap();

        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let server = tokio::spawn(app.run_with_listener(listener, async {
            let _ = rx.await;
        }));

        let mut completed = false;
        for _ in 0..200 {
            if queue.get(&job.id).await.unwrap().status.is_terminal() {
                completed = true;
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(completed, "job was not processed");
        assert!(workers.is_running());

        tx.send(()).unwrap();
        server.await.unwrap().unwrap();

        assert!(!workers.is_running());
        assert_eq!(queue.get(&job.id).await.unwrap().status.as_str(), "completed");
    }
}
