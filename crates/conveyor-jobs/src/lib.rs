//! Conveyor Jobs - Durable Job Queue and Worker Pool
//!
//! A database-backed job queue with:
//! - Atomic, priority-ordered claiming safe across processes
//! - A bounded worker pool with per-job timeouts and panic containment
//! - Exponential retry backoff with an attempt ceiling
//! - Delayed jobs via `scheduled_for`
//! - Lifecycle hooks for logging and metrics
//! - Expired lease recovery and graceful shutdown
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────┐
//! │  Producer (HTTP / code)                                    │
//! │     │ enqueue                                              │
//! │     ▼                                                      │
//! │  JobQueue ──hooks──▶ TracingHooks / MetricsHooks           │
//! │     │                                                      │
//! │     ▼                                                      │
//! │  JobStore (PgJobStore | MemoryJobStore)                    │
//! │     ▲ claim_next (FOR UPDATE SKIP LOCKED)                  │
//! │     │                                                      │
//! │  WorkerPool                                                │
//! │  ┌────────┐ ┌────────┐ ┌────────┐      ┌─────────────┐     │
//! │  │ slot 0 │ │ slot 1 │ │ slot N │      │ maintenance │     │
//! │  └───┬────┘ └───┬────┘ └───┬────┘      └─────────────┘     │
//! │      └──────────┴──────────┘                               │
//! │                 ▼                                          │
//! │          HandlerRegistry                                   │
//! └────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Example
//!
//! ```rust,ignore
//! use conveyor_jobs::prelude::*;
//! use std::sync::Arc;
//!
//! let queue = Arc::new(JobQueue::new(Arc::new(MemoryJobStore::new())));
//!
//! let mut handlers = HandlerRegistry::new();
//! handlers.register("send_email", |payload, ctx| async move {
//!     tracing::info!(attempt = ctx.attempt, to = %payload["to"], "sending");
//!     Ok(())
//! });
//!
//! let pool = WorkerPool::new(queue.clone(), handlers, WorkerPoolConfig::default());
//! pool.start()?;
//!
//! queue
//!     .enqueue(NewJob::new("send_email", serde_json::json!({"to": "user@example.com"}))
//!         .priority(Priority::High))
//!     .await?;
//!
//! pool.shutdown().await?;
//! ```

pub mod backoff;
pub mod config;
pub mod error;
pub mod handler;
pub mod hooks;
pub mod job;
pub mod memory;
pub mod metrics;
pub mod postgres;
pub mod queue;
pub mod worker;

pub use backoff::{backoff_delay, BackoffPolicy};
pub use config::{BackoffConfig, JobsConfig, WorkerConfig};
pub use error::{JobError, JobResult};
pub use handler::{HandlerRegistry, JobHandler};
pub use hooks::{HookResult, HookRunner, JobHooks, NoopHooks, TracingHooks};
pub use job::{Job, JobContext, JobId, JobStatus, TypedJob, DEFAULT_MAX_ATTEMPTS};
pub use memory::MemoryJobStore;
pub use metrics::{register_metrics, JobMetrics, MetricsHooks, WorkerMetrics};
pub use postgres::{PgJobStore, PgPoolSettings};
pub use queue::{JobQueue, JobStore, NewJob, Priority, QueueStats};
pub use worker::{WorkerPool, WorkerPoolConfig, WorkerPoolStats};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::handler::HandlerRegistry;
    pub use crate::job::{Job, JobStatus, TypedJob};
    pub use crate::memory::MemoryJobStore;
    pub use crate::queue::{JobQueue, NewJob, Priority};
    pub use crate::worker::{WorkerPool, WorkerPoolConfig};
    pub use crate::{JobContext, JobError, JobId, JobResult};
}
