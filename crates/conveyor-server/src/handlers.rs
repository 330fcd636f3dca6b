//! Built-in job handlers.
//!
//! A freshly started server can run jobs end to end with these. Embedders
//! register their own handlers on the same registry before building the app.

use conveyor_jobs::{HandlerRegistry, JobContext, JobError};
use serde_json::Value;
use std::time::Duration;
use tracing::info;

/// Upper bound for the `sleep` handler.
const MAX_SLEEP_MS: u64 = 60_000;

/// Registry preloaded with `noop`, `log` and `sleep`.
pub fn builtin_handlers() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();
    registry
        .register("noop", |_payload, _ctx| async { Ok(()) })
        .register("log", log_payload)
        .register("sleep", sleep);
    registry
}

async fn log_payload(payload: Value, ctx: JobContext) -> Result<(), JobError> {
    info!(
        job_id = %ctx.job_id,
        attempt = ctx.attempt,
        worker_id = %ctx.worker_id,
        payload = %payload,
        "log job"
    );
    Ok(())
}

/// Sleeps for `payload.ms` milliseconds, returning early with a retryable
/// error if the pool cancels the job.
async fn sleep(payload: Value, ctx: JobContext) -> Result<(), JobError> {
    let ms = payload
        .get("ms")
        .and_then(Value::as_u64)
        .ok_or_else(|| JobError::permanent("sleep requires a numeric `ms` field"))?
        .min(MAX_SLEEP_MS);

    tokio::select! {
        () = tokio::time::sleep(Duration::from_millis(ms)) => Ok(()),
        () = ctx.cancellation.cancelled() => Err(JobError::retry("sleep interrupted")),
    }
}
