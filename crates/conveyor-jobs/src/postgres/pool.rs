//! Database connection pool management.

use crate::error::{JobError, JobResult};
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tracing::{info, warn};

/// Connection pool settings.
#[derive(Debug, Clone)]
pub struct PgPoolSettings {
    pub url: String,
    pub min_connections: u32,
    pub max_connections: u32,
    pub connect_timeout: Duration,
    pub idle_timeout: Duration,
}

impl PgPoolSettings {
    /// Settings with pool defaults for `url`.
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            min_connections: 1,
            max_connections: 10,
            connect_timeout: Duration::from_secs(30),
            idle_timeout: Duration::from_secs(600),
        }
    }
}

/// Creates a connection pool.
pub async fn connect(settings: &PgPoolSettings) -> JobResult<PgPool> {
    info!("Connecting to PostgreSQL database...");

    let pool = PgPoolOptions::new()
        .min_connections(settings.min_connections)
        .max_connections(settings.max_connections)
        .acquire_timeout(settings.connect_timeout)
        .idle_timeout(Some(settings.idle_timeout))
        .connect(&settings.url)
        .await
        .map_err(|e| {
            warn!("Failed to connect to database: {}", e);
            JobError::Database(e)
        })?;

    info!("PostgreSQL connection pool established");
    Ok(pool)
}

/// Runs database migrations.
pub async fn run_migrations(pool: &PgPool) -> JobResult<()> {
    info!("Running database migrations...");
    sqlx::migrate!("../../migrations")
        .run(pool)
        .await
        .map_err(|e| JobError::Database(e.into()))?;
    info!("Database migrations completed");
    Ok(())
}
