//! PostgreSQL backend.

mod pool;
mod store;

pub use pool::{connect, run_migrations, PgPoolSettings};
pub use store::PgJobStore;
