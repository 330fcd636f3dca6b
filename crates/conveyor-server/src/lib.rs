//! # Conveyor Server Library
//!
//! Wiring for the Conveyor server binary: the application builder, the
//! built-in job handlers and startup output.

pub mod app;
pub mod handlers;
pub mod startup;

pub use app::{install_metrics_recorder, App, AppBuilder};
pub use handlers::builtin_handlers;
