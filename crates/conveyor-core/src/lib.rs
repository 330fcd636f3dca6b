//! # Conveyor Core
//!
//! Foundational types shared by every Conveyor crate: the unified
//! application error, its serializable HTTP representation, and the
//! logging bootstrap used by the server binary.

pub mod error;
pub mod result;
pub mod telemetry;

pub use error::*;
pub use result::*;
pub use telemetry::{init_logging, LoggingConfig};
