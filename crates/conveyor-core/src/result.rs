//! Result type aliases for Conveyor.

use crate::ConveyorError;

/// A specialized `Result` type for Conveyor operations.
pub type ConveyorResult<T> = Result<T, ConveyorError>;
