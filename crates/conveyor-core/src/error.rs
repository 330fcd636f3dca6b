//! Unified error type surfaced at the application boundary.

use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Unified error type for Conveyor.
///
/// Queue internals carry their own richer error; this enum is what the
/// HTTP façade and the server binary deal with.
#[derive(Error, Debug)]
pub enum ConveyorError {
    /// Resource not found
    #[error("Resource not found: {resource_type} with id {id}")]
    NotFound {
        resource_type: &'static str,
        id: String,
    },

    /// Caller supplied invalid input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Operation not allowed in the resource's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Timeout error
    #[error("Operation timed out: {0}")]
    Timeout(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// Generic error wrapper
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ConveyorError {
    /// Returns the HTTP status code for this error.
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        match self {
            Self::NotFound { .. } => 404,
            Self::Validation(_) | Self::InvalidState(_) => 400,
            Self::Timeout(_) => 503,
            Self::Database(_) | Self::Configuration(_) | Self::Internal(_) | Self::Other(_) => 500,
        }
    }

    /// Returns a machine-readable error code.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound { .. } => "NOT_FOUND",
            Self::Validation(_) => "VALIDATION_ERROR",
            Self::InvalidState(_) => "INVALID_STATE",
            Self::Database(_) => "DATABASE_ERROR",
            Self::Configuration(_) => "CONFIGURATION_ERROR",
            Self::Timeout(_) => "TIMEOUT",
            Self::Internal(_) | Self::Other(_) => "INTERNAL_ERROR",
        }
    }

    /// Creates a not found error for a resource.
    #[must_use]
    pub fn not_found<T: ToString>(resource_type: &'static str, id: T) -> Self {
        Self::NotFound {
            resource_type,
            id: id.to_string(),
        }
    }

    /// Creates a validation error.
    #[must_use]
    pub fn validation<T: Into<String>>(message: T) -> Self {
        Self::Validation(message.into())
    }

    /// Creates an invalid state error.
    #[must_use]
    pub fn invalid_state<T: Into<String>>(message: T) -> Self {
        Self::InvalidState(message.into())
    }

    /// Creates an internal error.
    #[must_use]
    pub fn internal<T: Into<String>>(message: T) -> Self {
        Self::Internal(message.into())
    }
}

#[cfg(feature = "sqlx")]
impl From<sqlx::Error> for ConveyorError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => Self::NotFound {
                resource_type: "database_row",
                id: "unknown".to_string(),
            },
            _ => Self::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for ConveyorError {
    fn from(err: serde_json::Error) -> Self {
        Self::Internal(format!("JSON serialization error: {}", err))
    }
}

/// Serializable error response for API responses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Machine-readable error code
    pub code: String,
    /// Human-readable error message
    pub message: String,
    /// Optional field-level errors for validation
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Vec<FieldError>>,
}

/// Field-level validation error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// Error message
    pub message: String,
    /// Error code
    pub code: String,
}

impl ErrorResponse {
    /// Creates a new error response from a `ConveyorError`.
    #[must_use]
    pub fn from_error(error: &ConveyorError) -> Self {
        Self {
            code: error.error_code().to_string(),
            message: error.to_string(),
            details: None,
        }
    }

    /// Sets field-level validation errors.
    #[must_use]
    pub fn with_details(mut self, details: Vec<FieldError>) -> Self {
        self.details = Some(details);
        self
    }
}

impl From<&ConveyorError> for ErrorResponse {
    fn from(error: &ConveyorError) -> Self {
        Self::from_error(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_status_codes() {
        assert_eq!(ConveyorError::not_found("Job", 1).status_code(), 404);
        assert_eq!(ConveyorError::validation("job_type is required").status_code(), 400);
        assert_eq!(ConveyorError::invalid_state("job is processing").status_code(), 400);
        assert_eq!(ConveyorError::Database("db error".to_string()).status_code(), 500);
        assert_eq!(ConveyorError::internal("oops").status_code(), 500);
        assert_eq!(ConveyorError::Timeout("timed out".to_string()).status_code(), 503);
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(ConveyorError::not_found("Job", 1).error_code(), "NOT_FOUND");
        assert_eq!(ConveyorError::validation("bad").error_code(), "VALIDATION_ERROR");
        assert_eq!(ConveyorError::invalid_state("bad").error_code(), "INVALID_STATE");
        assert_eq!(
            ConveyorError::Configuration("x".to_string()).error_code(),
            "CONFIGURATION_ERROR"
        );
        assert_eq!(ConveyorError::internal("err").error_code(), "INTERNAL_ERROR");
    }

    #[test]
    fn test_not_found_message_mentions_resource() {
        let err = ConveyorError::not_found("Job", "abc-123");
        let msg = err.to_string();
        assert!(msg.contains("Job") && msg.contains("abc-123"));
    }

    #[test]
    fn test_from_anyhow() {
        let err: ConveyorError = anyhow::anyhow!("boom").into();
        assert_eq!(err.status_code(), 500);
        assert!(err.to_string().contains("boom"));
    }

    #[test]
    fn test_error_response_from_error() {
        let err = ConveyorError::not_found("Job", 1);
        let response = ErrorResponse::from_error(&err);
        assert_eq!(response.code, "NOT_FOUND");
        assert!(!response.message.is_empty());
        assert!(response.details.is_none());
    }

    #[test]
    fn test_error_response_with_details() {
        let err = ConveyorError::validation("bad input");
        let details = vec![FieldError {
            field: "job_type".to_string(),
            message: "job_type is required".to_string(),
            code: "length".to_string(),
        }];
        let response = ErrorResponse::from_error(&err).with_details(details);
        assert_eq!(response.details.map(|d| d.len()), Some(1));
    }

    #[test]
    fn test_error_response_skips_empty_details() {
        let response = ErrorResponse::from(&ConveyorError::internal("x"));
        let json = serde_json::to_value(&response).unwrap();
        assert!(json.get("details").is_none());
    }
}
