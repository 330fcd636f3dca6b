//! Validated JSON extractor for automatic request validation.
//!
//! `ValidatedJson<T>` deserializes the body and runs the `validator` rules
//! on it. Both malformed JSON and failed validation are rejected with
//! 400 Bad Request; validation failures carry field-level details.

use axum::{
    async_trait,
    extract::{rejection::JsonRejection, FromRequest, Request},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use conveyor_core::{ErrorResponse, FieldError};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors, ValidationErrorsKind};

/// JSON extractor that validates the deserialized value.
///
/// # Example
///
/// ```ignore
/// use conveyor_rest::extractors::ValidatedJson;
/// use validator::Validate;
///
/// #[derive(Deserialize, Validate)]
/// struct EnqueueRequest {
///     #[validate(length(min = 1))]
///     job_type: String,
/// }
///
/// async fn enqueue(ValidatedJson(request): ValidatedJson<EnqueueRequest>) {
///     // request is guaranteed to be valid here
/// }
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct ValidatedJson<T>(pub T);

impl<T> std::ops::Deref for ValidatedJson<T> {
    type Target = T;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

/// Rejection type for validated JSON extraction.
#[derive(Debug)]
pub enum ValidatedJsonRejection {
    /// JSON parsing/deserialization error.
    JsonError(JsonRejection),
    /// Validation error with field-level details.
    ValidationError(ValidationErrors),
}

impl IntoResponse for ValidatedJsonRejection {
    fn into_response(self) -> Response {
        let error_response = match self {
            Self::JsonError(rejection) => ErrorResponse {
                code: "INVALID_JSON".to_string(),
                message: format!("Invalid JSON: {}", rejection.body_text()),
                details: None,
            },
            Self::ValidationError(errors) => {
                let field_errors = convert_validation_errors(&errors);
                let message = field_errors
                    .first()
                    .map(|e| e.message.clone())
                    .unwrap_or_else(|| "Request validation failed".to_string());
                ErrorResponse {
                    code: "VALIDATION_ERROR".to_string(),
                    message,
                    details: Some(field_errors),
                }
            }
        };
        (StatusCode::BAD_REQUEST, Json(error_response)).into_response()
    }
}

/// Convert validator errors to field errors.
fn convert_validation_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut field_errors = Vec::new();

    for (field, field_errs) in errors.field_errors() {
        for err in field_errs {
            let message = err
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Validation failed for field '{}'", field));

            field_errors.push(FieldError {
                field: field.to_string(),
                message,
                code: err.code.to_string(),
            });
        }
    }

    for (field, errors_kind) in &errors.0 {
        if let ValidationErrorsKind::Struct(nested) = errors_kind {
            for nested_err in convert_validation_errors(nested.as_ref()) {
                field_errors.push(FieldError {
                    field: format!("{}.{}", field, nested_err.field),
                    message: nested_err.message,
                    code: nested_err.code,
                });
            }
        }
    }

    field_errors.sort_by(|a, b| a.field.cmp(&b.field));
    field_errors
}

#[async_trait]
impl<T, S> FromRequest<S> for ValidatedJson<T>
where
    T: DeserializeOwned + Validate,
    S: Send + Sync,
{
    type Rejection = ValidatedJsonRejection;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(ValidatedJsonRejection::JsonError)?;

        value
            .validate()
            .map_err(ValidatedJsonRejection::ValidationError)?;

        Ok(ValidatedJson(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;
    use validator::Validate;

    #[derive(Debug, Deserialize, Validate)]
    struct TestRequest {
        #[validate(length(min = 1, message = "job_type is required"))]
        job_type: String,
        #[validate(range(min = 1, message = "max_attempts must be at least 1"))]
        max_attempts: Option<i32>,
    }

    #[derive(Debug, Deserialize, Validate)]
    struct NestedRequest {
        #[validate(nested)]
        job: TestRequest,
    }

    #[test]
    fn test_convert_validation_errors_single_field() {
        let req = TestRequest {
            job_type: String::new(),
            max_attempts: None,
        };

        let errors = req.validate().unwrap_err();
        let field_errors = convert_validation_errors(&errors);

        assert_eq!(field_errors.len(), 1);
        assert_eq!(field_errors[0].field, "job_type");
        assert_eq!(field_errors[0].message, "job_type is required");
    }

    #[test]
    fn test_convert_validation_errors_multiple_fields() {
        let req = TestRequest {
            job_type: String::new(),
            max_attempts: Some(0),
        };

        let errors = req.validate().unwrap_err();
        let field_errors = convert_validation_errors(&errors);

        let field_names: Vec<&str> = field_errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(field_names, vec!["job_type", "max_attempts"]);
    }

    #[test]
    fn test_convert_validation_errors_nested() {
        let req = NestedRequest {
            job: TestRequest {
                job_type: String::new(),
                max_attempts: Some(3),
            },
        };

        let errors = req.validate().unwrap_err();
        let field_errors = convert_validation_errors(&errors);

        assert_eq!(field_errors.len(), 1);
        assert_eq!(field_errors[0].field, "job.job_type");
    }

    #[test]
    fn test_valid_request_passes() {
        let req = TestRequest {
            job_type: "send_email".to_string(),
            max_attempts: Some(5),
        };
        assert!(req.validate().is_ok());
    }

    #[test]
    fn test_validation_rejection_is_bad_request() {
        let errors = TestRequest {
            job_type: String::new(),
            max_attempts: None,
        }
        .validate()
        .unwrap_err();

        let response = ValidatedJsonRejection::ValidationError(errors).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
