//! API error types with HTTP response mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use checkout::{CheckoutError, store_error_kind};
use domain::{ErrorKind, ValidationError};
use serde::Serialize;
use store::StoreError;

/// API-level error type that maps to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Missing, unknown or deactivated bearer token.
    Unauthorized,
    /// Authenticated, but not allowed to do this.
    Forbidden,
    /// Resource not found.
    NotFound(String),
    /// Bad request from the client.
    BadRequest(String),
    /// The request conflicts with current state.
    Conflict { message: String, retryable: bool },
    /// Internal server error.
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    success: bool,
    details: String,
    retryable: bool,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, details, retryable) = match self {
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication credentials were not provided or are invalid".to_string(),
                false,
            ),
            ApiError::Forbidden => (
                StatusCode::FORBIDDEN,
                "You do not have permission to perform this action".to_string(),
                false,
            ),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg, false),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg, false),
            ApiError::Conflict { message, retryable } => (StatusCode::CONFLICT, message, retryable),
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    false,
                )
            }
        };

        let body = ErrorBody {
            success: false,
            details,
            retryable,
        };
        (status, axum::Json(body)).into_response()
    }
}

impl ApiError {
    fn from_kind(kind: Option<ErrorKind>, message: String, retryable: bool) -> Self {
        match kind {
            Some(ErrorKind::Validation) => ApiError::BadRequest(message),
            Some(ErrorKind::NotFound) => ApiError::NotFound(message),
            Some(ErrorKind::Conflict) => ApiError::Conflict { message, retryable },
            None => ApiError::Internal(message),
        }
    }
}

impl From<CheckoutError> for ApiError {
    fn from(err: CheckoutError) -> Self {
        if matches!(err, CheckoutError::Forbidden) {
            return ApiError::Forbidden;
        }
        ApiError::from_kind(err.kind(), err.to_string(), err.is_retryable())
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        ApiError::from_kind(store_error_kind(&err), err.to_string(), err.is_retryable())
    }
}

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        ApiError::BadRequest(err.to_string())
    }
}
