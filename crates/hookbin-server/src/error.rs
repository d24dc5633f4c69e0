//! API error types.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use hookbin_core::MalformedRequest;
use serde::Serialize;
use thiserror::Error;
use tracing::error;

/// API errors.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Missing or unknown session.
    #[error("session required")]
    Unauthorized,

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Pasted raw request text could not be parsed.
    #[error("{0}")]
    Malformed(#[from] MalformedRequest),

    /// Captured body over the configured limit.
    #[error("payload exceeds {0} bytes")]
    PayloadTooLarge(usize),

    /// Storage error.
    #[error("storage error: {0}")]
    Storage(#[from] hookbin_storage::StorageError),
}

/// Error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            ApiError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized"),
            ApiError::NotFound(_) => (StatusCode::NOT_FOUND, "not_found"),
            ApiError::BadRequest(_) => (StatusCode::BAD_REQUEST, "bad_request"),
            ApiError::Malformed(_) => (StatusCode::BAD_REQUEST, "malformed_request"),
            ApiError::PayloadTooLarge(_) => (StatusCode::PAYLOAD_TOO_LARGE, "payload_too_large"),
            ApiError::Storage(_) => (StatusCode::INTERNAL_SERVER_ERROR, "storage_error"),
        };

        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = ErrorResponse {
            error: self.to_string(),
            code: code.to_string(),
        };

        (status, axum::Json(body)).into_response()
    }
}

/// Result type for API operations.
pub type Result<T> = std::result::Result<T, ApiError>;
