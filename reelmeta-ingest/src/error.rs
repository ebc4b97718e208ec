//! Error types for reelmeta-ingest's HTTP surface

use crate::sinks::SinkError;
use crate::types::{ExtractionFailed, StrategyFailure};
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Resource not found (404)
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Resource already exists (409)
    #[error("Conflict: {0}")]
    Conflict(String),

    /// Every extraction strategy failed (422); carries each cause
    #[error("Extraction failed: {message}")]
    ExtractionFailed {
        message: String,
        causes: Vec<StrategyFailure>,
    },

    /// Caller deadline passed (504)
    #[error("Timed out: {0}")]
    Timeout(String),

    /// A sink is unavailable (503)
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// reelmeta-common error
    #[error("Common error: {0}")]
    Common(#[from] reelmeta_common::Error),
}

impl From<ExtractionFailed> for ApiError {
    fn from(err: ExtractionFailed) -> Self {
        match err {
            ExtractionFailed::UnsupportedUrl(_) | ExtractionFailed::NoStrategies(_) => {
                ApiError::BadRequest(err.to_string())
            }
            ExtractionFailed::Cancelled { .. } => ApiError::Timeout(err.to_string()),
            ExtractionFailed::AllStrategiesFailed { .. } => ApiError::ExtractionFailed {
                message: err.to_string(),
                causes: err.causes().to_vec(),
            },
        }
    }
}

impl From<SinkError> for ApiError {
    fn from(err: SinkError) -> Self {
        match err {
            SinkError::NotFound(id) => ApiError::NotFound(id),
            SinkError::Unavailable(msg) => ApiError::Unavailable(msg),
            SinkError::Duplicate(key) => ApiError::Conflict(format!("record {} already saved", key)),
            other => ApiError::Internal(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message, causes) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg, None),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg, None),
            ApiError::ExtractionFailed { message, causes } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "EXTRACTION_FAILED",
                message,
                Some(causes),
            ),
            ApiError::Timeout(msg) => (StatusCode::GATEWAY_TIMEOUT, "TIMEOUT", msg, None),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "UNAVAILABLE", msg, None),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg, None),
            ApiError::Common(reelmeta_common::Error::InvalidInput(msg)) => {
                (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg, None)
            }
            ApiError::Common(ref err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "COMMON_ERROR",
                err.to_string(),
                None,
            ),
        };

        let mut error = json!({
            "code": error_code,
            "message": message,
        });
        if let Some(causes) = causes {
            error["causes"] = json!(causes);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
