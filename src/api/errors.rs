//! API error types and HTTP status mapping.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;

use crate::execution::LaunchError;
use crate::scheduler::SchedulerError;

/// API error response body.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub code: String,
}

/// API error type that can be converted to HTTP responses.
#[derive(Debug)]
pub enum ApiError {
    /// Resource not found.
    NotFound(String),
    /// Malformed request (e.g., bad trigger expression).
    BadRequest(String),
    /// Request conflict (e.g., job or task already running).
    Conflict(String),
    /// Service unavailable (e.g., scheduler stopped).
    ServiceUnavailable(String),
    /// Internal server error.
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg),
            ApiError::ServiceUnavailable(msg) => {
                (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE", msg)
            }
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR", msg),
        };

        let body = ErrorResponse {
            error: message,
            code: code.to_string(),
        };

        (status, Json(body)).into_response()
    }
}

impl From<SchedulerError> for ApiError {
    fn from(err: SchedulerError) -> Self {
        match err {
            SchedulerError::JobNotFound(id) => ApiError::NotFound(format!("job not found: {}", id)),
            SchedulerError::AlreadyRunning(id) => {
                ApiError::Conflict(format!("job '{}' is already running", id))
            }
            SchedulerError::Trigger(e) => ApiError::BadRequest(e.to_string()),
            SchedulerError::InvalidJob(msg) => ApiError::BadRequest(msg),
            SchedulerError::Launch(e) => e.into(),
            SchedulerError::Stopped => {
                ApiError::ServiceUnavailable("scheduler is stopped".to_string())
            }
            SchedulerError::ChannelError(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<LaunchError> for ApiError {
    fn from(err: LaunchError) -> Self {
        match err {
            LaunchError::AlreadyRunning(_) => ApiError::Conflict(err.to_string()),
            LaunchError::SchedulerStopped => ApiError::ServiceUnavailable(err.to_string()),
            LaunchError::Spawn { .. } => ApiError::Internal(err.to_string()),
        }
    }
}
