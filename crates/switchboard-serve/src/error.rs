//! API error types and response formatting.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// API error type that converts to appropriate HTTP responses.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Authentication failed (missing or invalid token).
    #[error("unauthorized")]
    Unauthorized,

    /// Invalid request parameters.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// The store is unreachable.
    #[error("service unavailable: {0}")]
    Unavailable(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(#[from] anyhow::Error),

    /// Pipeline error surfaced at the HTTP boundary.
    #[error("pipeline error: {0}")]
    Pipeline(#[from] switchboard_pipeline::Error),
}

/// JSON error response body.
#[derive(Debug, Clone, Serialize)]
struct ErrorResponse {
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    message: Option<String>,
    /// Set on 500s so a report can be matched to the server log.
    #[serde(skip_serializing_if = "Option::is_none")]
    correlation_id: Option<String>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error, message, correlation_id) = match &self {
            Self::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorized", None, None),
            Self::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "bad_request",
                Some(msg.clone()),
                None,
            ),
            Self::Unavailable(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "unavailable",
                Some(msg.clone()),
                None,
            ),
            Self::Internal(err) => {
                let correlation_id = uuid::Uuid::new_v4().to_string();
                tracing::error!(correlation_id = %correlation_id, error = %err, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    Some("An internal error occurred".to_string()),
                    Some(correlation_id),
                )
            }
            Self::Pipeline(err) => {
                let correlation_id = uuid::Uuid::new_v4().to_string();
                tracing::error!(correlation_id = %correlation_id, error = %err, "pipeline error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "pipeline_error",
                    Some("An internal error occurred".to_string()),
                    Some(correlation_id),
                )
            }
        };

        let body = ErrorResponse {
            error: error.to_string(),
            message,
            correlation_id,
        };

        (status, Json(body)).into_response()
    }
}
