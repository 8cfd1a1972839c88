//! services/api/src/error.rs
//!
//! Defines the primary error type for the entire API service and its mapping
//! onto HTTP responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use promptdeck_core::ports::{ExternalServiceError, PortError};
use serde::Serialize;

use crate::config::ConfigError;

/// The primary error type for the `api` service.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from one of the core service ports.
    #[error("Service Port Error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid credentials or token on the authenticated surface.
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Webhook signature rejection; always checked before any processing.
    #[error("Invalid webhook signature")]
    WebhookSignature,

    /// Represents a standard Input/Output error (e.g., binding to a network socket).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    detail: String,
}

impl ApiError {
    fn status_and_detail(&self) -> (StatusCode, String) {
        match self {
            ApiError::Port(port) => match port {
                PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
                PortError::Forbidden(_) => {
                    (StatusCode::FORBIDDEN, "Not enough permissions".to_string())
                }
                PortError::Validation(msg) => (StatusCode::UNPROCESSABLE_ENTITY, msg.clone()),
                PortError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
                PortError::External(external) => match external {
                    ExternalServiceError::RateLimited(_) => (
                        StatusCode::TOO_MANY_REQUESTS,
                        "Provider rate limit exceeded. Please try again later.".to_string(),
                    ),
                    ExternalServiceError::Timeout(_) => (
                        StatusCode::GATEWAY_TIMEOUT,
                        "Provider request timed out".to_string(),
                    ),
                    ExternalServiceError::InvalidRequest(msg) => {
                        (StatusCode::BAD_REQUEST, msg.clone())
                    }
                    ExternalServiceError::Unauthenticated(_) | ExternalServiceError::Other(_) => (
                        StatusCode::BAD_GATEWAY,
                        "Upstream provider error".to_string(),
                    ),
                },
                PortError::Unexpected(_) => (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                ),
            },
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            ApiError::WebhookSignature => {
                (StatusCode::FORBIDDEN, "Invalid webhook signature".to_string())
            }
            // Internals are logged, never surfaced to the caller.
            ApiError::Config(_)
            | ApiError::Database(_)
            | ApiError::Io(_)
            | ApiError::Internal(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, detail) = self.status_and_detail();

        if status.is_server_error() {
            tracing::error!("request failed: {:?}", self);
        }

        (status, Json(ErrorBody { detail })).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn taxonomy_maps_to_expected_statuses() {
        let cases: Vec<(ApiError, StatusCode)> = vec![
            (
                ApiError::Port(PortError::NotFound("x".into())),
                StatusCode::NOT_FOUND,
            ),
            (
                ApiError::Port(PortError::Forbidden("x".into())),
                StatusCode::FORBIDDEN,
            ),
            (
                ApiError::Port(PortError::Validation("x".into())),
                StatusCode::UNPROCESSABLE_ENTITY,
            ),
            (
                ApiError::Port(PortError::Conflict("x".into())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::Port(PortError::External(ExternalServiceError::RateLimited(
                    "x".into(),
                ))),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                ApiError::Port(PortError::External(ExternalServiceError::Timeout("x".into()))),
                StatusCode::GATEWAY_TIMEOUT,
            ),
            (
                ApiError::Port(PortError::Unexpected("secret detail".into())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (ApiError::WebhookSignature, StatusCode::FORBIDDEN),
            (
                ApiError::Unauthorized("no token".into()),
                StatusCode::UNAUTHORIZED,
            ),
        ];

        for (err, expected) in cases {
            let (status, detail) = err.status_and_detail();
            assert_eq!(status, expected);
            if status == StatusCode::INTERNAL_SERVER_ERROR {
                assert_eq!(detail, "Internal server error");
            }
        }
    }
}
