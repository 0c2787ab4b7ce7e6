//! Error types for the HTTP service

use crate::config::ConfigError;
use crate::responses::ErrorResponse;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use branch_relay_core::RelayError;
use tracing::{error, warn};

/// A failed delivery, rendered as an HTTP response.
///
/// Status codes follow what webhook senders already expect from this relay:
///
/// - `400 Bad Request`: the request itself is at fault (headers, size,
///   transport, JSON, signature).
/// - `500 Internal Server Error`: the event cannot be routed, or the
///   downstream did not accept it.
///
/// The body is always `{"error": "<message>"}`. Unroutable events share one
/// generic message; the precise reason only goes to the log.
#[derive(Debug, thiserror::Error)]
#[error(transparent)]
pub struct WebhookHandlerError(#[from] RelayError);

impl WebhookHandlerError {
    pub fn relay_error(&self) -> &RelayError {
        &self.0
    }

    pub fn status_code(&self) -> StatusCode {
        if self.0.is_client_error() {
            StatusCode::BAD_REQUEST
        } else {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();

        match &self.0 {
            RelayError::UnroutableEvent { reason } => {
                warn!(kind = self.0.kind(), reason = %reason, "Rejected unroutable event");
            }
            // Already logged with repository context where it happened.
            RelayError::ForwardFailed(_) => {}
            other if status.is_server_error() => {
                error!(kind = other.kind(), error = %other, "Webhook request failed");
            }
            other => {
                warn!(kind = other.kind(), error = %other, "Rejected webhook request");
            }
        }

        (status, Json(ErrorResponse::new(self.0.to_string()))).into_response()
    }
}

/// Service-level errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("Failed to bind to address {address}: {message}")]
    BindFailed { address: String, message: String },

    #[error("Server failed: {message}")]
    ServerFailed { message: String },

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),
}

impl ServiceError {
    /// Process exit code for this failure.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::BindFailed { .. } => 1,
            Self::ServerFailed { .. } => 2,
            Self::Configuration(_) => 3,
        }
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
