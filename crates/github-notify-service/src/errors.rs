//! Error types for the HTTP service

use crate::config::ConfigError;
use crate::signature_validator::SignatureError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Json, Response},
};
use github_notify_core::{PipelineError, ValidationError};
use tracing::{error, warn};

/// Seconds GitHub is told to wait before redelivering a skipped delivery
pub const RETRY_AFTER_SECONDS: u64 = 30;

/// Webhook and command handler errors with HTTP status code mapping
///
/// - `400 Bad Request`: missing or invalid headers, malformed payloads
/// - `401 Unauthorized`: signature or command token mismatch
/// - `500 Internal Server Error`: unexpected server failures
/// - `503 Service Unavailable`: the delivery could not be claimed; GitHub may
///   redeliver it later
///
/// Client-facing messages never include secrets or payload contents.
#[derive(Debug, thiserror::Error)]
pub enum WebhookHandlerError {
    /// Maps to: `400 Bad Request`
    #[error("Invalid headers: {0}")]
    InvalidHeaders(#[from] ValidationError),

    /// Maps to: `401 Unauthorized`
    #[error("Invalid signature: {0}")]
    InvalidSignature(#[from] SignatureError),

    /// Maps to: `400 Bad Request`
    #[error("{0}")]
    MalformedPayload(#[from] PipelineError),

    /// The dedup store could not confirm ownership of the delivery
    ///
    /// Maps to: `503 Service Unavailable` with `Retry-After`
    #[error("Delivery could not be processed right now")]
    Unavailable,

    /// Slash command token mismatch
    ///
    /// Maps to: `401 Unauthorized`
    #[error("Invalid command token")]
    Unauthorized,

    /// Maps to: `500 Internal Server Error`; details are only logged
    #[error("Internal server error: {message}")]
    InternalError { message: String },
}

impl WebhookHandlerError {
    /// Label recorded on the rejection counter
    pub fn reason(&self) -> &'static str {
        match self {
            Self::InvalidHeaders(_) => "invalid_headers",
            Self::InvalidSignature(_) => "invalid_signature",
            Self::MalformedPayload(_) => "malformed_payload",
            Self::Unavailable => "unavailable",
            Self::Unauthorized => "unauthorized",
            Self::InternalError { .. } => "internal",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidHeaders(_) | Self::MalformedPayload(_) => StatusCode::BAD_REQUEST,
            Self::InvalidSignature(_) | Self::Unauthorized => StatusCode::UNAUTHORIZED,
            Self::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
            Self::InternalError { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for WebhookHandlerError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let (message, retry_after) = match &self {
            Self::InternalError { message } => {
                error!(error = %message, "Internal server error occurred");
                (
                    "Internal server error occurred. Please try again later.".to_string(),
                    None,
                )
            }
            Self::InvalidSignature(e) => {
                warn!(error = %e, "Rejected webhook signature");
                (self.to_string(), None)
            }
            Self::Unavailable => (self.to_string(), Some(RETRY_AFTER_SECONDS)),
            _ => (self.to_string(), None),
        };

        let body = serde_json::json!({
            "error": message,
            "status": status.as_u16(),
            "timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let mut response = (status, Json(body)).into_response();

        if let Some(retry_seconds) = retry_after {
            if let Ok(header_value) = retry_seconds.to_string().parse() {
                response.headers_mut().insert("Retry-After", header_value);
            }
        }

        response
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

    #[error("Failed to initialize {component}: {message}")]
    Initialization { component: String, message: String },
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod tests;
