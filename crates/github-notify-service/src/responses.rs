//! Request and response bodies of the HTTP API.

use serde::{Deserialize, Serialize};

/// Webhook processing response
#[derive(Debug, Serialize, Deserialize)]
pub struct WebhookResponse {
    pub delivery_id: String,
    /// Outcome label: `delivered`, `duplicate`, `ignored`, `ping` or `dropped`
    pub status: String,
    pub message: String,
}

/// Health check response
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: String,
    pub version: String,
}

/// Slash command request, as posted by Mattermost's outgoing command hook
#[derive(Debug, Clone, Deserialize)]
pub struct CommandRequest {
    pub channel_id: String,
    pub user_id: String,
    #[serde(default)]
    pub user_name: String,
    /// The trigger, e.g. `/github`
    pub command: String,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub token: String,
}

/// Slash command reply
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResponse {
    pub response_type: String,
    pub text: String,
}

impl CommandResponse {
    /// Reply only the invoking user sees
    pub fn ephemeral(text: impl Into<String>) -> Self {
        Self {
            response_type: "ephemeral".to_string(),
            text: text.into(),
        }
    }
}
