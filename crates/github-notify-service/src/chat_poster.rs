//! Chat host adapters.
//!
//! [`IncomingWebhookPoster`] sends posts through a Mattermost incoming
//! webhook. Incoming webhooks address people by username, so direct messages
//! only reach chat users listed in its user directory. [`LoggingPoster`] only logs them; it is used when no webhook URL
//! is configured. [`SingleNodeNotifier`] is the cluster relay of a
//! deployment running one instance.

use async_trait::async_trait;
use github_notify_core::{
    broker::{ClusterNotifier, OAuthCompleteEvent},
    ChannelId, ChatError, ChatPoster, UserId,
};
use serde::Serialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

#[derive(Debug, Serialize)]
struct IncomingWebhookPayload<'a> {
    channel: &'a str,
    username: &'a str,
    text: &'a str,
}

/// Posts through a Mattermost incoming webhook
#[derive(Clone)]
pub struct IncomingWebhookPoster {
    http: reqwest::Client,
    url: String,
    username: String,
    /// Chat user ID to chat username
    user_directory: HashMap<String, String>,
}

impl IncomingWebhookPoster {
    pub fn new(url: impl Into<String>, username: impl Into<String>, timeout: Duration) -> Result<Self, ChatError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ChatError::Unavailable {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            url: url.into(),
            username: username.into(),
            user_directory: HashMap::new(),
        })
    }

    /// Usernames direct messages are addressed to, keyed by chat user ID
    pub fn with_user_directory(mut self, user_directory: HashMap<String, String>) -> Self {
        self.user_directory = user_directory;
        self
    }

    async fn send(&self, channel: &str, text: &str) -> Result<(), ChatError> {
        let payload = IncomingWebhookPayload {
            channel,
            username: &self.username,
            text,
        };

        let response = self
            .http
            .post(&self.url)
            .json(&payload)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    ChatError::Timeout
                } else {
                    ChatError::Unavailable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let message = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read error body".to_string());
        if status.is_server_error() || status.as_u16() == 429 {
            Err(ChatError::Unavailable {
                message: format!("{}: {}", status, message),
            })
        } else {
            Err(ChatError::Rejected {
                message: format!("{}: {}", status, message),
            })
        }
    }
}

#[async_trait]
impl ChatPoster for IncomingWebhookPoster {
    #[instrument(skip(self, message), fields(channel_id = %channel_id))]
    async fn create_post(&self, channel_id: &ChannelId, message: &str) -> Result<(), ChatError> {
        self.send(channel_id.as_str(), message).await
    }

    #[instrument(skip(self, message), fields(user_id = %user_id))]
    async fn direct_message(&self, user_id: &UserId, message: &str) -> Result<(), ChatError> {
        let Some(username) = self.user_directory.get(user_id.as_str()) else {
            warn!("No chat username known for user, direct message not sent");
            return Err(ChatError::Rejected {
                message: format!("no chat username known for user {}", user_id),
            });
        };
        self.send(&format!("@{}", username), message).await
    }

    async fn publish_user_event(
        &self,
        user_id: &UserId,
        event: &str,
        _payload: serde_json::Value,
    ) -> Result<(), ChatError> {
        // Incoming webhooks cannot reach a user's sessions
        debug!(user_id = %user_id, event = %event, "Dropping user event");
        Ok(())
    }
}

/// Logs posts instead of sending them
#[derive(Debug, Clone, Default)]
pub struct LoggingPoster;

#[async_trait]
impl ChatPoster for LoggingPoster {
    async fn create_post(&self, channel_id: &ChannelId, message: &str) -> Result<(), ChatError> {
        info!(channel_id = %channel_id, message = %message, "Post");
        Ok(())
    }

    async fn direct_message(&self, user_id: &UserId, message: &str) -> Result<(), ChatError> {
        info!(user_id = %user_id, message = %message, "Direct message");
        Ok(())
    }

    async fn publish_user_event(
        &self,
        user_id: &UserId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), ChatError> {
        info!(user_id = %user_id, event = %event, payload = %payload, "User event");
        Ok(())
    }
}

/// Cluster relay for a single instance: there is nobody to tell
#[derive(Debug, Clone, Default)]
pub struct SingleNodeNotifier;

#[async_trait]
impl ClusterNotifier for SingleNodeNotifier {
    async fn send_oauth_complete(&self, event: &OAuthCompleteEvent) -> Result<(), ChatError> {
        debug!(user_id = %event.user_id, "OAuth completion stays local");
        Ok(())
    }
}

#[cfg(test)]
#[path = "chat_poster_tests.rs"]
mod tests;
