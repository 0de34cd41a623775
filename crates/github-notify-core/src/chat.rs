//! # Chat Collaborator Contracts
//!
//! Outbound side of the pipeline: posting into channels as the bot,
//! direct-messaging users, broadcasting real-time events, and mapping GitHub
//! logins onto chat usernames for mentions.

use crate::{
    kv::{KvError, KvStore},
    ChannelId, UserId,
};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::warn;

/// Suffix of the KV key mapping a GitHub login to a chat user ID
pub const GITHUB_USERNAME_KEY_SUFFIX: &str = "_githubusername";

/// Errors from the chat host
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChatError {
    #[error("Chat post rejected: {message}")]
    Rejected { message: String },

    #[error("Chat host unavailable: {message}")]
    Unavailable { message: String },

    #[error("Chat call timed out")]
    Timeout,
}

impl ChatError {
    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Unavailable { .. } | Self::Timeout)
    }
}

/// Outbound post sink
#[async_trait]
pub trait ChatPoster: Send + Sync {
    /// Post `message` in a channel as the bot
    async fn create_post(&self, channel_id: &ChannelId, message: &str) -> Result<(), ChatError>;

    /// Send the bot's direct message to a user
    async fn direct_message(&self, user_id: &UserId, message: &str) -> Result<(), ChatError>;

    /// Broadcast a real-time event to a user's connected sessions
    async fn publish_user_event(
        &self,
        user_id: &UserId,
        event: &str,
        payload: serde_json::Value,
    ) -> Result<(), ChatError>;
}

/// Maps GitHub logins onto chat usernames
#[async_trait]
pub trait UsernameResolver: Send + Sync {
    /// Chat username of the user connected as `github_login`, if any
    async fn chat_username(&self, github_login: &str) -> Option<String>;
}

/// Chat user lookup used by [`KvUsernameResolver`]
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn username(&self, user_id: &UserId) -> Result<Option<String>, ChatError>;
}

/// Resolves logins through the `<login>_githubusername` mapping written when
/// a user connects their account
pub struct KvUsernameResolver {
    kv: Arc<dyn KvStore>,
    directory: Arc<dyn UserDirectory>,
}

impl KvUsernameResolver {
    pub fn new(kv: Arc<dyn KvStore>, directory: Arc<dyn UserDirectory>) -> Self {
        Self { kv, directory }
    }

    async fn mapped_user(&self, github_login: &str) -> Result<Option<UserId>, KvError> {
        let key = format!("{}{}", github_login, GITHUB_USERNAME_KEY_SUFFIX);
        let Some(bytes) = self.kv.get(&key).await? else {
            return Ok(None);
        };

        Ok(String::from_utf8(bytes)
            .ok()
            .and_then(|id| UserId::new(id).ok()))
    }
}

#[async_trait]
impl UsernameResolver for KvUsernameResolver {
    async fn chat_username(&self, github_login: &str) -> Option<String> {
        let user_id = match self.mapped_user(github_login).await {
            Ok(Some(user_id)) => user_id,
            Ok(None) => return None,
            Err(e) => {
                warn!(github_login = %github_login, error = %e, "Failed to read username mapping");
                return None;
            }
        };

        match self.directory.username(&user_id).await {
            Ok(username) => username,
            Err(e) => {
                warn!(user_id = %user_id, error = %e, "Failed to look up chat user");
                None
            }
        }
    }
}

/// Fixed login-to-username table
#[derive(Debug, Clone, Default)]
pub struct StaticUsernameResolver {
    usernames: HashMap<String, String>,
}

impl StaticUsernameResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a mapping
    pub fn with_mapping(mut self, github_login: &str, chat_username: &str) -> Self {
        self.usernames
            .insert(github_login.to_lowercase(), chat_username.to_string());
        self
    }
}

#[async_trait]
impl UsernameResolver for StaticUsernameResolver {
    async fn chat_username(&self, github_login: &str) -> Option<String> {
        self.usernames.get(&github_login.to_lowercase()).cloned()
    }
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
