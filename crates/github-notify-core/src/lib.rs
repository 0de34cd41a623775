//! # GitHub Notify Core
//!
//! Core business logic for turning GitHub webhook deliveries into chat channel
//! notifications.
//!
//! This crate contains the domain logic for normalizing webhook payloads,
//! matching them against channel subscriptions, gating each delivery so it is
//! processed at most once across a cluster, and rendering the resulting posts.
//!
//! ## Architecture
//!
//! - Business logic depends only on trait abstractions ([`kv::KvStore`],
//!   [`github::GitHubClient`], [`chat::ChatPoster`], [`chat::UsernameResolver`])
//! - Infrastructure implementations are injected at runtime
//! - Filtering and rendering are pure functions of their inputs
//!
//! ## Usage
//!
//! ```rust
//! use github_notify_core::{ChannelId, RepositoryKey};
//!
//! let key = RepositoryKey::from_full_name("Acme/Widgets").unwrap();
//! assert_eq!(key.as_str(), "acme/widgets");
//! assert_eq!(key.org_key().as_str(), "acme");
//!
//! let channel = ChannelId::new("town-square").unwrap();
//! assert_eq!(channel.as_str(), "town-square");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// Standard result type for notification core operations
pub type NotifyResult<T> = Result<T, NotifyError>;

// ============================================================================
// Domain Identifier Types
// ============================================================================

/// Opaque chat channel identifier, the destination of a notification
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChannelId(String);

impl ChannelId {
    /// Create new channel ID with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "channel_id".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque chat user identifier
///
/// Used as the creator of a subscription (for private repository permission
/// checks) and as the key of OAuth completion waiters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(String);

impl UserId {
    /// Create new user ID with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "user_id".to_string(),
            });
        }
        Ok(Self(value))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique key identifying one inbound webhook call
///
/// Normally the `X-GitHub-Delivery` header. When the header is missing the key
/// is derived from the SHA-256 digest of the raw body so that byte-identical
/// redeliveries still collapse onto one key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeliveryId(String);

impl DeliveryId {
    /// Create new delivery ID with validation
    pub fn new(value: impl Into<String>) -> Result<Self, ValidationError> {
        let value = value.into();
        if value.is_empty() {
            return Err(ValidationError::Required {
                field: "delivery_id".to_string(),
            });
        }

        if value.len() > 128 {
            return Err(ValidationError::TooLong {
                field: "delivery_id".to_string(),
                max_length: 128,
            });
        }

        if !value.chars().all(|c| c.is_ascii_graphic()) {
            return Err(ValidationError::InvalidCharacters {
                field: "delivery_id".to_string(),
                invalid_chars: "non-ASCII or whitespace".to_string(),
            });
        }

        Ok(Self(value))
    }

    /// Derive an idempotency key from the raw payload bytes
    pub fn from_payload(body: &[u8]) -> Self {
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(body);
        Self(format!("body-{}", hex::encode(digest)))
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeliveryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DeliveryId {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s.to_string())
    }
}

/// Normalized subscription key: `owner` (org-wide) or `owner/repo`
///
/// Always lowercase. Lookups for a repository event consult both the
/// repository key and its [`org_key`](Self::org_key).
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryKey(String);

impl RepositoryKey {
    /// Build a key from owner and optional repository name
    ///
    /// An empty `repo` produces an org-wide key.
    pub fn new(owner: &str, repo: &str) -> Result<Self, ValidationError> {
        let owner = owner.trim().to_lowercase();
        let repo = repo.trim().to_lowercase();

        Self::validate_segment("owner", &owner)?;
        if owner.is_empty() {
            return Err(ValidationError::Required {
                field: "owner".to_string(),
            });
        }

        if repo.is_empty() {
            return Ok(Self(owner));
        }

        Self::validate_segment("repository", &repo)?;
        Ok(Self(format!("{}/{}", owner, repo)))
    }

    /// Build an org-wide key
    pub fn org(owner: &str) -> Result<Self, ValidationError> {
        Self::new(owner, "")
    }

    /// Parse `owner` or `owner/repo`, case-folding to lowercase
    pub fn from_full_name(full_name: &str) -> Result<Self, ValidationError> {
        let trimmed = full_name.trim().trim_matches('/');
        match trimmed.split_once('/') {
            Some((owner, repo)) => Self::new(owner, repo),
            None => Self::new(trimmed, ""),
        }
    }

    fn validate_segment(field: &str, segment: &str) -> Result<(), ValidationError> {
        if segment.contains('/') {
            return Err(ValidationError::InvalidFormat {
                field: field.to_string(),
                message: "must not contain '/'".to_string(),
            });
        }

        if segment.chars().any(char::is_whitespace) {
            return Err(ValidationError::InvalidCharacters {
                field: field.to_string(),
                invalid_chars: "whitespace".to_string(),
            });
        }

        Ok(())
    }

    /// True when the key names an organization rather than a repository
    pub fn is_org_wide(&self) -> bool {
        !self.0.contains('/')
    }

    /// Owner (organization or user) segment
    pub fn owner(&self) -> &str {
        self.0.split('/').next().unwrap_or(&self.0)
    }

    /// Repository segment, if any
    pub fn repo(&self) -> Option<&str> {
        self.0.split_once('/').map(|(_, repo)| repo)
    }

    /// The org-wide key covering this key
    pub fn org_key(&self) -> RepositoryKey {
        Self(self.owner().to_string())
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for RepositoryKey {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_full_name(s)
    }
}

// ============================================================================
// Error Types
// ============================================================================

/// High-level error categorization for retry and alerting decisions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCategory {
    /// Temporary failures that may succeed on a later event
    Transient,
    /// Permanent failures that won't succeed on retry
    Permanent,
    /// Authorization failures (revoked access, membership check refused)
    Authorization,
    /// Configuration errors (organization lock, unsupported settings)
    Configuration,
}

/// Configuration for retry behavior
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub backoff_multiplier: f64,
    pub jitter_enabled: bool,
}

impl RetryPolicy {
    /// Create exponential backoff retry policy
    pub fn exponential() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(500),
            backoff_multiplier: 2.0,
            jitter_enabled: true,
        }
    }

    /// Create policy with the given attempt budget and no delay between attempts
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            backoff_multiplier: 1.0,
            jitter_enabled: false,
        }
    }

    /// Return a copy with a different attempt budget
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Calculate delay for specific attempt number
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }

        let mut delay = self.base_delay.as_millis() as f64;

        for _ in 1..attempt {
            delay *= self.backoff_multiplier;
        }

        if self.jitter_enabled {
            // ±25% jitter
            let jitter_factor: f64 = rand::random_range(0.75..=1.25);
            delay *= jitter_factor;
        }

        let delay_ms = delay.min(self.max_delay.as_millis() as f64) as u64;
        Duration::from_millis(delay_ms)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::exponential()
    }
}

/// Error type for input validation failures
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error, Serialize, Deserialize)]
pub enum ValidationError {
    #[error("Field '{field}' is required")]
    Required { field: String },

    #[error("Field '{field}' has invalid format: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Field '{field}' exceeds maximum length of {max_length}")]
    TooLong { field: String, max_length: usize },

    #[error("Field '{field}' contains invalid characters: {invalid_chars}")]
    InvalidCharacters {
        field: String,
        invalid_chars: String,
    },
}

/// Top-level error type for notification core operations
#[derive(Debug, thiserror::Error)]
pub enum NotifyError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Storage error: {0}")]
    Storage(#[from] kv::KvError),

    #[error("Subscription error: {0}")]
    Subscription(#[from] subscriptions::SubscriptionError),

    #[error("GitHub error: {0}")]
    GitHub(#[from] github::GitHubError),

    #[error("Chat error: {0}")]
    Chat(#[from] chat::ChatError),

    #[error("Configuration error: {message}")]
    Configuration { message: String },
}

impl NotifyError {
    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Validation(_) => false,
            Self::Storage(e) => e.is_transient(),
            Self::Subscription(e) => e.is_transient(),
            Self::GitHub(e) => e.is_transient(),
            Self::Chat(e) => e.is_transient(),
            Self::Configuration { .. } => false,
        }
    }

    /// Get error category for monitoring and alerting
    pub fn error_category(&self) -> ErrorCategory {
        match self {
            Self::Validation(_) => ErrorCategory::Permanent,
            Self::Configuration { .. } => ErrorCategory::Configuration,
            Self::GitHub(e) if e.is_authorization() => ErrorCategory::Authorization,
            other if other.is_transient() => ErrorCategory::Transient,
            _ => ErrorCategory::Permanent,
        }
    }
}

// ============================================================================
// Module declarations
// ============================================================================

/// Key-value persistence contract and helpers
pub mod kv;

/// Infrastructure adapters
pub mod adapters;

/// Channel subscriptions and their durable store
pub mod subscriptions;

/// Pure feature/flag filter
pub mod filter;

/// Webhook request types and event normalization
pub mod webhook;

/// Subscription matching for normalized events
pub mod matcher;

/// Delivery deduplication, fan-out and waiter brokers
pub mod broker;

/// Notification rendering
pub mod render;

/// Subscription slash-command parsing and service
pub mod commands;

/// GitHub collaborator contract
pub mod github;

/// Chat collaborator contracts
pub mod chat;

/// Core configuration
pub mod config;

/// End-to-end delivery pipeline
pub mod pipeline;

#[cfg(test)]
mod test_support;

// Re-export key types for convenience
pub use adapters::InMemoryKvStore;
pub use broker::{
    Admission, ClusterLease, DeliveryBroker, DeliveryReport, DeliveryState, LeaseGuard,
    OAuthBroker, PingBroker,
};
pub use chat::{ChatError, ChatPoster, UsernameResolver};
pub use commands::{parse_command, CommandError, CommandInvocation, SubscriptionService};
pub use config::NotifyConfig;
pub use github::{GitHubClient, GitHubError};
pub use kv::{KvError, KvStore, KvStoreExt, SetOptions};
pub use matcher::{ChannelTarget, SubscriptionMatcher};
pub use pipeline::{DeliveryOutcome, NotificationPipeline, PipelineError};
pub use render::{RenderContext, RenderStyle, Renderer};
pub use subscriptions::{
    features::{Feature, FeatureError, Features},
    Subscription, SubscriptionError, SubscriptionFlags, SubscriptionStore, Subscriptions,
};
pub use webhook::{EventKind, NormalizationError, NormalizedEvent, WebhookRequest};

#[cfg(test)]
#[path = "lib_tests.rs"]
mod tests;
