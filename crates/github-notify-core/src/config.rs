//! Configuration for the notification core

use crate::RetryPolicy;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Notification core configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifyConfig {
    /// Organizations this deployment is locked to (empty = unrestricted)
    pub organizations: Vec<String>,

    /// GitHub web URL used to recognise repository links in commands
    pub base_url: String,

    /// Deadline for each GitHub call and chat post
    pub request_timeout_seconds: u64,

    /// How long an OAuth connect flow waits for its callback
    pub oauth_wait_seconds: u64,

    /// Delivery dedup settings
    pub delivery: DeliveryConfig,

    /// Subscription store settings
    pub store: StoreConfig,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            organizations: Vec::new(),
            base_url: "https://github.com/".to_string(),
            request_timeout_seconds: 30,
            oauth_wait_seconds: 45,
            delivery: DeliveryConfig::default(),
            store: StoreConfig::default(),
        }
    }
}

/// Delivery dedup configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    /// Lifetime of the processing lease
    pub lock_ttl_seconds: u64,

    /// Lifetime of the done marker
    pub done_ttl_seconds: u64,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            lock_ttl_seconds: 30,
            done_ttl_seconds: 3600,
        }
    }
}

/// Subscription store configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Attempts for a read-modify-write of the subscription record
    pub max_attempts: u32,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { max_attempts: 5 }
    }
}

/// Configuration problems
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid configuration value for '{field}': {message}")]
    InvalidValue { field: String, message: String },

    #[error("Configuration is invalid: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },
}

impl NotifyConfig {
    /// Create configuration with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the deployment to the given organizations
    pub fn with_organizations<I, S>(mut self, organizations: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.organizations = organizations.into_iter().map(Into::into).collect();
        self
    }

    /// Parse configuration from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|e| ConfigError::InvalidValue {
            field: "notify".to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check every setting, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        for org in &self.organizations {
            if org.trim().is_empty() {
                problems.push("organizations must not contain empty names".to_string());
            } else if org.contains('/') {
                problems.push(format!("organization '{}' must not contain '/'", org));
            }
        }

        if !(self.base_url.starts_with("https://") || self.base_url.starts_with("http://")) {
            problems.push(format!("base_url '{}' must be an http(s) URL", self.base_url));
        }

        if self.request_timeout_seconds == 0 {
            problems.push("request_timeout_seconds must be greater than zero".to_string());
        }

        if self.oauth_wait_seconds == 0 {
            problems.push("oauth_wait_seconds must be greater than zero".to_string());
        }

        if self.delivery.lock_ttl_seconds == 0 {
            problems.push("delivery.lock_ttl_seconds must be greater than zero".to_string());
        }

        if self.delivery.done_ttl_seconds < self.delivery.lock_ttl_seconds {
            problems.push(
                "delivery.done_ttl_seconds must not be shorter than delivery.lock_ttl_seconds"
                    .to_string(),
            );
        }

        if self.store.max_attempts == 0 {
            problems.push("store.max_attempts must be greater than zero".to_string());
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// Configured organizations, trimmed and lowercased
    pub fn normalized_organizations(&self) -> Vec<String> {
        self.organizations
            .iter()
            .map(|org| org.trim().to_lowercase())
            .filter(|org| !org.is_empty())
            .collect()
    }

    /// Base URL with a guaranteed trailing slash
    pub fn normalized_base_url(&self) -> String {
        if self.base_url.ends_with('/') {
            self.base_url.clone()
        } else {
            format!("{}/", self.base_url)
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }

    pub fn oauth_wait(&self) -> Duration {
        Duration::from_secs(self.oauth_wait_seconds)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.delivery.lock_ttl_seconds)
    }

    pub fn done_ttl(&self) -> Duration {
        Duration::from_secs(self.delivery.done_ttl_seconds)
    }

    /// Retry policy for subscription writes
    pub fn store_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::exponential().with_max_attempts(self.store.max_attempts)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
