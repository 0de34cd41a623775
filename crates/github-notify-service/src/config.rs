//! Configuration types for the HTTP service
//!
//! Sources, later ones overriding earlier ones:
//!
//! 1. `/etc/github-notify/service.yaml`
//! 2. `./config/service.yaml`
//! 3. The file named by `GN_CONFIG_FILE` (must exist when set)
//! 4. Environment variables prefixed `GN__`, e.g. `GN__SERVER__PORT=9090`
//!
//! Every field has a default, so an unconfigured environment still yields a
//! usable configuration apart from the webhook secret.

use github_notify_core::NotifyConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::info;

/// Environment variable naming an explicit configuration file
pub const CONFIG_FILE_ENV: &str = "GN_CONFIG_FILE";

/// Prefix of configuration environment variables
pub const ENV_PREFIX: &str = "GN";

/// Service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// HTTP server settings
    pub server: ServerConfig,

    /// Webhook intake settings
    pub webhook: WebhookConfig,

    /// Chat host settings
    pub chat: ChatConfig,

    /// GitHub API settings
    pub github: GitHubApiConfig,

    /// Logging configuration
    pub logging: LoggingConfig,

    /// Notification core settings
    pub notify: NotifyConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Host to bind to
    pub host: String,

    /// Port to listen on
    pub port: u16,

    /// Maximum request size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 25 * 1024 * 1024, // GitHub caps payloads at 25MB
        }
    }
}

/// Webhook intake configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebhookConfig {
    /// Webhook endpoint path
    pub endpoint_path: String,

    /// Shared secret configured on the GitHub webhook
    pub secret: Option<String>,

    /// Reject deliveries without a valid signature
    pub require_signature: bool,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            endpoint_path: "/webhook".to_string(),
            secret: None,
            require_signature: true,
        }
    }
}

impl fmt::Debug for WebhookConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WebhookConfig")
            .field("endpoint_path", &self.endpoint_path)
            .field("secret", &self.secret.as_ref().map(|_| "<REDACTED>"))
            .field("require_signature", &self.require_signature)
            .finish()
    }
}

/// Chat host configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChatConfig {
    /// Incoming-webhook URL posts are sent to; posts are only logged when unset
    pub incoming_webhook_url: Option<String>,

    /// Display name of the bot on posts
    pub bot_username: String,

    /// Token expected on slash command requests
    pub command_token: Option<String>,

    /// GitHub login to chat username
    pub usernames: HashMap<String, String>,

    /// Chat user ID to chat username, used to address direct messages
    pub user_directory: HashMap<String, String>,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            incoming_webhook_url: None,
            bot_username: "github".to_string(),
            command_token: None,
            usernames: HashMap::new(),
            user_directory: HashMap::new(),
        }
    }
}

impl fmt::Debug for ChatConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChatConfig")
            .field("incoming_webhook_url", &self.incoming_webhook_url)
            .field("bot_username", &self.bot_username)
            .field("command_token", &self.command_token.as_ref().map(|_| "<REDACTED>"))
            .field("usernames", &self.usernames.len())
            .field("user_directory", &self.user_directory.len())
            .finish()
    }
}

/// GitHub API configuration
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GitHubApiConfig {
    /// REST API root
    pub api_url: String,

    /// Token used for every API call
    pub token: Option<String>,

    /// Chat user ID to GitHub login; access checks for unmapped users fail
    pub user_logins: HashMap<String, String>,

    /// Public URL of this service's webhook endpoint, matched against
    /// configured repository and organization webhooks
    pub webhook_url: Option<String>,
}

impl Default for GitHubApiConfig {
    fn default() -> Self {
        Self {
            api_url: "https://api.github.com/".to_string(),
            token: None,
            user_logins: HashMap::new(),
            webhook_url: None,
        }
    }
}

impl fmt::Debug for GitHubApiConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GitHubApiConfig")
            .field("api_url", &self.api_url)
            .field("token", &self.token.as_ref().map(|_| "<REDACTED>"))
            .field("user_logins", &self.user_logins.len())
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset
    pub level: String,

    /// Enable JSON structured logging
    pub json_format: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "github_notify_service=info,github_notify_core=info,tower_http=debug".to_string(),
            json_format: false,
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid configuration: {}", .problems.join("; "))]
    Invalid { problems: Vec<String> },
}

impl ServiceConfig {
    /// Load from the standard sources, honouring `GN_CONFIG_FILE`
    pub fn load() -> Result<Self, ConfigError> {
        let explicit = std::env::var(CONFIG_FILE_ENV)
            .ok()
            .filter(|path| !path.is_empty());
        Self::load_from(explicit.as_deref())
    }

    /// Load from the standard sources plus an optional explicit file
    pub fn load_from(explicit_path: Option<&str>) -> Result<Self, ConfigError> {
        let mut builder = config::Config::builder()
            .add_source(
                config::File::with_name("/etc/github-notify/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            )
            .add_source(
                config::File::with_name("config/service")
                    .required(false)
                    .format(config::FileFormat::Yaml),
            );

        if let Some(path) = explicit_path {
            info!(path = %path, "Loading configuration from explicit path");
            builder = builder.add_source(
                config::File::with_name(path)
                    .required(true)
                    .format(config::FileFormat::Yaml),
            );
        }

        let config: Self = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("notify.organizations"),
            )
            .build()?
            .try_deserialize()?;

        config.validate()?;
        Ok(config)
    }

    /// Check every setting, reporting all problems at once
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut problems = Vec::new();

        if self.server.port == 0 {
            problems.push("server.port must be greater than zero".to_string());
        }
        if self.server.max_body_size == 0 {
            problems.push("server.max_body_size must be greater than zero".to_string());
        }

        if !self.webhook.endpoint_path.starts_with('/') {
            problems.push(format!(
                "webhook.endpoint_path '{}' must start with '/'",
                self.webhook.endpoint_path
            ));
        }
        if self.webhook.require_signature && self.webhook_secret().is_none() {
            problems.push("webhook.secret is required when webhook.require_signature is set".to_string());
        }

        if let Some(url) = &self.chat.incoming_webhook_url {
            if let Err(e) = url::Url::parse(url) {
                problems.push(format!("chat.incoming_webhook_url is not a valid URL: {}", e));
            }
        }
        if let Err(e) = url::Url::parse(&self.github.api_url) {
            problems.push(format!("github.api_url is not a valid URL: {}", e));
        }
        if let Some(url) = &self.github.webhook_url {
            if let Err(e) = url::Url::parse(url) {
                problems.push(format!("github.webhook_url is not a valid URL: {}", e));
            }
        }

        if let Err(e) = self.notify.validate() {
            match e {
                github_notify_core::config::ConfigError::Invalid { problems: notify } => {
                    problems.extend(notify.into_iter().map(|p| format!("notify: {}", p)))
                }
                other => problems.push(format!("notify: {}", other)),
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Invalid { problems })
        }
    }

    /// The webhook secret, ignoring an empty value
    pub fn webhook_secret(&self) -> Option<&str> {
        self.webhook.secret.as_deref().filter(|s| !s.is_empty())
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
