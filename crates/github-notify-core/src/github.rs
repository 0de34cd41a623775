//! # GitHub Collaborator Contract
//!
//! The subset of GitHub API operations the delivery core and the subscription
//! commands rely on. Authentication, pagination and token refresh belong to
//! the implementation.

use crate::UserId;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

/// Errors from the GitHub collaborator
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum GitHubError {
    #[error("Not found: {message}")]
    NotFound { message: String },

    #[error("Unauthorized: {message}")]
    Unauthorized { message: String },

    #[error("Forbidden: {message}")]
    Forbidden { message: String },

    #[error("Transient GitHub failure: {message}")]
    Transient { message: String },

    #[error("GitHub request timed out after {timeout:?}")]
    Timeout { timeout: Duration },
}

impl GitHubError {
    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. } | Self::Timeout { .. })
    }

    /// Access was refused rather than failing
    pub fn is_authorization(&self) -> bool {
        matches!(self, Self::Unauthorized { .. } | Self::Forbidden { .. })
    }
}

/// Repository metadata needed by subscription commands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryInfo {
    pub full_name: String,
    pub private: bool,
    pub html_url: String,
}

/// Interface to the GitHub API
#[async_trait]
pub trait GitHubClient: Send + Sync {
    /// Whether the chat user's connected GitHub account can read the repository
    async fn has_repository_access(
        &self,
        user: &UserId,
        full_name: &str,
    ) -> Result<bool, GitHubError>;

    /// Whether `login` is a member of `organization`
    async fn is_organization_member(
        &self,
        organization: &str,
        login: &str,
    ) -> Result<bool, GitHubError>;

    /// Look up a repository as seen by the chat user
    async fn repository(
        &self,
        user: &UserId,
        owner: &str,
        repo: &str,
    ) -> Result<RepositoryInfo, GitHubError>;

    /// Whether an organization or user account named `owner` exists
    async fn owner_exists(&self, user: &UserId, owner: &str) -> Result<bool, GitHubError>;

    /// Whether the repository, or the organization when `repo` is `None`,
    /// has a webhook delivering to this service
    async fn webhook_exists(
        &self,
        user: &UserId,
        owner: &str,
        repo: Option<&str>,
    ) -> Result<bool, GitHubError>;
}

/// Run a GitHub call with a deadline, mapping expiry to [`GitHubError::Timeout`]
pub async fn with_deadline<T, F>(timeout: Duration, call: F) -> Result<T, GitHubError>
where
    F: Future<Output = Result<T, GitHubError>>,
{
    tokio::time::timeout(timeout, call)
        .await
        .map_err(|_| GitHubError::Timeout { timeout })?
}
