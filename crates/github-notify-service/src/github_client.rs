//! REST-backed [`GitHubClient`].
//!
//! Every call is made with the service's configured token. Per-user OAuth
//! tokens are out of scope for this service, so repository access for a chat
//! user is decided by the collaborator permission of the GitHub login that
//! user is mapped to. A chat user without a mapped login has no access.

use async_trait::async_trait;
use github_notify_core::{
    github::{GitHubClient, GitHubError, RepositoryInfo},
    UserId,
};
use reqwest::StatusCode;
use serde::Deserialize;
use std::collections::HashMap;
use std::time::Duration;
use tracing::{debug, instrument, warn};
use url::Url;

const USER_AGENT: &str = concat!("github-notify-service/", env!("CARGO_PKG_VERSION"));
const HOOKS_PER_PAGE: usize = 100;
const MAX_HOOK_PAGES: u32 = 10;

#[derive(Debug, Deserialize)]
struct RepositoryResponse {
    full_name: String,
    #[serde(default)]
    private: bool,
    #[serde(default)]
    html_url: String,
}

#[derive(Debug, Deserialize)]
struct PermissionResponse {
    permission: String,
}

#[derive(Debug, Deserialize)]
struct HookResponse {
    #[serde(default)]
    config: HookConfig,
}

#[derive(Debug, Default, Deserialize)]
struct HookConfig {
    url: Option<String>,
}

/// GitHub REST API client
#[derive(Clone)]
pub struct RestGitHubClient {
    http: reqwest::Client,
    api_url: Url,
    token: Option<String>,
    /// Chat user ID to GitHub login
    user_logins: HashMap<String, String>,
    /// Delivery URL a webhook must point at to count as configured
    webhook_url: Option<String>,
}

impl RestGitHubClient {
    pub fn new(api_url: &str, token: Option<String>, timeout: Duration) -> Result<Self, GitHubError> {
        let normalized = if api_url.ends_with('/') {
            api_url.to_string()
        } else {
            format!("{}/", api_url)
        };
        let api_url = Url::parse(&normalized).map_err(|e| GitHubError::Transient {
            message: format!("invalid API URL '{}': {}", api_url, e),
        })?;

        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| GitHubError::Transient {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            api_url,
            token: token.filter(|t| !t.is_empty()),
            user_logins: HashMap::new(),
            webhook_url: None,
        })
    }

    /// Map chat user IDs to the GitHub logins whose access they carry
    pub fn with_user_logins(mut self, user_logins: HashMap<String, String>) -> Self {
        self.user_logins = user_logins;
        self
    }

    /// Only count webhooks whose URL contains `url`; any webhook counts when unset
    pub fn with_webhook_url(mut self, url: Option<String>) -> Self {
        self.webhook_url = url.filter(|u| !u.is_empty());
        self
    }

    fn is_own_hook(&self, hook: &HookResponse) -> bool {
        match (&self.webhook_url, &hook.config.url) {
            (None, _) => true,
            (Some(expected), Some(url)) => url.contains(expected.as_str()),
            (Some(_), None) => false,
        }
    }

    async fn get(&self, path: &str) -> Result<reqwest::Response, GitHubError> {
        let url = self.api_url.join(path).map_err(|e| GitHubError::Transient {
            message: format!("invalid request path '{}': {}", path, e),
        })?;

        let mut request = self
            .http
            .get(url)
            .header("Accept", "application/vnd.github+json")
            .header("X-GitHub-Api-Version", "2022-11-28");
        if let Some(token) = &self.token {
            request = request.header("Authorization", format!("Bearer {}", token));
        }

        request.send().await.map_err(|e| GitHubError::Transient {
            message: format!("HTTP request failed: {}", e),
        })
    }

    /// Map a response status to presence, or to an error for anything unexpected
    async fn exists(&self, path: &str) -> Result<bool, GitHubError> {
        let response = self.get(path).await?;
        match response.status() {
            status if status.is_success() => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(response).await),
        }
    }
}

async fn status_error(response: reqwest::Response) -> GitHubError {
    let status = response.status();
    let message = response
        .text()
        .await
        .unwrap_or_else(|_| "Unable to read error body".to_string());

    match status.as_u16() {
        404 => GitHubError::NotFound { message },
        401 => GitHubError::Unauthorized { message },
        403 => GitHubError::Forbidden { message },
        _ => GitHubError::Transient {
            message: format!("API request failed with status {}: {}", status, message),
        },
    }
}

#[async_trait]
impl GitHubClient for RestGitHubClient {
    #[instrument(skip(self), fields(user_id = %user))]
    async fn has_repository_access(&self, user: &UserId, full_name: &str) -> Result<bool, GitHubError> {
        let Some(login) = self.user_logins.get(user.as_str()) else {
            warn!("No GitHub login mapped for chat user, treating as no access");
            return Ok(false);
        };

        let response = self
            .get(&format!("repos/{}/collaborators/{}/permission", full_name, login))
            .await?;
        match response.status() {
            status if status.is_success() => {
                let body: PermissionResponse = response.json().await.map_err(|e| GitHubError::Transient {
                    message: format!("Failed to parse permission response: {}", e),
                })?;
                let readable = !body.permission.is_empty() && body.permission != "none";
                debug!(login = %login, permission = %body.permission, readable, "Collaborator permission checked");
                Ok(readable)
            }
            StatusCode::NOT_FOUND => Ok(false),
            _ => Err(status_error(response).await),
        }
    }

    #[instrument(skip(self))]
    async fn is_organization_member(&self, organization: &str, login: &str) -> Result<bool, GitHubError> {
        // 204 for members; non-members get 404, possibly via the public list redirect
        let member = self
            .exists(&format!("orgs/{}/members/{}", organization, login))
            .await?;
        debug!(member, "Organization membership checked");
        Ok(member)
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn repository(&self, user: &UserId, owner: &str, repo: &str) -> Result<RepositoryInfo, GitHubError> {
        let response = self.get(&format!("repos/{}/{}", owner, repo)).await?;
        if !response.status().is_success() {
            return Err(status_error(response).await);
        }

        let body: RepositoryResponse = response.json().await.map_err(|e| GitHubError::Transient {
            message: format!("Failed to parse repository response: {}", e),
        })?;

        Ok(RepositoryInfo {
            full_name: body.full_name,
            private: body.private,
            html_url: body.html_url,
        })
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn owner_exists(&self, user: &UserId, owner: &str) -> Result<bool, GitHubError> {
        self.exists(&format!("users/{}", owner)).await
    }

    #[instrument(skip(self), fields(user_id = %user))]
    async fn webhook_exists(&self, user: &UserId, owner: &str, repo: Option<&str>) -> Result<bool, GitHubError> {
        let base = match repo {
            Some(repo) => format!("repos/{}/{}/hooks", owner, repo),
            None => format!("orgs/{}/hooks", owner),
        };

        for page in 1..=MAX_HOOK_PAGES {
            let response = self
                .get(&format!("{}?per_page={}&page={}", base, HOOKS_PER_PAGE, page))
                .await?;
            if !response.status().is_success() {
                return Err(status_error(response).await);
            }

            let hooks: Vec<HookResponse> = response.json().await.map_err(|e| GitHubError::Transient {
                message: format!("Failed to parse webhook list: {}", e),
            })?;
            if hooks.iter().any(|hook| self.is_own_hook(hook)) {
                return Ok(true);
            }
            if hooks.len() < HOOKS_PER_PAGE {
                break;
            }
        }

        debug!("No webhook delivering to this service");
        Ok(false)
    }
}

#[cfg(test)]
#[path = "github_client_tests.rs"]
mod tests;
