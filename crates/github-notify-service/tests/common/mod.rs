//! Common test utilities for github-notify-service integration tests
//!
//! This module provides:
//! - Test doubles for the chat host and GitHub collaborators
//! - An application state wired on an in-memory store
//! - Request builders for signed webhook deliveries

#![allow(dead_code)]

use async_trait::async_trait;
use axum::body::Body;
use axum::http::Request;
use github_notify_core::{
    broker::{ClusterNotifier, OAuthCompleteEvent},
    github::{GitHubClient, GitHubError, RepositoryInfo},
    ChannelId, ChatError, ChatPoster, Features, InMemoryKvStore, RepositoryKey, Subscription,
    SubscriptionFlags, SubscriptionStore, UserId,
};
use github_notify_service::{config::ServiceConfig, AppState};
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::{Arc, Mutex};

pub const WEBHOOK_SECRET: &str = "integration-secret";
pub const COMMAND_TOKEN: &str = "command-token";

// ============================================================================
// Test Doubles
// ============================================================================

/// Chat poster recording every post
#[derive(Clone, Default)]
pub struct RecordingPoster {
    posts: Arc<Mutex<Vec<(String, String)>>>,
}

impl RecordingPoster {
    pub fn posts(&self) -> Vec<(String, String)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn posted_channels(&self) -> Vec<String> {
        self.posts().into_iter().map(|(channel, _)| channel).collect()
    }
}

#[async_trait]
impl ChatPoster for RecordingPoster {
    async fn create_post(&self, channel_id: &ChannelId, message: &str) -> Result<(), ChatError> {
        self.posts
            .lock()
            .unwrap()
            .push((channel_id.as_str().to_string(), message.to_string()));
        Ok(())
    }

    async fn direct_message(&self, _user_id: &UserId, _message: &str) -> Result<(), ChatError> {
        Ok(())
    }

    async fn publish_user_event(
        &self,
        _user_id: &UserId,
        _event: &str,
        _payload: serde_json::Value,
    ) -> Result<(), ChatError> {
        Ok(())
    }
}

/// GitHub where every repository is public and readable
#[derive(Clone, Default)]
pub struct OpenGitHub;

#[async_trait]
impl GitHubClient for OpenGitHub {
    async fn has_repository_access(&self, _user: &UserId, _full_name: &str) -> Result<bool, GitHubError> {
        Ok(true)
    }

    async fn is_organization_member(&self, _organization: &str, _login: &str) -> Result<bool, GitHubError> {
        Ok(false)
    }

    async fn repository(&self, _user: &UserId, owner: &str, repo: &str) -> Result<RepositoryInfo, GitHubError> {
        Ok(RepositoryInfo {
            full_name: format!("{}/{}", owner, repo),
            private: false,
            html_url: format!("https://github.com/{}/{}", owner, repo),
        })
    }

    async fn owner_exists(&self, _user: &UserId, _owner: &str) -> Result<bool, GitHubError> {
        Ok(true)
    }

    async fn webhook_exists(&self, _user: &UserId, _owner: &str, _repo: Option<&str>) -> Result<bool, GitHubError> {
        Ok(true)
    }
}

#[derive(Clone, Default)]
pub struct NullNotifier;

#[async_trait]
impl ClusterNotifier for NullNotifier {
    async fn send_oauth_complete(&self, _event: &OAuthCompleteEvent) -> Result<(), ChatError> {
        Ok(())
    }
}

// ============================================================================
// Application Fixture
// ============================================================================

/// Application state plus handles on its collaborators
pub struct TestApp {
    pub state: AppState,
    pub kv: InMemoryKvStore,
    pub poster: RecordingPoster,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_config(test_config())
    }

    pub fn with_config(config: ServiceConfig) -> Self {
        let kv = InMemoryKvStore::new();
        let poster = RecordingPoster::default();
        let state = AppState::build(
            config,
            Arc::new(kv.clone()),
            Arc::new(OpenGitHub),
            Arc::new(poster.clone()),
            Arc::new(NullNotifier),
        )
        .unwrap();

        Self { state, kv, poster }
    }

    pub fn router(&self) -> axum::Router {
        github_notify_service::create_router(self.state.clone())
    }

    /// Store a subscription directly, bypassing the command surface
    pub async fn subscribe(&self, channel: &str, repository: &str, features: &str) {
        let store = SubscriptionStore::new(Arc::new(self.kv.clone()));
        let key = RepositoryKey::from_full_name(repository).unwrap();
        let subscription = Subscription::new(
            ChannelId::new(channel).unwrap(),
            UserId::new("creator").unwrap(),
            key.clone(),
            Features::new(features),
            SubscriptionFlags::default(),
        );
        store.add(&key, subscription).await.unwrap();
    }
}

pub fn test_config() -> ServiceConfig {
    let mut config = ServiceConfig::default();
    config.webhook.secret = Some(WEBHOOK_SECRET.to_string());
    config.chat.command_token = Some(COMMAND_TOKEN.to_string());
    config
        .chat
        .usernames
        .insert("alice".to_string(), "alice.chat".to_string());
    config
}

// ============================================================================
// Request Builders
// ============================================================================

pub fn sign(body: &[u8]) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(WEBHOOK_SECRET.as_bytes()).unwrap();
    mac.update(body);
    format!("sha256={}", hex::encode(mac.finalize().into_bytes()))
}

/// Signed webhook delivery
pub fn webhook_request(event_type: &str, delivery_id: &str, payload: &serde_json::Value) -> Request<Body> {
    let body = serde_json::to_vec(payload).unwrap();
    Request::builder()
        .method("POST")
        .uri("/webhook")
        .header("content-type", "application/json")
        .header("x-github-event", event_type)
        .header("x-github-delivery", delivery_id)
        .header("x-hub-signature-256", sign(&body))
        .body(Body::from(body))
        .unwrap()
}

pub fn issue_opened_payload() -> serde_json::Value {
    serde_json::json!({
        "action": "opened",
        "issue": {
            "number": 3,
            "title": "Broken gears",
            "body": "They grind",
            "html_url": "https://github.com/Acme/Widgets/issues/3",
            "user": {"login": "alice"}
        },
        "repository": {
            "full_name": "Acme/Widgets",
            "name": "Widgets",
            "owner": {"login": "Acme"},
            "private": false,
            "html_url": "https://github.com/Acme/Widgets"
        },
        "sender": {"login": "alice", "html_url": "https://github.com/alice"}
    })
}

pub async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
