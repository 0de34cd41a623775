//! # Webhook Intake and Normalization
//!
//! Raw GitHub webhook requests and their conversion into typed
//! [`NormalizedEvent`]s. Only the event types that can produce a channel
//! notification are modelled; everything else is reported as
//! [`NormalizationError::UnsupportedEventKind`] and ignored upstream.

use crate::{DeliveryId, ValidationError};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

pub mod events;

pub use events::*;

// ============================================================================
// Request Types
// ============================================================================

/// Raw HTTP request data from a GitHub webhook
#[derive(Debug, Clone)]
pub struct WebhookRequest {
    pub headers: WebhookHeaders,
    pub body: Bytes,
    pub received_at: DateTime<Utc>,
}

impl WebhookRequest {
    /// Create new webhook request
    pub fn new(headers: WebhookHeaders, body: Bytes) -> Self {
        Self {
            headers,
            body,
            received_at: Utc::now(),
        }
    }

    /// Get event type from headers
    pub fn event_type(&self) -> &str {
        &self.headers.event_type
    }

    /// Idempotency key: the delivery header, or a digest of the body
    pub fn delivery_id(&self) -> DeliveryId {
        self.headers
            .delivery_id
            .clone()
            .unwrap_or_else(|| DeliveryId::from_payload(&self.body))
    }

    /// Get the SHA-256 signature header if present
    pub fn signature(&self) -> Option<&str> {
        self.headers.signature.as_deref()
    }
}

/// GitHub-specific HTTP headers used during processing
#[derive(Debug, Clone)]
pub struct WebhookHeaders {
    pub event_type: String,               // X-GitHub-Event
    pub delivery_id: Option<DeliveryId>,  // X-GitHub-Delivery
    pub signature: Option<String>,        // X-Hub-Signature-256
    pub legacy_signature: Option<String>, // X-Hub-Signature
    pub user_agent: Option<String>,       // User-Agent
    pub content_type: String,             // Content-Type
}

impl WebhookHeaders {
    /// Build headers for an event type with everything else defaulted
    pub fn for_event(event_type: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            delivery_id: None,
            signature: None,
            legacy_signature: None,
            user_agent: None,
            content_type: "application/json".to_string(),
        }
    }

    /// Attach a delivery identifier
    pub fn with_delivery_id(mut self, delivery_id: DeliveryId) -> Self {
        self.delivery_id = Some(delivery_id);
        self
    }

    /// Parse headers from an HTTP header map with lowercase names
    pub fn from_http_headers(headers: &HashMap<String, String>) -> Result<Self, ValidationError> {
        let lookup = |name: &str| {
            headers
                .iter()
                .find(|(key, _)| key.eq_ignore_ascii_case(name))
                .map(|(_, value)| value.trim().to_string())
        };

        let event_type = lookup("x-github-event").ok_or_else(|| ValidationError::Required {
            field: "X-GitHub-Event".to_string(),
        })?;

        let delivery_id = lookup("x-github-delivery")
            .filter(|value| !value.is_empty())
            .map(DeliveryId::new)
            .transpose()?;

        let headers = Self {
            event_type,
            delivery_id,
            signature: lookup("x-hub-signature-256"),
            legacy_signature: lookup("x-hub-signature"),
            user_agent: lookup("user-agent"),
            content_type: lookup("content-type").unwrap_or_else(|| "application/json".to_string()),
        };

        headers.validate()?;
        Ok(headers)
    }

    /// Validate header values
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.event_type.is_empty() {
            return Err(ValidationError::Required {
                field: "event_type".to_string(),
            });
        }

        if !self
            .event_type
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(ValidationError::InvalidCharacters {
                field: "event_type".to_string(),
                invalid_chars: "only letters, digits and '_' are allowed".to_string(),
            });
        }

        if !self.content_type.starts_with("application/json") {
            return Err(ValidationError::InvalidFormat {
                field: "content_type".to_string(),
                message: "must be application/json".to_string(),
            });
        }

        Ok(())
    }
}

// ============================================================================
// Normalized Event
// ============================================================================

/// Typed view of one webhook delivery
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedEvent {
    /// Repository the event happened in; absent on some synthetic events
    pub repository: Option<Repository>,

    /// Account that triggered the event
    pub actor: Option<Account>,

    pub kind: EventKind,
}

impl NormalizedEvent {
    /// Webhook event type name, e.g. `pull_request`
    pub fn event_type(&self) -> &'static str {
        self.kind.event_type()
    }

    /// Action of the event, when the event type has one
    pub fn action(&self) -> Option<&str> {
        self.kind.action()
    }

    /// Repository full name as sent by GitHub
    pub fn repository_name(&self) -> Option<&str> {
        self.repository.as_ref().map(|repo| repo.full_name.as_str())
    }

    /// Login of the actor
    pub fn actor_login(&self) -> Option<&str> {
        self.actor
            .as_ref()
            .map(|actor| actor.login.as_str())
            .filter(|login| !login.is_empty())
    }
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    repository: Option<Repository>,
    #[serde(default)]
    sender: Option<Account>,
}

// ============================================================================
// Errors
// ============================================================================

/// Errors during event normalization
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizationError {
    #[error("Unsupported event kind: {event_type}")]
    UnsupportedEventKind { event_type: String },

    #[error("Malformed {event_type} payload: {message}")]
    MalformedPayload { event_type: String, message: String },
}

impl NormalizationError {
    /// Unsupported kinds are expected traffic, not failures
    pub fn is_unsupported(&self) -> bool {
        matches!(self, Self::UnsupportedEventKind { .. })
    }
}

// ============================================================================
// Normalizer
// ============================================================================

/// Parse a raw webhook body into a [`NormalizedEvent`]
pub fn normalize(event_type: &str, body: &[u8]) -> Result<NormalizedEvent, NormalizationError> {
    if !is_supported(event_type) {
        return Err(NormalizationError::UnsupportedEventKind {
            event_type: event_type.to_string(),
        });
    }

    let value: serde_json::Value =
        serde_json::from_slice(body).map_err(|e| malformed(event_type, e))?;

    let kind = match event_type {
        "pull_request" => EventKind::PullRequest(decode(event_type, &value)?),
        "issues" => EventKind::Issues(decode(event_type, &value)?),
        "issue_comment" => EventKind::IssueComment(decode(event_type, &value)?),
        "pull_request_review" => EventKind::PullRequestReview(decode(event_type, &value)?),
        "pull_request_review_comment" => {
            EventKind::PullRequestReviewComment(decode(event_type, &value)?)
        }
        "push" => EventKind::Push(decode(event_type, &value)?),
        "create" => EventKind::Create(decode(event_type, &value)?),
        "delete" => EventKind::Delete(decode(event_type, &value)?),
        "star" => EventKind::Star(decode(event_type, &value)?),
        "release" => EventKind::Release(decode(event_type, &value)?),
        "workflow_job" => EventKind::WorkflowJob(decode(event_type, &value)?),
        "discussion" => EventKind::Discussion(decode(event_type, &value)?),
        "discussion_comment" => EventKind::DiscussionComment(decode(event_type, &value)?),
        "ping" => EventKind::Ping(decode(event_type, &value)?),
        other => {
            return Err(NormalizationError::UnsupportedEventKind {
                event_type: other.to_string(),
            })
        }
    };

    let envelope: Envelope = decode(event_type, &value)?;
    let repository = envelope
        .repository
        .filter(|repo| !repo.full_name.is_empty());

    if repository.is_none() {
        debug!(event_type = %event_type, "Webhook payload carries no repository");
    }

    Ok(NormalizedEvent {
        repository,
        actor: envelope.sender,
        kind,
    })
}

/// True for event types [`normalize`] understands
pub fn is_supported(event_type: &str) -> bool {
    EventKind::SUPPORTED.contains(&event_type)
}

fn decode<T: DeserializeOwned>(
    event_type: &str,
    value: &serde_json::Value,
) -> Result<T, NormalizationError> {
    T::deserialize(value).map_err(|e| malformed(event_type, e))
}

fn malformed(event_type: &str, error: serde_json::Error) -> NormalizationError {
    NormalizationError::MalformedPayload {
        event_type: event_type.to_string(),
        message: error.to_string(),
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
