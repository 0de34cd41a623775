//! In-process waiter brokers.
//!
//! [`OAuthBroker`] lets a connect flow wait for the OAuth callback that may
//! land on any instance of the cluster. [`PingBroker`] hands `ping` webhooks
//! to setup flows waiting for proof that the webhook works.

use crate::{
    chat::{ChatError, ChatPoster},
    UserId,
};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

const OAUTH_TIMEOUT_MESSAGE: &str =
    "Timed out waiting for OAuth connection. Please check if the SiteURL is correct.";

// ============================================================================
// OAuth completion
// ============================================================================

/// OAuth completion relayed between cluster instances
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OAuthCompleteEvent {
    pub user_id: UserId,
    /// Failure description; `None` on success
    pub error: Option<String>,
}

/// Relays OAuth completions to the other instances of the cluster
#[async_trait]
pub trait ClusterNotifier: Send + Sync {
    async fn send_oauth_complete(&self, event: &OAuthCompleteEvent) -> Result<(), ChatError>;
}

/// How an OAuth wait ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OAuthOutcome {
    Connected,
    Failed(String),
    TimedOut,
    /// The broker shut down while waiting
    Closed,
}

/// Registration of one waiter
#[derive(Debug)]
pub struct OAuthSubscription {
    id: u64,
    user_id: UserId,
    receiver: mpsc::Receiver<Result<(), String>>,
}

type Waiters = HashMap<UserId, Vec<(u64, mpsc::Sender<Result<(), String>>)>>;

#[derive(Default)]
struct OAuthState {
    closed: bool,
    waiters: Waiters,
}

/// Per-user OAuth completion waiters
pub struct OAuthBroker {
    state: Mutex<OAuthState>,
    next_id: AtomicU64,
    notifier: Arc<dyn ClusterNotifier>,
    poster: Arc<dyn ChatPoster>,
    wait: Duration,
}

impl OAuthBroker {
    pub fn new(notifier: Arc<dyn ClusterNotifier>, poster: Arc<dyn ChatPoster>, wait: Duration) -> Self {
        Self {
            state: Mutex::new(OAuthState::default()),
            next_id: AtomicU64::new(1),
            notifier,
            poster,
            wait,
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, OAuthState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Register a waiter for `user_id`
    pub fn subscribe(&self, user_id: &UserId) -> OAuthSubscription {
        let (sender, receiver) = mpsc::channel(1);
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);

        let mut state = self.lock();
        if !state.closed {
            state
                .waiters
                .entry(user_id.clone())
                .or_default()
                .push((id, sender));
        }

        OAuthSubscription {
            id,
            user_id: user_id.clone(),
            receiver,
        }
    }

    /// Drop a waiter registration
    pub fn unsubscribe(&self, subscription: &OAuthSubscription) {
        let mut state = self.lock();
        if let Some(waiters) = state.waiters.get_mut(&subscription.user_id) {
            waiters.retain(|(id, _)| *id != subscription.id);
            if waiters.is_empty() {
                state.waiters.remove(&subscription.user_id);
            }
        }
    }

    /// Number of registered waiters for a user
    pub fn waiter_count(&self, user_id: &UserId) -> usize {
        self.lock().waiters.get(user_id).map_or(0, Vec::len)
    }

    /// Wake the user's waiters with the result of their OAuth flow
    ///
    /// A publish that originated on this instance is also relayed to the
    /// rest of the cluster; one that arrived from the cluster is not.
    pub async fn publish(&self, user_id: &UserId, result: Result<(), String>, from_cluster: bool) {
        {
            let state = self.lock();
            if state.closed {
                return;
            }

            for (_, sender) in state.waiters.get(user_id).into_iter().flatten() {
                // A waiter that already holds a result keeps the first one
                let _ = sender.try_send(result.clone());
            }
        }

        if from_cluster {
            return;
        }

        let event = OAuthCompleteEvent {
            user_id: user_id.clone(),
            error: result.err(),
        };
        if let Err(e) = self.notifier.send_oauth_complete(&event).await {
            warn!(user_id = %user_id, error = %e, "Failed to relay OAuth completion to cluster");
        }
    }

    /// Stop accepting publishes and wake every waiter with [`OAuthOutcome::Closed`]
    pub fn close(&self) {
        let mut state = self.lock();
        state.closed = true;
        state.waiters.clear();
    }

    /// Wait for the user's OAuth flow to finish
    pub async fn wait_for_oauth_completion(&self, user_id: &UserId) -> OAuthOutcome {
        let subscription = self.subscribe(user_id);
        self.wait_on(subscription).await
    }

    /// Wait on an existing registration, then unsubscribe it
    ///
    /// Failures and timeouts are reported to the user by direct message.
    pub async fn wait_on(&self, mut subscription: OAuthSubscription) -> OAuthOutcome {
        let outcome = match tokio::time::timeout(self.wait, subscription.receiver.recv()).await {
            Ok(Some(Ok(()))) => OAuthOutcome::Connected,
            Ok(Some(Err(message))) => OAuthOutcome::Failed(message),
            Ok(None) => OAuthOutcome::Closed,
            Err(_) => OAuthOutcome::TimedOut,
        };

        self.unsubscribe(&subscription);

        let message = match &outcome {
            OAuthOutcome::Failed(error) => Some(format!(
                "There was an error connecting to your GitHub: `{}` Please double check your configuration.",
                error
            )),
            OAuthOutcome::TimedOut => Some(OAUTH_TIMEOUT_MESSAGE.to_string()),
            OAuthOutcome::Connected | OAuthOutcome::Closed => None,
        };

        if let Some(message) = message {
            if let Err(e) = self.poster.direct_message(&subscription.user_id, &message).await {
                warn!(user_id = %subscription.user_id, error = %e, "Failed to send OAuth failure message");
            }
        }

        debug!(user_id = %subscription.user_id, outcome = ?outcome, "OAuth wait finished");
        outcome
    }
}

// ============================================================================
// Ping
// ============================================================================

/// A `ping` webhook as seen by setup flows
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PingNotice {
    pub repository: Option<String>,
    pub hook_id: Option<u64>,
    pub zen: String,
}

/// Broadcast of received `ping` webhooks
#[derive(Clone)]
pub struct PingBroker {
    sender: broadcast::Sender<PingNotice>,
}

impl PingBroker {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(16);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PingNotice> {
        self.sender.subscribe()
    }

    /// Hand the ping to every current subscriber; returns how many got it
    pub fn publish(&self, notice: PingNotice) -> usize {
        self.sender.send(notice).unwrap_or(0)
    }
}

impl Default for PingBroker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[path = "waiters_tests.rs"]
mod tests;
