//! # Delivery Broker
//!
//! Gates each webhook delivery so its notifications are posted by at most one
//! instance in the cluster, then fans the rendered posts out to the chat sink.
//!
//! Per delivery the state moves `Unseen → Locked → Done`:
//!
//! - `Unseen → Locked`: [`DeliveryBroker::begin`] takes the
//!   `webhook_lock_<id>` lease. A held lease means another instance is on it.
//!   The lease is renewed every half TTL while the permit lives; once a
//!   renewal fails no further posts are made for the delivery.
//! - `Locked → Done`: [`DeliveryBroker::complete`] writes the
//!   `webhook_done_<id>` marker and releases the lease, whether or not the
//!   posts succeeded. The marker expires after its TTL.
//!
//! A storage error while taking the lease skips the delivery rather than risk
//! a double post.
//!
//! The OAuth-completion and ping brokers in [`waiters`] are in-process
//! fan-out helpers unrelated to delivery dedup.

use crate::{
    chat::{ChatError, ChatPoster},
    config::NotifyConfig,
    kv::{KvError, KvStore, KvStoreExt, SetOptions},
    ChannelId, DeliveryId,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};

pub mod lease;
pub mod waiters;

pub use lease::{ClusterLease, LeaseGuard, LeaseKeepAlive};
pub use waiters::{ClusterNotifier, OAuthBroker, OAuthCompleteEvent, OAuthOutcome, PingBroker, PingNotice};

const LOCK_KEY_PREFIX: &str = "webhook_lock_";
const DONE_KEY_PREFIX: &str = "webhook_done_";
const LEASE_LOST: &str = "delivery lease lost";

fn lock_key(delivery_id: &DeliveryId) -> String {
    format!("{}{}", LOCK_KEY_PREFIX, delivery_id)
}

fn done_key(delivery_id: &DeliveryId) -> String {
    format!("{}{}", DONE_KEY_PREFIX, delivery_id)
}

// ============================================================================
// Types
// ============================================================================

/// Dedup state of one delivery
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryState {
    Unseen,
    Locked,
    Done,
}

/// Exclusive right to deliver one webhook
#[derive(Debug)]
pub struct DeliveryPermit {
    delivery_id: DeliveryId,
    guard: LeaseGuard,
    keep_alive: LeaseKeepAlive,
}

impl DeliveryPermit {
    pub fn delivery_id(&self) -> &DeliveryId {
        &self.delivery_id
    }

    /// Whether the lease could not be renewed and another instance may own
    /// the delivery
    pub fn is_lost(&self) -> bool {
        self.keep_alive.is_lost()
    }
}

/// Answer to [`DeliveryBroker::begin`]
#[derive(Debug)]
pub enum Admission {
    /// This instance owns the delivery
    Granted(DeliveryPermit),
    /// The delivery was already completed
    AlreadyDone,
    /// Another instance holds the lease
    AlreadyProcessing,
    /// Exclusivity could not be confirmed because storage failed
    Unconfirmed,
}

impl Admission {
    pub fn is_granted(&self) -> bool {
        matches!(self, Self::Granted(_))
    }
}

/// A rendered post bound for one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub channel_id: ChannelId,
    pub message: String,
}

/// Failed post to one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FailedPost {
    pub channel_id: ChannelId,
    pub error: String,
    pub is_transient: bool,
}

/// Result of fanning one delivery out
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivery_id: DeliveryId,
    pub successful: Vec<ChannelId>,
    pub failed: Vec<FailedPost>,
}

impl DeliveryReport {
    pub fn new(delivery_id: DeliveryId) -> Self {
        Self {
            delivery_id,
            successful: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Check if all posts were successful
    pub fn is_complete_success(&self) -> bool {
        self.failed.is_empty()
    }

    /// Check if any posts succeeded
    pub fn has_any_success(&self) -> bool {
        !self.successful.is_empty()
    }

    /// Check if all posts failed
    pub fn is_complete_failure(&self) -> bool {
        self.successful.is_empty() && !self.failed.is_empty()
    }

    /// Check if there was nothing to post
    pub fn is_no_op(&self) -> bool {
        self.successful.is_empty() && self.failed.is_empty()
    }
}

/// Contents of the done marker
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DoneMarker {
    completed_at: DateTime<Utc>,
}

// ============================================================================
// Broker
// ============================================================================

/// At-most-once gate and fan-out for webhook deliveries
#[derive(Clone)]
pub struct DeliveryBroker {
    kv: Arc<dyn KvStore>,
    lease: ClusterLease,
    poster: Arc<dyn ChatPoster>,
    done_ttl: Duration,
    post_timeout: Duration,
}

impl DeliveryBroker {
    pub fn new(kv: Arc<dyn KvStore>, poster: Arc<dyn ChatPoster>, config: &NotifyConfig) -> Self {
        Self {
            lease: ClusterLease::new(kv.clone(), config.lock_ttl()),
            kv,
            poster,
            done_ttl: config.done_ttl(),
            post_timeout: config.request_timeout(),
        }
    }

    /// Try to claim a delivery for this instance
    pub async fn begin(&self, delivery_id: &DeliveryId) -> Admission {
        let done_key = done_key(delivery_id);

        match self.kv.get(&done_key).await {
            Ok(Some(_)) => {
                debug!(delivery_id = %delivery_id, "Delivery already completed");
                return Admission::AlreadyDone;
            }
            Ok(None) => {}
            Err(e) => {
                warn!(delivery_id = %delivery_id, error = %e, "Could not read done marker, skipping delivery");
                return Admission::Unconfirmed;
            }
        }

        let guard = match self.lease.acquire(&lock_key(delivery_id)).await {
            Ok(Some(guard)) => guard,
            Ok(None) => {
                info!(delivery_id = %delivery_id, "Delivery is being processed elsewhere");
                return Admission::AlreadyProcessing;
            }
            Err(e) => {
                warn!(delivery_id = %delivery_id, error = %e, "Could not take delivery lease, skipping delivery");
                return Admission::Unconfirmed;
            }
        };

        // The previous holder may have finished between the first check and
        // the lease acquisition.
        match self.kv.get(&done_key).await {
            Ok(None) => Admission::Granted(DeliveryPermit {
                delivery_id: delivery_id.clone(),
                keep_alive: self.lease.keep_alive(&guard),
                guard,
            }),
            Ok(Some(_)) => {
                self.release(guard).await;
                Admission::AlreadyDone
            }
            Err(e) => {
                warn!(delivery_id = %delivery_id, error = %e, "Could not re-read done marker, skipping delivery");
                self.release(guard).await;
                Admission::Unconfirmed
            }
        }
    }

    /// Post every notification once, each under the post deadline
    ///
    /// Failures are recorded, never retried. Once the lease is lost the
    /// remaining notifications are recorded as failed without posting.
    pub async fn fan_out(
        &self,
        permit: &DeliveryPermit,
        notifications: Vec<Notification>,
    ) -> DeliveryReport {
        let mut report = DeliveryReport::new(permit.delivery_id.clone());

        for notification in notifications {
            if permit.is_lost() {
                warn!(
                    delivery_id = %permit.delivery_id,
                    channel_id = %notification.channel_id,
                    "Delivery lease lost, not posting"
                );
                report.failed.push(FailedPost {
                    channel_id: notification.channel_id,
                    error: LEASE_LOST.to_string(),
                    is_transient: false,
                });
                continue;
            }

            let result = tokio::time::timeout(
                self.post_timeout,
                self.poster
                    .create_post(&notification.channel_id, &notification.message),
            )
            .await
            .unwrap_or(Err(ChatError::Timeout));

            match result {
                Ok(()) => {
                    debug!(
                        delivery_id = %permit.delivery_id,
                        channel_id = %notification.channel_id,
                        "Posted notification"
                    );
                    report.successful.push(notification.channel_id);
                }
                Err(e) => {
                    warn!(
                        delivery_id = %permit.delivery_id,
                        channel_id = %notification.channel_id,
                        error = %e,
                        "Failed to post notification"
                    );
                    report.failed.push(FailedPost {
                        channel_id: notification.channel_id,
                        is_transient: e.is_transient(),
                        error: e.to_string(),
                    });
                }
            }
        }

        report
    }

    /// Mark the delivery done and release its lease
    pub async fn complete(&self, permit: DeliveryPermit) -> Result<(), KvError> {
        let DeliveryPermit {
            delivery_id,
            guard,
            keep_alive,
        } = permit;
        keep_alive.stop();

        let marker = DoneMarker {
            completed_at: Utc::now(),
        };

        let written = self
            .kv
            .set_json(
                &done_key(&delivery_id),
                &marker,
                SetOptions::new().expire_in(self.done_ttl),
            )
            .await;

        self.release(guard).await;

        if let Err(e) = &written {
            error!(delivery_id = %delivery_id, error = %e, "Failed to write done marker");
        }
        written.map(|_| ())
    }

    /// Current dedup state of a delivery
    pub async fn state(&self, delivery_id: &DeliveryId) -> Result<DeliveryState, KvError> {
        if self.kv.get(&done_key(delivery_id)).await?.is_some() {
            return Ok(DeliveryState::Done);
        }

        if self.lease.is_held(&lock_key(delivery_id)).await? {
            return Ok(DeliveryState::Locked);
        }

        Ok(DeliveryState::Unseen)
    }

    async fn release(&self, guard: LeaseGuard) {
        let key = guard.key().to_string();
        if let Err(e) = self.lease.release(guard).await {
            warn!(key = %key, error = %e, "Failed to release delivery lease; it will expire");
        }
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
