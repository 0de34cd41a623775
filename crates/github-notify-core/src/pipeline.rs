//! # Notification Pipeline
//!
//! Drives one webhook delivery from raw request to channel posts:
//!
//! 1. Normalize the payload; unsupported kinds are ignored
//! 2. Hand `ping` deliveries to waiting setup flows
//! 3. Claim the delivery through the [`DeliveryBroker`]
//! 4. Match subscriptions, render, and fan out
//! 5. Mark the delivery done
//!
//! A claimed delivery is always completed, even when matching fails, so a
//! redelivery of the same id cannot produce posts later.

use crate::{
    broker::{Admission, DeliveryBroker, DeliveryReport, Notification, PingBroker, PingNotice},
    chat::UsernameResolver,
    matcher::SubscriptionMatcher,
    render::{RenderContext, Renderer},
    webhook::{self, EventKind, NormalizationError, NormalizedEvent, WebhookRequest},
};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// What happened to one delivery
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// Event kind the plugin does not handle
    Ignored { event_type: String },

    /// `ping` handed to this many waiting setup flows
    Ping { listeners: usize },

    /// Already done or being processed elsewhere
    Duplicate,

    /// Admission could not be confirmed; nothing was posted
    Skipped,

    /// Matching failed; the delivery was completed without posts
    Dropped,

    Delivered(DeliveryReport),
}

impl DeliveryOutcome {
    /// Short label for logs and metrics
    pub fn label(&self) -> &'static str {
        match self {
            Self::Ignored { .. } => "ignored",
            Self::Ping { .. } => "ping",
            Self::Duplicate => "duplicate",
            Self::Skipped => "skipped",
            Self::Dropped => "dropped",
            Self::Delivered(_) => "delivered",
        }
    }
}

/// Deliveries the pipeline refuses outright
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PipelineError {
    #[error("Malformed webhook payload: {0}")]
    MalformedPayload(NormalizationError),
}

/// Webhook-to-post pipeline shared by every request handler
#[derive(Clone)]
pub struct NotificationPipeline {
    broker: Arc<DeliveryBroker>,
    matcher: SubscriptionMatcher,
    resolver: Arc<dyn UsernameResolver>,
    ping_broker: PingBroker,
    renderer: Renderer,
}

impl NotificationPipeline {
    pub fn new(
        broker: Arc<DeliveryBroker>,
        matcher: SubscriptionMatcher,
        resolver: Arc<dyn UsernameResolver>,
        ping_broker: PingBroker,
    ) -> Self {
        Self {
            broker,
            matcher,
            resolver,
            ping_broker,
            renderer: Renderer::new(),
        }
    }

    pub fn ping_broker(&self) -> &PingBroker {
        &self.ping_broker
    }

    /// Process one delivery end to end
    #[instrument(skip(self, request), fields(
        event_type = %request.event_type(),
        delivery_id = %request.delivery_id(),
    ))]
    pub async fn handle_delivery(&self, request: &WebhookRequest) -> Result<DeliveryOutcome, PipelineError> {
        let event = match webhook::normalize(request.event_type(), &request.body) {
            Ok(event) => event,
            Err(e) if e.is_unsupported() => {
                debug!("Ignoring unsupported event kind");
                return Ok(DeliveryOutcome::Ignored {
                    event_type: request.event_type().to_string(),
                });
            }
            Err(e) => {
                warn!(error = %e, "Rejecting malformed webhook payload");
                return Err(PipelineError::MalformedPayload(e));
            }
        };

        if let EventKind::Ping(ping) = &event.kind {
            let listeners = self.ping_broker.publish(PingNotice {
                repository: event.repository_name().map(str::to_string),
                hook_id: ping.hook_id,
                zen: ping.zen.clone(),
            });
            info!(listeners, "Webhook ping received");
            return Ok(DeliveryOutcome::Ping { listeners });
        }

        let delivery_id = request.delivery_id();
        let permit = match self.broker.begin(&delivery_id).await {
            Admission::Granted(permit) => permit,
            Admission::AlreadyDone | Admission::AlreadyProcessing => {
                info!("Duplicate delivery, skipping");
                return Ok(DeliveryOutcome::Duplicate);
            }
            Admission::Unconfirmed => {
                warn!("Could not confirm delivery admission, skipping");
                return Ok(DeliveryOutcome::Skipped);
            }
        };

        let outcome = match self.notifications(&event).await {
            Some(notifications) => {
                let report = self.broker.fan_out(&permit, notifications).await;
                info!(
                    posted = report.successful.len(),
                    failed = report.failed.len(),
                    "Delivery fanned out"
                );
                DeliveryOutcome::Delivered(report)
            }
            None => DeliveryOutcome::Dropped,
        };

        if let Err(e) = self.broker.complete(permit).await {
            warn!(delivery_id = %delivery_id, error = %e, "Failed to mark delivery done");
        }

        Ok(outcome)
    }

    /// Rendered posts for every matching channel; `None` when matching failed
    async fn notifications(&self, event: &NormalizedEvent) -> Option<Vec<Notification>> {
        let targets = match self.matcher.match_event(event).await {
            Ok(targets) => targets,
            Err(e) => {
                warn!(error = %e, category = ?e.error_category(), "Subscription matching failed");
                return None;
            }
        };

        if targets.is_empty() {
            return Some(Vec::new());
        }

        let context = match event.actor_login() {
            Some(login) => RenderContext {
                actor_username: self.resolver.chat_username(login).await,
            },
            None => RenderContext::default(),
        };

        Some(
            targets
                .into_iter()
                .map(|target| Notification {
                    message: self.renderer.render(&target.subscription, event, &context),
                    channel_id: target.channel_id,
                })
                .collect(),
        )
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
