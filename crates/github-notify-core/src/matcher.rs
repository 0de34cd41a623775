//! # Subscription Matching
//!
//! Turns a normalized event into the list of channels to notify:
//!
//! 1. Candidates are the repository's own subscriptions followed by the
//!    owner's org-wide ones.
//! 2. On private repositories, candidates whose creator can no longer read
//!    the repository are dropped.
//! 3. The actor's organization membership is looked up at most once, and only
//!    when a candidate filters on it.
//! 4. Every candidate is run through the [`filter`](crate::filter).
//!
//! The same channel may be targeted twice, once through a repository
//! subscription and once through an org-wide one.

use crate::{
    config::NotifyConfig,
    filter,
    github::{with_deadline, GitHubClient},
    render::RenderStyle,
    subscriptions::{Subscription, SubscriptionStore},
    webhook::NormalizedEvent,
    ChannelId, NotifyResult, UserId,
};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One channel to notify, with the subscription that selected it
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelTarget {
    pub channel_id: ChannelId,
    pub render_style: RenderStyle,
    pub subscription: Subscription,
}

impl ChannelTarget {
    fn from_subscription(subscription: Subscription) -> Self {
        Self {
            channel_id: subscription.channel_id.clone(),
            render_style: subscription.render_style(),
            subscription,
        }
    }
}

/// Matches events against stored subscriptions
#[derive(Clone)]
pub struct SubscriptionMatcher {
    store: SubscriptionStore,
    github: Arc<dyn GitHubClient>,
    organizations: Vec<String>,
    timeout: Duration,
}

impl SubscriptionMatcher {
    pub fn new(store: SubscriptionStore, github: Arc<dyn GitHubClient>, config: &NotifyConfig) -> Self {
        Self {
            store,
            github,
            organizations: config.normalized_organizations(),
            timeout: config.request_timeout(),
        }
    }

    /// Channels that should receive `event`, in candidate order
    pub async fn match_event(&self, event: &NormalizedEvent) -> NotifyResult<Vec<ChannelTarget>> {
        let Some(repository) = event.repository.as_ref() else {
            debug!(event_type = event.event_type(), "Event has no repository, nothing to match");
            return Ok(Vec::new());
        };

        if filter::admitting_features(&event.kind).is_empty() {
            debug!(
                event_type = event.event_type(),
                action = event.action().unwrap_or_default(),
                "Event never notifies"
            );
            return Ok(Vec::new());
        }

        let mut candidates = self
            .store
            .subscriptions_for_repository(&repository.full_name)
            .await?;

        if candidates.is_empty() {
            return Ok(Vec::new());
        }

        if repository.private {
            candidates = self
                .readable_by_creators(&repository.full_name, candidates)
                .await;
        }

        let actor_is_member = if candidates.iter().any(|s| s.flags.uses_membership()) {
            self.actor_is_org_member(event).await
        } else {
            false
        };

        let targets: Vec<ChannelTarget> = candidates
            .into_iter()
            .filter(|subscription| match filter::evaluate(subscription, event, actor_is_member) {
                Ok(()) => true,
                Err(reason) => {
                    debug!(
                        repository = %repository.full_name,
                        channel_id = %subscription.channel_id,
                        reason = %reason,
                        "Subscription filtered out"
                    );
                    false
                }
            })
            .map(ChannelTarget::from_subscription)
            .collect();

        debug!(
            repository = %repository.full_name,
            event_type = event.event_type(),
            targets = targets.len(),
            "Matched event"
        );
        Ok(targets)
    }

    /// Keep subscriptions whose creator can still read the repository
    ///
    /// Each creator is checked once per event. A failed check drops the
    /// subscription.
    async fn readable_by_creators(
        &self,
        full_name: &str,
        candidates: Vec<Subscription>,
    ) -> Vec<Subscription> {
        let mut access: HashMap<UserId, bool> = HashMap::new();
        let mut readable = Vec::with_capacity(candidates.len());

        for subscription in candidates {
            let allowed = match access.get(&subscription.creator_id) {
                Some(allowed) => *allowed,
                None => {
                    let allowed = self.creator_can_read(&subscription.creator_id, full_name).await;
                    access.insert(subscription.creator_id.clone(), allowed);
                    allowed
                }
            };

            if allowed {
                readable.push(subscription);
            } else {
                debug!(
                    repository = %full_name,
                    channel_id = %subscription.channel_id,
                    creator_id = %subscription.creator_id,
                    "Creator lacks access to private repository"
                );
            }
        }

        readable
    }

    async fn creator_can_read(&self, creator: &UserId, full_name: &str) -> bool {
        match with_deadline(self.timeout, self.github.has_repository_access(creator, full_name)).await {
            Ok(allowed) => allowed,
            Err(e) if e.is_transient() => {
                warn!(
                    repository = %full_name,
                    creator_id = %creator,
                    error = %e,
                    "Repository permission check failed"
                );
                false
            }
            Err(e) => {
                debug!(repository = %full_name, creator_id = %creator, error = %e, "Repository access refused");
                false
            }
        }
    }

    /// Membership of the actor in the repository's organization
    ///
    /// Only organizations the deployment is locked to are consulted; anything
    /// else, including a failed lookup, counts as "not a member".
    async fn actor_is_org_member(&self, event: &NormalizedEvent) -> bool {
        let (Some(login), Some(repository)) = (event.actor_login(), event.repository.as_ref()) else {
            return false;
        };

        let owner = repository.owner_login().to_lowercase();
        if !self.organizations.contains(&owner) {
            return false;
        }

        match with_deadline(self.timeout, self.github.is_organization_member(&owner, login)).await {
            Ok(member) => member,
            Err(e) => {
                warn!(organization = %owner, actor = %login, error = %e, "Membership lookup failed");
                false
            }
        }
    }
}

#[cfg(test)]
#[path = "matcher_tests.rs"]
mod tests;
