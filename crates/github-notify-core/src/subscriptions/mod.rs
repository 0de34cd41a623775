//! # Channel Subscriptions
//!
//! A subscription records a channel's interest in a repository (`owner/repo`)
//! or a whole organization (`owner`). All subscriptions live in a single
//! aggregate record in the key-value store; every mutation is a full
//! read-modify-write of that record through
//! [`KvStoreExt::set_atomic_with_retries`].
//!
//! The persisted JSON layout is shared with existing deployments, hence the
//! PascalCase field names.

use crate::{
    kv::{KvError, KvStore, KvStoreExt},
    render::RenderStyle,
    ChannelId, RepositoryKey, RetryPolicy, UserId, ValidationError,
};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, info};

pub mod features;

use features::Features;

/// KV key holding the subscription aggregate
pub const SUBSCRIPTIONS_KEY: &str = "subscriptions";

pub const FLAG_EXCLUDE_ORG_MEMBER: &str = "exclude-org-member";
pub const FLAG_INCLUDE_ONLY_ORG_MEMBERS: &str = "include-only-org-members";
pub const FLAG_RENDER_STYLE: &str = "render-style";
pub const FLAG_FEATURES: &str = "features";
pub const FLAG_EXCLUDE_REPOSITORY: &str = "exclude";

fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

// ============================================================================
// Subscription
// ============================================================================

/// Per-subscription behaviour modifiers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubscriptionFlags {
    #[serde(rename = "ExcludeOrgMembers", default)]
    pub exclude_org_members: bool,

    #[serde(rename = "IncludeOnlyOrgMembers", default)]
    pub include_only_org_members: bool,

    #[serde(rename = "RenderStyle", default)]
    pub render_style: RenderStyle,

    /// Full repository names skipped by an org-wide subscription
    #[serde(
        rename = "ExcludeRepository",
        default,
        deserialize_with = "null_as_default"
    )]
    pub exclude_repository: Vec<String>,
}

/// Error raised when a flag value cannot be applied
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FlagError {
    #[error("Invalid value '{value}' for --{flag}: expected true or false")]
    InvalidBool { flag: String, value: String },

    #[error("Invalid render style '{value}'. Valid styles are default, skip-body and collapsed.")]
    InvalidRenderStyle { value: String },

    #[error("Unknown flag --{flag}")]
    UnknownFlag { flag: String },
}

impl SubscriptionFlags {
    /// Apply one `--flag value` pair
    pub fn add_flag(&mut self, flag: &str, value: &str) -> Result<(), FlagError> {
        match flag {
            FLAG_EXCLUDE_ORG_MEMBER => {
                self.exclude_org_members = parse_bool(flag, value)?;
            }
            FLAG_INCLUDE_ONLY_ORG_MEMBERS => {
                self.include_only_org_members = parse_bool(flag, value)?;
            }
            FLAG_RENDER_STYLE => {
                self.render_style =
                    value
                        .parse()
                        .map_err(|_| FlagError::InvalidRenderStyle {
                            value: value.to_string(),
                        })?;
            }
            FLAG_EXCLUDE_REPOSITORY => {
                self.exclude_repository = value
                    .split(',')
                    .map(str::trim)
                    .filter(|repo| !repo.is_empty())
                    .map(str::to_string)
                    .collect();
            }
            other => {
                return Err(FlagError::UnknownFlag {
                    flag: other.to_string(),
                })
            }
        }
        Ok(())
    }

    /// True when the repository is on the exclusion list (case-insensitive)
    pub fn excludes(&self, full_name: &str) -> bool {
        self.exclude_repository
            .iter()
            .any(|excluded| excluded.eq_ignore_ascii_case(full_name))
    }

    /// True when any org-membership filter is set
    pub fn uses_membership(&self) -> bool {
        self.exclude_org_members || self.include_only_org_members
    }
}

fn parse_bool(flag: &str, value: &str) -> Result<bool, FlagError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "t" | "1" => Ok(true),
        "false" | "f" | "0" => Ok(false),
        _ => Err(FlagError::InvalidBool {
            flag: flag.to_string(),
            value: value.to_string(),
        }),
    }
}

impl fmt::Display for SubscriptionFlags {
    /// Command-line form, e.g. `--exclude-org-member true,--render-style collapsed`
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut flags = Vec::new();

        if self.exclude_org_members {
            flags.push(format!("--{} true", FLAG_EXCLUDE_ORG_MEMBER));
        }
        if self.include_only_org_members {
            flags.push(format!("--{} true", FLAG_INCLUDE_ONLY_ORG_MEMBERS));
        }
        if self.render_style != RenderStyle::Default {
            flags.push(format!("--{} {}", FLAG_RENDER_STYLE, self.render_style));
        }
        if !self.exclude_repository.is_empty() {
            flags.push(format!(
                "--{} {}",
                FLAG_EXCLUDE_REPOSITORY,
                self.exclude_repository.join(",")
            ));
        }

        write!(f, "{}", flags.join(","))
    }
}

/// A channel's registered interest in a repository or organization
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscription {
    #[serde(rename = "ChannelID")]
    pub channel_id: ChannelId,

    #[serde(rename = "CreatorID")]
    pub creator_id: UserId,

    #[serde(rename = "Features", default)]
    pub features: Features,

    #[serde(rename = "Flags", default)]
    pub flags: SubscriptionFlags,

    /// Older records omit this; it is restored from the aggregate key on read
    #[serde(rename = "Repository", default)]
    pub repository: RepositoryKey,
}

impl Subscription {
    /// Create a subscription
    pub fn new(
        channel_id: ChannelId,
        creator_id: UserId,
        repository: RepositoryKey,
        features: Features,
        flags: SubscriptionFlags,
    ) -> Self {
        Self {
            channel_id,
            creator_id,
            features,
            flags,
            repository,
        }
    }

    /// Label filter, if any
    pub fn label(&self) -> Option<&str> {
        self.features.label()
    }

    pub fn render_style(&self) -> RenderStyle {
        self.flags.render_style
    }
}

// ============================================================================
// Aggregate
// ============================================================================

/// Every subscription, keyed by lowercase repository-or-organization key
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subscriptions {
    #[serde(rename = "Repositories", default, deserialize_with = "null_as_default")]
    pub repositories: BTreeMap<RepositoryKey, Vec<Subscription>>,
}

impl Subscriptions {
    /// Decode the stored record; a missing or `null` record is empty
    pub fn decode(bytes: Option<&[u8]>) -> Result<Self, KvError> {
        let Some(bytes) = bytes else {
            return Ok(Self::default());
        };

        let decoded: Option<Self> =
            serde_json::from_slice(bytes).map_err(|e| KvError::Serialization {
                key: SUBSCRIPTIONS_KEY.to_string(),
                message: e.to_string(),
            })?;

        let mut subscriptions = decoded.unwrap_or_default();
        subscriptions.backfill_repository_keys();
        Ok(subscriptions)
    }

    fn encode(&self) -> Result<Vec<u8>, KvError> {
        serde_json::to_vec(self).map_err(|e| KvError::Serialization {
            key: SUBSCRIPTIONS_KEY.to_string(),
            message: e.to_string(),
        })
    }

    fn backfill_repository_keys(&mut self) {
        for (key, subs) in self.repositories.iter_mut() {
            for sub in subs.iter_mut() {
                if sub.repository.as_str().is_empty() {
                    sub.repository = key.clone();
                }
            }
        }
    }

    /// Insert or replace the channel's subscription under `key`
    ///
    /// Returns the replaced subscription. Replacement keeps the list position.
    pub fn upsert(&mut self, key: &RepositoryKey, subscription: Subscription) -> Option<Subscription> {
        let subs = self.repositories.entry(key.clone()).or_default();

        match subs
            .iter_mut()
            .find(|existing| existing.channel_id == subscription.channel_id)
        {
            Some(existing) => Some(std::mem::replace(existing, subscription)),
            None => {
                subs.push(subscription);
                None
            }
        }
    }

    /// Remove the channel's subscription under `key`, if present
    pub fn remove(&mut self, channel_id: &ChannelId, key: &RepositoryKey) -> Option<Subscription> {
        let subs = self.repositories.get_mut(key)?;
        let index = subs.iter().position(|s| &s.channel_id == channel_id)?;
        let removed = subs.remove(index);

        if subs.is_empty() {
            self.repositories.remove(key);
        }

        Some(removed)
    }

    /// Subscriptions of one channel, ordered by repository key
    pub fn by_channel(&self, channel_id: &ChannelId) -> Vec<Subscription> {
        let mut subs: Vec<Subscription> = self
            .repositories
            .values()
            .flatten()
            .filter(|s| &s.channel_id == channel_id)
            .cloned()
            .collect();

        subs.sort_by(|a, b| a.repository.cmp(&b.repository));
        subs
    }

    /// Repository-specific subscriptions followed by org-wide ones
    pub fn for_repository(&self, key: &RepositoryKey) -> Vec<Subscription> {
        let mut subs = Vec::new();

        if let Some(repo_subs) = self.repositories.get(key) {
            subs.extend(repo_subs.iter().cloned());
        }

        if !key.is_org_wide() {
            if let Some(org_subs) = self.repositories.get(&key.org_key()) {
                subs.extend(org_subs.iter().cloned());
            }
        }

        subs
    }

    /// Total number of subscriptions
    pub fn len(&self) -> usize {
        self.repositories.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Errors from subscription storage
#[derive(Debug, Clone, thiserror::Error)]
pub enum SubscriptionError {
    #[error("Could not access subscriptions: {0}")]
    Storage(#[from] KvError),

    #[error("Invalid repository: {0}")]
    InvalidRepository(#[from] ValidationError),
}

impl SubscriptionError {
    /// Check if error is transient
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Storage(e) => e.is_transient(),
            Self::InvalidRepository(_) => false,
        }
    }
}

// ============================================================================
// Store
// ============================================================================

/// Durable subscription store backed by the key-value collaborator
#[derive(Clone)]
pub struct SubscriptionStore {
    kv: Arc<dyn KvStore>,
    retry_policy: RetryPolicy,
}

impl SubscriptionStore {
    /// Create store with the default retry policy
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self::with_retry_policy(kv, RetryPolicy::default())
    }

    /// Create store with a custom retry policy
    pub fn with_retry_policy(kv: Arc<dyn KvStore>, retry_policy: RetryPolicy) -> Self {
        Self { kv, retry_policy }
    }

    /// Load the aggregate; empty when nothing is stored
    pub async fn get(&self) -> Result<Subscriptions, SubscriptionError> {
        let bytes = self.kv.get(SUBSCRIPTIONS_KEY).await?;
        Ok(Subscriptions::decode(bytes.as_deref())?)
    }

    /// Upsert a subscription by channel, returning the one it replaced
    pub async fn add(
        &self,
        key: &RepositoryKey,
        subscription: Subscription,
    ) -> Result<Option<Subscription>, SubscriptionError> {
        let mut replaced = None;

        self.kv
            .set_atomic_with_retries(SUBSCRIPTIONS_KEY, &self.retry_policy, |current| {
                let mut subs = Subscriptions::decode(current)?;
                replaced = subs.upsert(key, subscription.clone());
                subs.encode().map(Some)
            })
            .await?;

        info!(
            repository = %key,
            channel_id = %subscription.channel_id,
            replaced = replaced.is_some(),
            "Stored subscription"
        );
        Ok(replaced)
    }

    /// Remove a channel's subscription; reports whether one existed
    pub async fn remove(
        &self,
        channel_id: &ChannelId,
        key: &RepositoryKey,
    ) -> Result<bool, SubscriptionError> {
        let mut removed = false;

        self.kv
            .set_atomic_with_retries(SUBSCRIPTIONS_KEY, &self.retry_policy, |current| {
                let mut subs = Subscriptions::decode(current)?;
                removed = subs.remove(channel_id, key).is_some();
                if !removed {
                    return Ok(None);
                }
                subs.encode().map(Some)
            })
            .await?;

        if removed {
            info!(repository = %key, channel_id = %channel_id, "Removed subscription");
        } else {
            debug!(repository = %key, channel_id = %channel_id, "No subscription to remove");
        }
        Ok(removed)
    }

    /// Subscriptions of one channel, ordered by repository key
    pub async fn list_by_channel(
        &self,
        channel_id: &ChannelId,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        Ok(self.get().await?.by_channel(channel_id))
    }

    /// Candidate subscriptions for an event on `full_name`
    pub async fn subscriptions_for_repository(
        &self,
        full_name: &str,
    ) -> Result<Vec<Subscription>, SubscriptionError> {
        let key = RepositoryKey::from_full_name(full_name)?;
        Ok(self.get().await?.for_repository(&key))
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
