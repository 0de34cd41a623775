//! # Subscription Commands
//!
//! The `/github subscriptions …` surface: tokenising the command line,
//! parsing `add` arguments, and applying them through the
//! [`SubscriptionStore`] after the organization-lock and existence checks.
//!
//! Successful changes are announced to the channel through the
//! [`ChatPoster`]; the returned reply is the ephemeral text addressed to the
//! invoking user.

use crate::{
    chat::{ChatError, ChatPoster},
    config::NotifyConfig,
    github::{with_deadline, GitHubClient, GitHubError},
    subscriptions::{
        features::{FeatureError, Features, DEFAULT_FEATURES},
        Subscription, SubscriptionError, SubscriptionFlags, SubscriptionStore, FLAG_EXCLUDE_ORG_MEMBER,
        FLAG_FEATURES, FLAG_INCLUDE_ONLY_ORG_MEMBERS,
    },
    ChannelId, RepositoryKey, UserId,
};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const PRIVATE_REPOSITORY_WARNING: &str = "\n\n**Warning:** You subscribed to a private repository. \
Anyone with access to this channel will be able to read the events getting posted here.";

const NO_WEBHOOK_NOTE: &str = "\n**Note:** No webhook was found for this repository or organization. \
To create one, enter the following slash command `/github setup webhook`";

// ============================================================================
// Parsing
// ============================================================================

/// A tokenised slash command
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedCommand {
    pub command: String,
    pub action: String,
    pub parameters: Vec<String>,
}

/// Split a command line into command, action and parameters
///
/// Whitespace inside double quotes is kept (collapsed to a single space per
/// character); the quotes themselves stay part of the token.
pub fn parse_command(input: &str) -> ParsedCommand {
    let mut split = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for c in input.chars() {
        if c.is_whitespace() {
            if in_quotes {
                current.push(' ');
            } else if !current.is_empty() {
                split.push(std::mem::take(&mut current));
            }
            continue;
        }

        current.push(c);
        if c == '"' {
            in_quotes = !in_quotes;
        }
    }

    if !current.is_empty() {
        split.push(current);
    }

    let mut tokens = split.into_iter();
    ParsedCommand {
        command: tokens.next().unwrap_or_default(),
        action: tokens.next().unwrap_or_default(),
        parameters: tokens.collect(),
    }
}

/// Split `owner`, `owner/repo` or a repository URL under `base_url`
///
/// Returns `None` for anything with more than two path segments or no owner.
pub fn parse_owner_and_repo(target: &str, base_url: &str) -> Option<(String, String)> {
    let trimmed = target.trim();
    let stripped = if base_url.is_empty() {
        trimmed
    } else {
        trimmed.strip_prefix(base_url).unwrap_or(trimmed)
    };
    let full = stripped.trim().trim_end_matches('/');

    let segments: Vec<&str> = full.split('/').collect();
    let (owner, repo) = match segments.as_slice() {
        [owner] => (*owner, ""),
        [owner, repo] => (*owner, *repo),
        _ => return None,
    };

    if owner.is_empty() {
        return None;
    }

    Some((owner.to_string(), repo.to_string()))
}

/// Parsed arguments of `subscriptions add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeArgs {
    pub target: String,
    pub features: Features,
    pub flags: SubscriptionFlags,
}

impl SubscribeArgs {
    /// Parse `<target> [--flag value]...`
    pub fn parse(parameters: &[String]) -> Result<Self, CommandError> {
        let (target, flag_params) = parameters
            .split_first()
            .ok_or(CommandError::MissingRepository)?;

        if flag_params.len() % 2 != 0 {
            return Err(CommandError::InvalidFlagFormat);
        }

        let mut features = DEFAULT_FEATURES.to_string();
        let mut flags = SubscriptionFlags::default();

        for pair in flag_params.chunks(2) {
            let (flag, value) = (&pair[0], &pair[1]);
            let name = flag
                .strip_prefix("--")
                .ok_or(CommandError::InvalidFlagFormat)?;

            if name == FLAG_FEATURES {
                features = value.clone();
                continue;
            }

            flags
                .add_flag(name, value)
                .map_err(|_| CommandError::UnsupportedFlagValue { flag: flag.clone() })?;
        }

        Ok(Self {
            target: target.clone(),
            features: Features::parse(&features)?,
            flags,
        })
    }
}

// ============================================================================
// Errors
// ============================================================================

/// Reasons a subscription command is refused
///
/// The display text is the reply shown to the user.
#[derive(Debug, Clone, thiserror::Error)]
pub enum CommandError {
    #[error("Please specify a repository.")]
    MissingRepository,

    #[error("Please use the correct format for flags: --<name> <value>")]
    InvalidFlagFormat,

    #[error("Unsupported value for flag {flag}")]
    UnsupportedFlagValue { flag: String },

    #[error("{0}")]
    Features(#[from] FeatureError),

    #[error("invalid repository")]
    InvalidRepository,

    #[error("only repositories in the {organizations} organization(s) are supported")]
    OrganizationNotSupported { organizations: String },

    #[error("Unable to set --{flag} flag. The GitHub plugin is not locked to a single organization.")]
    OrganizationNotLocked { flag: &'static str },

    #[error("Exclude repository feature is only available to subscriptions of an organization.")]
    ExcludeOnRepository,

    #[error("unknown repository {full_name}")]
    UnknownRepository { full_name: String },

    #[error("Unknown organization {owner}")]
    UnknownOrganization { owner: String },

    #[error("Encountered an error subscribing to {target}")]
    Lookup { target: String },

    #[error("Invalid subscribe command. Available commands are 'list', 'add' and 'delete'.")]
    MissingSubcommand,

    #[error("Unknown subcommand {subcommand}")]
    UnknownSubcommand { subcommand: String },

    #[error("{0}")]
    Storage(#[from] SubscriptionError),
}

// ============================================================================
// Service
// ============================================================================

/// Who ran the command, and where
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub channel_id: ChannelId,
    pub user_id: UserId,
    pub username: String,
}

/// Outcome of a successful `add`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubscribeOutcome {
    pub subscription: Subscription,
    /// Features of the subscription this one replaced
    pub previous: Option<Features>,
    /// Announcement posted to the channel
    pub message: String,
    /// Ephemeral reply to the invoking user
    pub reply: String,
}

/// Applies subscription commands
#[derive(Clone)]
pub struct SubscriptionService {
    store: SubscriptionStore,
    github: Arc<dyn GitHubClient>,
    poster: Arc<dyn ChatPoster>,
    organizations: Vec<String>,
    base_url: String,
    timeout: Duration,
}

impl SubscriptionService {
    pub fn new(
        store: SubscriptionStore,
        github: Arc<dyn GitHubClient>,
        poster: Arc<dyn ChatPoster>,
        config: &NotifyConfig,
    ) -> Self {
        Self {
            store,
            github,
            poster,
            organizations: config.normalized_organizations(),
            base_url: config.normalized_base_url(),
            timeout: config.request_timeout(),
        }
    }

    /// Run `subscriptions <list|add|delete> …` and return the reply
    pub async fn execute(&self, invocation: &CommandInvocation, parameters: &[String]) -> String {
        let result = match parameters.split_first() {
            None => Err(CommandError::MissingSubcommand),
            Some((subcommand, rest)) => match subcommand.to_lowercase().as_str() {
                "list" => self.list_for_channel(&invocation.channel_id).await,
                "add" => match SubscribeArgs::parse(rest) {
                    Ok(args) => self.subscribe(invocation, args).await.map(|outcome| outcome.reply),
                    Err(e) => Err(e),
                },
                "delete" => self.unsubscribe(invocation, rest).await,
                _ => Err(CommandError::UnknownSubcommand {
                    subcommand: subcommand.clone(),
                }),
            },
        };

        result.unwrap_or_else(|e| e.to_string())
    }

    /// Create or replace the channel's subscription and announce it
    ///
    /// The reply carries a note when no webhook delivers the target to this
    /// service yet.
    pub async fn subscribe(
        &self,
        invocation: &CommandInvocation,
        args: SubscribeArgs,
    ) -> Result<SubscribeOutcome, CommandError> {
        let (owner, repo) =
            parse_owner_and_repo(&args.target, &self.base_url).ok_or(CommandError::InvalidRepository)?;
        let key = RepositoryKey::new(&owner, &repo).map_err(|_| CommandError::InvalidRepository)?;

        if !key.is_org_wide() && !args.flags.exclude_repository.is_empty() {
            return Err(CommandError::ExcludeOnRepository);
        }

        self.check_organization(key.owner())?;

        if args.flags.exclude_org_members && self.organizations.is_empty() {
            return Err(CommandError::OrganizationNotLocked {
                flag: FLAG_EXCLUDE_ORG_MEMBER,
            });
        }
        if args.flags.include_only_org_members && self.organizations.is_empty() {
            return Err(CommandError::OrganizationNotLocked {
                flag: FLAG_INCLUDE_ONLY_ORG_MEMBERS,
            });
        }

        let private = self.verify_exists(&invocation.user_id, &key).await?;

        let subscription = Subscription::new(
            invocation.channel_id.clone(),
            invocation.user_id.clone(),
            key.clone(),
            args.features,
            args.flags,
        );
        let previous = self
            .store
            .add(&key, subscription.clone())
            .await?
            .map(|replaced| replaced.features);

        info!(
            repository = %key,
            channel_id = %invocation.channel_id,
            creator_id = %invocation.user_id,
            "Channel subscribed"
        );

        let message = self.subscribed_message(invocation, &key, &subscription, previous.as_ref(), private);

        if let Err(e) = self.announce(&invocation.channel_id, &message).await {
            let reply = format!("{}\nError creating the public post: {}", message, e);
            return Ok(SubscribeOutcome {
                subscription,
                previous,
                message,
                reply,
            });
        }

        let mut reply = match key.repo() {
            None => format!("Successfully subscribed to organization {}.", key.owner()),
            Some(_) => message.clone(),
        };
        reply.push_str(&self.webhook_note(&invocation.user_id, &key).await);

        Ok(SubscribeOutcome {
            subscription,
            previous,
            message,
            reply,
        })
    }

    /// Remove the channel's subscription to `parameters[0]` and announce it
    ///
    /// The reply is empty once the announcement is posted.
    pub async fn unsubscribe(
        &self,
        invocation: &CommandInvocation,
        parameters: &[String],
    ) -> Result<String, CommandError> {
        let target = parameters.first().ok_or(CommandError::MissingRepository)?;
        let (owner, repo) =
            parse_owner_and_repo(target, &self.base_url).ok_or(CommandError::InvalidRepository)?;
        let key = RepositoryKey::new(&owner, &repo).map_err(|_| CommandError::InvalidRepository)?;

        self.store.remove(&invocation.channel_id, &key).await?;

        let link = format!("{}{}", self.base_url, key);
        let message = match key.repo() {
            None => format!(
                "@{} unsubscribed this channel from [{}]({})",
                invocation.username, key, link
            ),
            Some(_) => format!(
                "@{} Unsubscribed this channel from [{}]({})\n Please delete the [webhook]({}/settings/hooks) \
                 for this subscription unless it's required for other subscriptions.",
                invocation.username, key, link, link
            ),
        };

        match self.announce(&invocation.channel_id, &message).await {
            Ok(()) => Ok(String::new()),
            Err(e) => Ok(format!("{} error creating the public post: {}", message, e)),
        }
    }

    /// Markdown listing of the channel's subscriptions
    pub async fn list_for_channel(&self, channel_id: &ChannelId) -> Result<String, CommandError> {
        let subscriptions = self.store.list_by_channel(channel_id).await?;

        if subscriptions.is_empty() {
            return Ok("Currently there are no subscriptions in this channel".to_string());
        }

        let mut text = String::from("### Subscriptions in this channel\n");
        for subscription in subscriptions {
            text.push_str(&format!(
                "* `{}` - {}",
                subscription.repository.as_str().trim_matches('/'),
                subscription.features
            ));
            let flags = subscription.flags.to_string();
            if !flags.is_empty() {
                text.push(' ');
                text.push_str(&flags);
            }
            text.push('\n');
        }
        Ok(text)
    }

    fn check_organization(&self, owner: &str) -> Result<(), CommandError> {
        if self.organizations.is_empty() || self.organizations.iter().any(|org| org == owner) {
            return Ok(());
        }

        Err(CommandError::OrganizationNotSupported {
            organizations: self.organizations.join(","),
        })
    }

    /// Confirm the target exists; returns whether it is a private repository
    async fn verify_exists(&self, user: &UserId, key: &RepositoryKey) -> Result<bool, CommandError> {
        match key.repo() {
            None => {
                let owner = key.owner();
                match with_deadline(self.timeout, self.github.owner_exists(user, owner)).await {
                    Ok(true) => Ok(false),
                    Ok(false) | Err(GitHubError::NotFound { .. }) => Err(CommandError::UnknownOrganization {
                        owner: owner.to_string(),
                    }),
                    Err(e) => {
                        warn!(owner = %owner, error = %e, "Failed to look up organization");
                        Err(CommandError::Lookup {
                            target: key.to_string(),
                        })
                    }
                }
            }
            Some(repo) => {
                match with_deadline(self.timeout, self.github.repository(user, key.owner(), repo)).await {
                    Ok(info) => Ok(info.private),
                    Err(GitHubError::NotFound { .. }) => Err(CommandError::UnknownRepository {
                        full_name: key.to_string(),
                    }),
                    Err(e) => {
                        warn!(repository = %key, error = %e, "Failed to look up repository");
                        Err(CommandError::Lookup {
                            target: key.to_string(),
                        })
                    }
                }
            }
        }
    }

    async fn announce(&self, channel_id: &ChannelId, message: &str) -> Result<(), ChatError> {
        let posted = tokio::time::timeout(self.timeout, self.poster.create_post(channel_id, message))
            .await
            .unwrap_or(Err(ChatError::Timeout));

        if let Err(e) = &posted {
            warn!(channel_id = %channel_id, error = %e, "Failed to announce subscription change");
        }
        posted
    }

    /// Text appended to the reply after checking the target's webhooks
    ///
    /// A user who may not list webhooks gets no note.
    async fn webhook_note(&self, user: &UserId, key: &RepositoryKey) -> String {
        let lookup = self.github.webhook_exists(user, key.owner(), key.repo());
        match with_deadline(self.timeout, lookup).await {
            Ok(true) => String::new(),
            Ok(false) => NO_WEBHOOK_NOTE.to_string(),
            Err(e) if e.is_authorization() || matches!(e, GitHubError::NotFound { .. }) => {
                debug!(repository = %key, error = %e, "Not allowed to list webhooks");
                String::new()
            }
            Err(e) => {
                warn!(repository = %key, error = %e, "Failed to list webhooks");
                format!("\nFailed to get the list of webhooks: {}", e)
            }
        }
    }

    fn subscribed_message(
        &self,
        invocation: &CommandInvocation,
        key: &RepositoryKey,
        subscription: &Subscription,
        previous: Option<&Features>,
        private: bool,
    ) -> String {
        let mut message = format!(
            "@{} subscribed this channel to [{}]({}{}) with the following events: {}",
            invocation.username,
            key,
            self.base_url,
            key,
            subscription.features.formatted()
        );

        if key.is_org_wide() {
            message.push('.');
        }

        if let Some(previous) = previous.filter(|p| !p.is_empty()) {
            message.push_str(&format!(
                "\nThe previous subscription with: {} was overwritten.\n",
                previous.formatted()
            ));
        }

        if private {
            message.push_str(PRIVATE_REPOSITORY_WARNING);
        }

        message
    }
}

#[cfg(test)]
#[path = "commands_tests.rs"]
mod tests;
