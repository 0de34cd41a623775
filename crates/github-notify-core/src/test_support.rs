//! Shared fixtures and hand-written test doubles.

use crate::{
    chat::{ChatError, ChatPoster},
    github::{GitHubClient, GitHubError, RepositoryInfo},
    subscriptions::{features::Features, Subscription, SubscriptionFlags},
    webhook::*,
    ChannelId, RepositoryKey, UserId,
};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use std::time::Duration;

// ============================================================================
// Event fixtures
// ============================================================================

pub fn account(login: &str) -> Account {
    Account {
        login: login.to_string(),
        html_url: format!("https://github.com/{}", login),
    }
}

pub fn repository(full_name: &str, private: bool) -> Repository {
    let (owner, name) = full_name.split_once('/').unwrap_or((full_name, ""));
    Repository {
        full_name: full_name.to_string(),
        name: name.to_string(),
        owner: account(owner),
        private,
        html_url: format!("https://github.com/{}", full_name),
    }
}

/// Event on a public repository by `alice`
pub fn event(full_name: &str, kind: EventKind) -> NormalizedEvent {
    NormalizedEvent {
        repository: Some(repository(full_name, false)),
        actor: Some(account("alice")),
        kind,
    }
}

pub fn private_event(full_name: &str, kind: EventKind) -> NormalizedEvent {
    NormalizedEvent {
        repository: Some(repository(full_name, true)),
        ..event(full_name, kind)
    }
}

fn labels(names: &[&str]) -> Vec<Label> {
    names
        .iter()
        .map(|name| Label {
            name: name.to_string(),
        })
        .collect()
}

pub fn pull_request(action: &str) -> EventKind {
    pull_request_with_labels(action, &[], None)
}

pub fn pull_request_with_labels(action: &str, names: &[&str], applied: Option<&str>) -> EventKind {
    EventKind::PullRequest(PullRequestEvent {
        action: action.to_string(),
        pull_request: PullRequest {
            number: 12,
            title: "Add sprockets".to_string(),
            body: Some("Adds the sprockets.".to_string()),
            html_url: "https://github.com/acme/widgets/pull/12".to_string(),
            state: "open".to_string(),
            user: account("alice"),
            labels: labels(names),
            ..Default::default()
        },
        label: applied.map(|name| Label {
            name: name.to_string(),
        }),
    })
}

pub fn merged_pull_request() -> EventKind {
    match pull_request("closed") {
        EventKind::PullRequest(mut e) => {
            e.pull_request.merged = true;
            e.pull_request.state = "closed".to_string();
            EventKind::PullRequest(e)
        }
        other => other,
    }
}

pub fn issue(action: &str, names: &[&str]) -> EventKind {
    issue_with_applied(action, names, None)
}

pub fn issue_with_applied(action: &str, names: &[&str], applied: Option<&str>) -> EventKind {
    EventKind::Issues(IssuesEvent {
        action: action.to_string(),
        issue: Issue {
            number: 7,
            title: "Gears grind".to_string(),
            body: Some("They grind.".to_string()),
            html_url: "https://github.com/acme/widgets/issues/7".to_string(),
            state: "open".to_string(),
            user: account("alice"),
            labels: labels(names),
            pull_request: None,
        },
        label: applied.map(|name| Label {
            name: name.to_string(),
        }),
    })
}

pub fn issue_comment(names: &[&str]) -> EventKind {
    EventKind::IssueComment(IssueCommentEvent {
        action: "created".to_string(),
        issue: Issue {
            number: 7,
            title: "Gears grind".to_string(),
            labels: labels(names),
            ..Default::default()
        },
        comment: Comment {
            body: "Me too.".to_string(),
            html_url: "https://github.com/acme/widgets/issues/7#issuecomment-1".to_string(),
            user: account("alice"),
        },
    })
}

pub fn review(state: &str) -> EventKind {
    EventKind::PullRequestReview(PullRequestReviewEvent {
        action: "submitted".to_string(),
        review: Review {
            state: state.to_string(),
            body: Some("Looks good".to_string()),
            html_url: "https://github.com/acme/widgets/pull/12#pullrequestreview-1".to_string(),
            user: account("alice"),
        },
        pull_request: PullRequest {
            number: 12,
            title: "Add sprockets".to_string(),
            ..Default::default()
        },
    })
}

pub fn review_comment() -> EventKind {
    EventKind::PullRequestReviewComment(PullRequestReviewCommentEvent {
        action: "created".to_string(),
        comment: Comment {
            body: "Nit: spacing".to_string(),
            html_url: "https://github.com/acme/widgets/pull/12#discussion_r1".to_string(),
            user: account("alice"),
        },
        pull_request: PullRequest {
            number: 12,
            title: "Add sprockets".to_string(),
            ..Default::default()
        },
    })
}

pub fn push(commit_count: usize) -> EventKind {
    EventKind::Push(PushEvent {
        git_ref: "refs/heads/main".to_string(),
        compare: "https://github.com/acme/widgets/compare/a...b".to_string(),
        commits: (0..commit_count)
            .map(|i| Commit {
                id: format!("{:07}abcdef", i),
                message: format!("Commit {}\n\ndetails", i),
                url: format!("https://github.com/acme/widgets/commit/{}", i),
                author: CommitAuthor {
                    name: "Alice".to_string(),
                    username: Some("alice".to_string()),
                },
            })
            .collect(),
        ..Default::default()
    })
}

pub fn create(ref_type: &str, name: &str) -> EventKind {
    EventKind::Create(RefEvent {
        git_ref: name.to_string(),
        ref_type: ref_type.to_string(),
    })
}

pub fn delete(ref_type: &str, name: &str) -> EventKind {
    EventKind::Delete(RefEvent {
        git_ref: name.to_string(),
        ref_type: ref_type.to_string(),
    })
}

pub fn star(action: &str) -> EventKind {
    EventKind::Star(StarEvent {
        action: action.to_string(),
    })
}

pub fn release(action: &str) -> EventKind {
    EventKind::Release(ReleaseEvent {
        action: action.to_string(),
        release: Release {
            tag_name: "v1.2.0".to_string(),
            name: Some("Sprockets".to_string()),
            html_url: "https://github.com/acme/widgets/releases/v1.2.0".to_string(),
            body: Some("Release notes".to_string()),
            prerelease: false,
        },
    })
}

pub fn workflow_job(action: &str, conclusion: Option<&str>) -> EventKind {
    EventKind::WorkflowJob(WorkflowJobEvent {
        action: action.to_string(),
        workflow_job: WorkflowJob {
            name: "test".to_string(),
            workflow_name: Some("CI".to_string()),
            head_branch: Some("main".to_string()),
            conclusion: conclusion.map(str::to_string),
            html_url: "https://github.com/acme/widgets/actions/runs/1/job/2".to_string(),
        },
    })
}

pub fn discussion(action: &str) -> EventKind {
    EventKind::Discussion(DiscussionEvent {
        action: action.to_string(),
        discussion: Discussion {
            number: 3,
            title: "Roadmap".to_string(),
            body: Some("What next?".to_string()),
            html_url: "https://github.com/acme/widgets/discussions/3".to_string(),
            category: DiscussionCategory {
                name: "Ideas".to_string(),
            },
        },
    })
}

pub fn discussion_comment() -> EventKind {
    EventKind::DiscussionComment(DiscussionCommentEvent {
        action: "created".to_string(),
        discussion: Discussion {
            number: 3,
            title: "Roadmap".to_string(),
            ..Default::default()
        },
        comment: Comment {
            body: "More sprockets".to_string(),
            html_url: "https://github.com/acme/widgets/discussions/3#discussioncomment-1".to_string(),
            user: account("alice"),
        },
    })
}

pub fn ping() -> EventKind {
    EventKind::Ping(PingEvent {
        zen: "Practicality beats purity.".to_string(),
        hook_id: Some(1),
    })
}

// ============================================================================
// Subscription fixtures
// ============================================================================

pub fn subscription(channel: &str, repository: &str, features: &str) -> Subscription {
    subscription_with_flags(channel, repository, features, SubscriptionFlags::default())
}

pub fn subscription_with_flags(
    channel: &str,
    repository: &str,
    features: &str,
    flags: SubscriptionFlags,
) -> Subscription {
    Subscription::new(
        ChannelId::new(channel).unwrap(),
        UserId::new("creator").unwrap(),
        RepositoryKey::from_full_name(repository).unwrap(),
        Features::new(features),
        flags,
    )
}

// ============================================================================
// Chat double
// ============================================================================

/// Chat poster that records everything and can be told to fail
#[derive(Clone, Default)]
pub struct RecordingPoster {
    posts: Arc<Mutex<Vec<(ChannelId, String)>>>,
    direct_messages: Arc<Mutex<Vec<(UserId, String)>>>,
    user_events: Arc<Mutex<Vec<(UserId, String)>>>,
    failing_channels: Arc<Mutex<HashSet<String>>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl RecordingPoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_channel(&self, channel: &str) {
        self.failing_channels
            .lock()
            .unwrap()
            .insert(channel.to_string());
    }

    /// Make every post take this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn posts(&self) -> Vec<(ChannelId, String)> {
        self.posts.lock().unwrap().clone()
    }

    pub fn posted_channels(&self) -> Vec<String> {
        self.posts()
            .into_iter()
            .map(|(channel, _)| channel.as_str().to_string())
            .collect()
    }

    pub fn direct_messages(&self) -> Vec<(UserId, String)> {
        self.direct_messages.lock().unwrap().clone()
    }

    pub fn user_events(&self) -> Vec<(UserId, String)> {
        self.user_events.lock().unwrap().clone()
    }
}

#[async_trait]
impl ChatPoster for RecordingPoster {
    async fn create_post(&self, channel_id: &ChannelId, message: &str) -> Result<(), ChatError> {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self
            .failing_channels
            .lock()
            .unwrap()
            .contains(channel_id.as_str())
        {
            return Err(ChatError::Rejected {
                message: format!("channel {} is archived", channel_id),
            });
        }

        self.posts
            .lock()
            .unwrap()
            .push((channel_id.clone(), message.to_string()));
        Ok(())
    }

    async fn direct_message(&self, user_id: &UserId, message: &str) -> Result<(), ChatError> {
        self.direct_messages
            .lock()
            .unwrap()
            .push((user_id.clone(), message.to_string()));
        Ok(())
    }

    async fn publish_user_event(
        &self,
        user_id: &UserId,
        event: &str,
        _payload: serde_json::Value,
    ) -> Result<(), ChatError> {
        self.user_events
            .lock()
            .unwrap()
            .push((user_id.clone(), event.to_string()));
        Ok(())
    }
}

// ============================================================================
// GitHub double
// ============================================================================

/// GitHub client answering from scripted tables
///
/// Unscripted access checks answer `false`, unscripted membership checks
/// `false`, unscripted repositories `NotFound`, unscripted webhook lookups
/// `true`.
#[derive(Clone, Default)]
pub struct ScriptedGitHub {
    access: Arc<Mutex<HashMap<(String, String), Result<bool, GitHubError>>>>,
    members: Arc<Mutex<HashMap<(String, String), Result<bool, GitHubError>>>>,
    repositories: Arc<Mutex<HashMap<String, RepositoryInfo>>>,
    owners: Arc<Mutex<HashSet<String>>>,
    hooks: Arc<Mutex<HashMap<String, Result<bool, GitHubError>>>>,
    membership_calls: Arc<Mutex<u32>>,
    access_calls: Arc<Mutex<u32>>,
    delay: Arc<Mutex<Option<Duration>>>,
}

impl ScriptedGitHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn grant_access(&self, user: &str, full_name: &str, result: Result<bool, GitHubError>) {
        self.access
            .lock()
            .unwrap()
            .insert((user.to_string(), full_name.to_lowercase()), result);
    }

    pub fn set_member(&self, org: &str, login: &str, result: Result<bool, GitHubError>) {
        self.members
            .lock()
            .unwrap()
            .insert((org.to_lowercase(), login.to_lowercase()), result);
    }

    pub fn add_repository(&self, full_name: &str, private: bool) {
        self.repositories.lock().unwrap().insert(
            full_name.to_lowercase(),
            RepositoryInfo {
                full_name: full_name.to_string(),
                private,
                html_url: format!("https://github.com/{}", full_name),
            },
        );
    }

    pub fn add_owner(&self, owner: &str) {
        self.owners.lock().unwrap().insert(owner.to_lowercase());
    }

    /// Script the webhook lookup for `owner` or `owner/repo`; unscripted
    /// targets have a webhook
    pub fn set_webhook(&self, target: &str, result: Result<bool, GitHubError>) {
        self.hooks.lock().unwrap().insert(target.to_lowercase(), result);
    }

    /// Make every call take this long
    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn membership_calls(&self) -> u32 {
        *self.membership_calls.lock().unwrap()
    }

    pub fn access_calls(&self) -> u32 {
        *self.access_calls.lock().unwrap()
    }

    async fn pause(&self) {
        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl GitHubClient for ScriptedGitHub {
    async fn has_repository_access(
        &self,
        user: &UserId,
        full_name: &str,
    ) -> Result<bool, GitHubError> {
        *self.access_calls.lock().unwrap() += 1;
        self.pause().await;
        self.access
            .lock()
            .unwrap()
            .get(&(user.as_str().to_string(), full_name.to_lowercase()))
            .cloned()
            .unwrap_or(Ok(false))
    }

    async fn is_organization_member(
        &self,
        organization: &str,
        login: &str,
    ) -> Result<bool, GitHubError> {
        *self.membership_calls.lock().unwrap() += 1;
        self.pause().await;
        self.members
            .lock()
            .unwrap()
            .get(&(organization.to_lowercase(), login.to_lowercase()))
            .cloned()
            .unwrap_or(Ok(false))
    }

    async fn repository(
        &self,
        _user: &UserId,
        owner: &str,
        repo: &str,
    ) -> Result<RepositoryInfo, GitHubError> {
        self.pause().await;
        let full_name = format!("{}/{}", owner, repo).to_lowercase();
        self.repositories
            .lock()
            .unwrap()
            .get(&full_name)
            .cloned()
            .ok_or(GitHubError::NotFound { message: full_name })
    }

    async fn owner_exists(&self, _user: &UserId, owner: &str) -> Result<bool, GitHubError> {
        self.pause().await;
        Ok(self.owners.lock().unwrap().contains(&owner.to_lowercase()))
    }

    async fn webhook_exists(
        &self,
        _user: &UserId,
        owner: &str,
        repo: Option<&str>,
    ) -> Result<bool, GitHubError> {
        self.pause().await;
        let target = match repo {
            Some(repo) => format!("{}/{}", owner, repo),
            None => owner.to_string(),
        };
        self.hooks
            .lock()
            .unwrap()
            .get(&target.to_lowercase())
            .cloned()
            .unwrap_or(Ok(true))
    }
}
