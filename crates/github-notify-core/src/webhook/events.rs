//! Payload types for the modelled webhook events.
//!
//! Only the fields needed for filtering and rendering are kept. Missing
//! fields fall back to defaults so partially populated payloads still
//! normalize.

use serde::{Deserialize, Serialize};

/// GitHub user or organization account
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Account {
    pub login: String,
    pub html_url: String,
}

/// Repository an event happened in
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Repository {
    pub full_name: String,
    pub name: String,
    pub owner: Account,
    pub private: bool,
    pub html_url: String,
}

impl Repository {
    /// Owner login, falling back to the first segment of the full name
    pub fn owner_login(&self) -> &str {
        if !self.owner.login.is_empty() {
            return &self.owner.login;
        }
        self.full_name.split('/').next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Label {
    pub name: String,
}

/// Branch pointer on a pull request
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BranchRef {
    #[serde(rename = "ref")]
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequest {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub html_url: String,
    pub state: String,
    pub merged: bool,
    pub draft: bool,
    pub user: Account,
    pub labels: Vec<Label>,
    pub head: BranchRef,
    pub base: BranchRef,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Issue {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub html_url: String,
    pub state: String,
    pub user: Account,
    pub labels: Vec<Label>,
    /// Present when the issue is really a pull request
    pub pull_request: Option<serde_json::Value>,
}

impl Issue {
    pub fn is_pull_request(&self) -> bool {
        self.pull_request.is_some()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Comment {
    pub body: String,
    pub html_url: String,
    pub user: Account,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Review {
    /// `approved`, `commented` or `changes_requested`
    pub state: String,
    pub body: Option<String>,
    pub html_url: String,
    pub user: Account,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitAuthor {
    pub name: String,
    pub username: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Commit {
    pub id: String,
    pub message: String,
    pub url: String,
    pub author: CommitAuthor,
}

impl Commit {
    /// First seven characters of the commit hash
    pub fn short_id(&self) -> &str {
        self.id.get(..7).unwrap_or(&self.id)
    }

    /// First line of the commit message
    pub fn summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Release {
    pub tag_name: String,
    pub name: Option<String>,
    pub html_url: String,
    pub body: Option<String>,
    pub prerelease: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowJob {
    pub name: String,
    pub workflow_name: Option<String>,
    pub head_branch: Option<String>,
    /// `success`, `failure`, `cancelled`, ... once completed
    pub conclusion: Option<String>,
    pub html_url: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionCategory {
    pub name: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Discussion {
    pub number: u64,
    pub title: String,
    pub body: Option<String>,
    pub html_url: String,
    pub category: DiscussionCategory,
}

// ============================================================================
// Event payloads
// ============================================================================

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestEvent {
    pub action: String,
    pub pull_request: PullRequest,
    /// Label just added, for `labeled` actions
    pub label: Option<Label>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssuesEvent {
    pub action: String,
    pub issue: Issue,
    pub label: Option<Label>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueCommentEvent {
    pub action: String,
    pub issue: Issue,
    pub comment: Comment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestReviewEvent {
    pub action: String,
    pub review: Review,
    pub pull_request: PullRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PullRequestReviewCommentEvent {
    pub action: String,
    pub comment: Comment,
    pub pull_request: PullRequest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PushEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    pub compare: String,
    pub forced: bool,
    pub created: bool,
    pub deleted: bool,
    pub commits: Vec<Commit>,
}

impl PushEvent {
    /// Branch or tag name without the `refs/heads/` or `refs/tags/` prefix
    pub fn ref_name(&self) -> &str {
        self.git_ref
            .strip_prefix("refs/heads/")
            .or_else(|| self.git_ref.strip_prefix("refs/tags/"))
            .unwrap_or(&self.git_ref)
    }
}

/// Payload of `create` and `delete` events
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RefEvent {
    #[serde(rename = "ref")]
    pub git_ref: String,
    /// `branch` or `tag`
    pub ref_type: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StarEvent {
    pub action: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReleaseEvent {
    pub action: String,
    pub release: Release,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkflowJobEvent {
    pub action: String,
    pub workflow_job: WorkflowJob,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionEvent {
    pub action: String,
    pub discussion: Discussion,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiscussionCommentEvent {
    pub action: String,
    pub discussion: Discussion,
    pub comment: Comment,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PingEvent {
    pub zen: String,
    pub hook_id: Option<u64>,
}

// ============================================================================
// Event kind
// ============================================================================

/// Tagged event payload, one variant per modelled webhook event type
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum EventKind {
    PullRequest(PullRequestEvent),
    Issues(IssuesEvent),
    IssueComment(IssueCommentEvent),
    PullRequestReview(PullRequestReviewEvent),
    PullRequestReviewComment(PullRequestReviewCommentEvent),
    Push(PushEvent),
    Create(RefEvent),
    Delete(RefEvent),
    Star(StarEvent),
    Release(ReleaseEvent),
    WorkflowJob(WorkflowJobEvent),
    Discussion(DiscussionEvent),
    DiscussionComment(DiscussionCommentEvent),
    Ping(PingEvent),
}

impl EventKind {
    /// Webhook event type names with a variant
    pub const SUPPORTED: [&'static str; 14] = [
        "pull_request",
        "issues",
        "issue_comment",
        "pull_request_review",
        "pull_request_review_comment",
        "push",
        "create",
        "delete",
        "star",
        "release",
        "workflow_job",
        "discussion",
        "discussion_comment",
        "ping",
    ];

    /// Webhook event type name
    pub fn event_type(&self) -> &'static str {
        match self {
            Self::PullRequest(_) => "pull_request",
            Self::Issues(_) => "issues",
            Self::IssueComment(_) => "issue_comment",
            Self::PullRequestReview(_) => "pull_request_review",
            Self::PullRequestReviewComment(_) => "pull_request_review_comment",
            Self::Push(_) => "push",
            Self::Create(_) => "create",
            Self::Delete(_) => "delete",
            Self::Star(_) => "star",
            Self::Release(_) => "release",
            Self::WorkflowJob(_) => "workflow_job",
            Self::Discussion(_) => "discussion",
            Self::DiscussionComment(_) => "discussion_comment",
            Self::Ping(_) => "ping",
        }
    }

    /// Action, for event types that carry one
    pub fn action(&self) -> Option<&str> {
        let action = match self {
            Self::PullRequest(e) => &e.action,
            Self::Issues(e) => &e.action,
            Self::IssueComment(e) => &e.action,
            Self::PullRequestReview(e) => &e.action,
            Self::PullRequestReviewComment(e) => &e.action,
            Self::Star(e) => &e.action,
            Self::Release(e) => &e.action,
            Self::WorkflowJob(e) => &e.action,
            Self::Discussion(e) => &e.action,
            Self::DiscussionComment(e) => &e.action,
            Self::Push(_) | Self::Create(_) | Self::Delete(_) | Self::Ping(_) => return None,
        };
        Some(action.as_str()).filter(|a| !a.is_empty())
    }

    /// Labels on the underlying issue or pull request
    ///
    /// `None` for event types that are never label-filtered.
    pub fn labels(&self) -> Option<Vec<&str>> {
        let labels = match self {
            Self::PullRequest(e) => &e.pull_request.labels,
            Self::Issues(e) => &e.issue.labels,
            Self::IssueComment(e) => &e.issue.labels,
            Self::PullRequestReview(e) => &e.pull_request.labels,
            Self::PullRequestReviewComment(e) => &e.pull_request.labels,
            _ => return None,
        };
        Some(labels.iter().map(|label| label.name.as_str()).collect())
    }

    /// Label applied by a `labeled` action
    pub fn applied_label(&self) -> Option<&str> {
        let label = match self {
            Self::PullRequest(e) if e.action == "labeled" => e.label.as_ref(),
            Self::Issues(e) if e.action == "labeled" => e.label.as_ref(),
            _ => None,
        };
        label.map(|l| l.name.as_str())
    }
}
