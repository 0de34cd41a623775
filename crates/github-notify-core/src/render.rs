//! # Notification Rendering
//!
//! Turns a (subscription, event) pair into a Markdown post. Rendering is a
//! pure function: the actor's chat username is resolved beforehand through a
//! [`UsernameResolver`](crate::chat::UsernameResolver) and handed in via
//! [`RenderContext`].
//!
//! Every event renders to three parts: a one-line summary, a header block
//! and an optional body. The subscription's [`RenderStyle`] picks which of
//! them end up in the post.

use crate::{
    subscriptions::Subscription,
    webhook::{Account, EventKind, NormalizedEvent},
};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Verbosity of a rendered notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RenderStyle {
    /// Header and full body
    #[default]
    Default,
    /// Header only
    SkipBody,
    /// Single compact line
    Collapsed,
}

impl RenderStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::SkipBody => "skip-body",
            Self::Collapsed => "collapsed",
        }
    }
}

impl fmt::Display for RenderStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RenderStyle {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "" | "default" => Ok(Self::Default),
            "skip-body" => Ok(Self::SkipBody),
            "collapsed" => Ok(Self::Collapsed),
            other => Err(format!("unknown render style '{}'", other)),
        }
    }
}

// Stored records use "" for the default style and may hold values this
// version does not know; both read back as `Default`.
impl From<String> for RenderStyle {
    fn from(value: String) -> Self {
        value.parse().unwrap_or_default()
    }
}

impl From<RenderStyle> for String {
    fn from(style: RenderStyle) -> Self {
        match style {
            RenderStyle::Default => String::new(),
            other => other.as_str().to_string(),
        }
    }
}

/// Values resolved before rendering
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RenderContext {
    /// Chat username of the event's actor, when they connected their account
    pub actor_username: Option<String>,
}

impl RenderContext {
    pub fn with_actor_username(username: impl Into<String>) -> Self {
        Self {
            actor_username: Some(username.into()),
        }
    }
}

/// The three renderings of one event
#[derive(Debug, Clone, PartialEq, Eq)]
struct Parts {
    summary: String,
    header: String,
    body: Option<String>,
}

impl Parts {
    fn new(summary: String, header: String, body: Option<&str>) -> Self {
        let body = body
            .map(str::trim)
            .filter(|body| !body.is_empty())
            .map(str::to_string);
        Self {
            summary,
            header,
            body,
        }
    }
}

/// Stateless Markdown renderer
#[derive(Debug, Clone, Copy, Default)]
pub struct Renderer;

impl Renderer {
    pub fn new() -> Self {
        Self
    }

    /// Render the post for one matched subscription
    pub fn render(
        &self,
        subscription: &Subscription,
        event: &NormalizedEvent,
        context: &RenderContext,
    ) -> String {
        render(subscription, event, context)
    }
}

/// Render the post for one matched subscription
pub fn render(subscription: &Subscription, event: &NormalizedEvent, context: &RenderContext) -> String {
    let parts = parts(event, context);

    match subscription.render_style() {
        RenderStyle::Collapsed => parts.summary,
        RenderStyle::SkipBody => parts.header,
        RenderStyle::Default => match parts.body {
            Some(body) => format!("{}\n\n{}", parts.header, body),
            None => parts.header,
        },
    }
}

fn link(text: &str, url: &str) -> String {
    if url.is_empty() {
        text.to_string()
    } else {
        format!("[{}]({})", text, url)
    }
}

fn mention(account: Option<&Account>, context: &RenderContext) -> String {
    if let Some(username) = &context.actor_username {
        return format!("@{}", username);
    }
    match account {
        Some(account) if !account.login.is_empty() => link(&account.login, &account.html_url),
        _ => "someone".to_string(),
    }
}

fn parts(event: &NormalizedEvent, context: &RenderContext) -> Parts {
    let (repo_name, repo_url) = event
        .repository
        .as_ref()
        .map(|r| (r.full_name.as_str(), r.html_url.as_str()))
        .unwrap_or(("", ""));
    let repo = link(&format!("\\[{}\\]", repo_name), repo_url);
    let actor = mention(event.actor.as_ref(), context);

    match &event.kind {
        EventKind::PullRequest(e) => {
            let pr = &e.pull_request;
            let verb = match e.action.as_str() {
                "closed" if pr.merged => "merged".to_string(),
                "ready_for_review" => "marked ready for review".to_string(),
                "synchronize" => "updated".to_string(),
                "labeled" => format!(
                    "labeled `{}`",
                    e.label.as_ref().map(|l| l.name.as_str()).unwrap_or_default()
                ),
                other => other.to_string(),
            };
            let item = link(&format!("#{} {}", pr.number, pr.title), &pr.html_url);
            let tag = match e.action.as_str() {
                "opened" => "#new-pull-request".to_string(),
                "closed" if pr.merged => "#merged-pull-request".to_string(),
                _ => format!("#pull-request-{}", e.action.replace('_', "-")),
            };
            Parts::new(
                format!("{} Pull request {} was {} by {}.", repo, item, verb, actor),
                format!(
                    "#### {}\n##### {}\n{} by {}",
                    pr.title,
                    link(&format!("{}#{}", repo_name, pr.number), &pr.html_url),
                    tag,
                    actor
                ),
                if e.action == "opened" { pr.body.as_deref() } else { None },
            )
        }
        EventKind::Issues(e) => {
            let issue = &e.issue;
            let verb = match e.action.as_str() {
                "labeled" => format!(
                    "labeled `{}`",
                    e.label.as_ref().map(|l| l.name.as_str()).unwrap_or_default()
                ),
                other => other.to_string(),
            };
            let item = link(&format!("#{} {}", issue.number, issue.title), &issue.html_url);
            Parts::new(
                format!("{} Issue {} was {} by {}.", repo, item, verb, actor),
                format!(
                    "#### {}\n##### {}\n#issue-{} by {}",
                    issue.title,
                    link(&format!("{}#{}", repo_name, issue.number), &issue.html_url),
                    e.action.replace('_', "-"),
                    actor
                ),
                if e.action == "opened" { issue.body.as_deref() } else { None },
            )
        }
        EventKind::IssueComment(e) => {
            let noun = if e.issue.is_pull_request() { "pull request" } else { "issue" };
            let item = link(&format!("#{} {}", e.issue.number, e.issue.title), &e.issue.html_url);
            Parts::new(
                format!("{} New comment by {} on {} {}.", repo, actor, noun, item),
                format!(
                    "{} New comment by {} on {} {}:",
                    repo,
                    actor,
                    noun,
                    link(&format!("#{} {}", e.issue.number, e.issue.title), &e.comment.html_url)
                ),
                Some(e.comment.body.as_str()),
            )
        }
        EventKind::PullRequestReview(e) => {
            let pr = &e.pull_request;
            let verdict = match e.review.state.to_ascii_lowercase().as_str() {
                "approved" => "approved",
                "changes_requested" => "requested changes on",
                _ => "commented on",
            };
            let item = link(&format!("#{} {}", pr.number, pr.title), &e.review.html_url);
            let line = format!("{} {} {} pull request {}.", repo, actor, verdict, item);
            Parts::new(line.clone(), line, e.review.body.as_deref())
        }
        EventKind::PullRequestReviewComment(e) => {
            let pr = &e.pull_request;
            let item = link(&format!("#{} {}", pr.number, pr.title), &e.comment.html_url);
            let line = format!("{} New review comment by {} on {}:", repo, actor, item);
            Parts::new(line.clone(), line, Some(e.comment.body.as_str()))
        }
        EventKind::Push(e) => {
            let count = e.commits.len();
            let noun = if count == 1 { "commit" } else { "commits" };
            let pushed = link(&format!("pushed {} {}", count, noun), &e.compare);
            let forced = if e.forced { "force-" } else { "" };
            let summary = format!(
                "{} {} {}{} to `{}`.",
                repo,
                actor,
                forced,
                pushed,
                e.ref_name()
            );
            let commits: Vec<String> = e
                .commits
                .iter()
                .map(|c| {
                    format!(
                        "{} {} - {}",
                        link(&format!("`{}`", c.short_id()), &c.url),
                        c.summary(),
                        c.author.name
                    )
                })
                .collect();
            let header = format!("{}\n{}", summary, commits.join("\n"));
            Parts::new(summary, header.trim_end().to_string(), None)
        }
        EventKind::Create(e) => {
            let line = format!("{} New {} `{}` was created by {}.", repo, e.ref_type, e.git_ref, actor);
            Parts::new(line.clone(), line, None)
        }
        EventKind::Delete(e) => {
            let line = format!("{} {} `{}` was deleted by {}.", repo, capitalize(&e.ref_type), e.git_ref, actor);
            Parts::new(line.clone(), line, None)
        }
        EventKind::Star(e) => {
            let verb = if e.action == "deleted" { "unstarred" } else { "starred" };
            let line = format!("{} A repository was {} by {}.", repo, verb, actor);
            Parts::new(line.clone(), line, None)
        }
        EventKind::Release(e) => {
            let release = &e.release;
            let name = release
                .name
                .as_deref()
                .filter(|n| !n.is_empty())
                .unwrap_or(&release.tag_name);
            let line = format!(
                "{} Release {} was {} by {}.",
                repo,
                link(name, &release.html_url),
                e.action,
                actor
            );
            Parts::new(line.clone(), line, release.body.as_deref())
        }
        EventKind::WorkflowJob(e) => {
            let job = &e.workflow_job;
            let outcome = match job.conclusion.as_deref() {
                Some("success") => "succeeded",
                Some("failure") => "failed",
                Some(other) => other,
                None => "finished",
            };
            let workflow = job.workflow_name.as_deref().unwrap_or(&job.name);
            let branch = job
                .head_branch
                .as_deref()
                .map(|b| format!(" on `{}`", b))
                .unwrap_or_default();
            let line = format!(
                "{} {} job {}{} {} (triggered by {}).",
                repo,
                workflow,
                link(&job.name, &job.html_url),
                branch,
                outcome,
                actor
            );
            Parts::new(line.clone(), line, None)
        }
        EventKind::Discussion(e) => {
            let d = &e.discussion;
            let item = link(&format!("#{} {}", d.number, d.title), &d.html_url);
            let category = if d.category.name.is_empty() {
                String::new()
            } else {
                format!(" in {}", d.category.name)
            };
            Parts::new(
                format!("{} Discussion {} was {} by {}.", repo, item, e.action, actor),
                format!("{} New discussion {}{} was {} by {}.", repo, item, category, e.action, actor),
                if e.action == "created" { d.body.as_deref() } else { None },
            )
        }
        EventKind::DiscussionComment(e) => {
            let d = &e.discussion;
            let item = link(&format!("#{} {}", d.number, d.title), &e.comment.html_url);
            let line = format!("{} New comment by {} on discussion {}:", repo, actor, item);
            Parts::new(line.clone(), line, Some(e.comment.body.as_str()))
        }
        EventKind::Ping(e) => {
            let line = format!("{} Webhook ping received: {}", repo, e.zen);
            Parts::new(line.clone(), line, None)
        }
    }
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

#[cfg(test)]
#[path = "render_tests.rs"]
mod tests;
