//! # Feature/Flag Filter
//!
//! Pure predicate deciding whether a subscription wants an event. Rules, in
//! order:
//!
//! 1. The event must fall into a feature category the subscription enabled,
//!    and carry the subscription's label when it is label-scoped.
//! 2. `exclude_org_members` rejects events by organization members.
//! 3. `include_only_org_members` rejects events by non-members.
//! 4. Events on a repository in `exclude_repository` are rejected.

use crate::{
    subscriptions::{features::Feature, Subscription},
    webhook::{EventKind, NormalizedEvent},
};
use std::fmt;

/// Why a subscription did not match
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rejection {
    /// The event kind or action never produces a notification
    NotNotifiable,
    FeatureDisabled,
    LabelMismatch,
    ActorIsOrgMember,
    ActorNotOrgMember,
    RepositoryExcluded,
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let reason = match self {
            Self::NotNotifiable => "event is not notifiable",
            Self::FeatureDisabled => "feature not enabled",
            Self::LabelMismatch => "label filter not satisfied",
            Self::ActorIsOrgMember => "actor is an organization member",
            Self::ActorNotOrgMember => "actor is not an organization member",
            Self::RepositoryExcluded => "repository excluded",
        };
        f.write_str(reason)
    }
}

/// True when `subscription` should receive `event`
pub fn matches(subscription: &Subscription, event: &NormalizedEvent, actor_is_org_member: bool) -> bool {
    evaluate(subscription, event, actor_is_org_member).is_ok()
}

/// Like [`matches`], reporting the first rule that rejected the event
pub fn evaluate(
    subscription: &Subscription,
    event: &NormalizedEvent,
    actor_is_org_member: bool,
) -> Result<(), Rejection> {
    let admitting = admitting_features(&event.kind);
    if admitting.is_empty() {
        return Err(Rejection::NotNotifiable);
    }

    if !admitting
        .iter()
        .any(|feature| subscription.features.contains(*feature))
    {
        return Err(Rejection::FeatureDisabled);
    }

    if let Some(label) = subscription.label() {
        if !carries_label(&event.kind, label) {
            return Err(Rejection::LabelMismatch);
        }
    }

    let flags = &subscription.flags;
    if flags.exclude_org_members && actor_is_org_member {
        return Err(Rejection::ActorIsOrgMember);
    }

    if flags.include_only_org_members && !actor_is_org_member {
        return Err(Rejection::ActorNotOrgMember);
    }

    if let Some(full_name) = event.repository_name() {
        if flags.excludes(full_name) {
            return Err(Rejection::RepositoryExcluded);
        }
    }

    Ok(())
}

/// Features that admit the event; empty when it never notifies
pub fn admitting_features(kind: &EventKind) -> Vec<Feature> {
    use Feature::*;

    match kind {
        EventKind::PullRequest(e) => match e.action.as_str() {
            "opened" if e.pull_request.draft => vec![],
            "opened" => vec![Pulls, PullsCreated],
            "reopened" | "ready_for_review" | "labeled" | "synchronize" => vec![Pulls],
            "closed" if e.pull_request.merged => vec![Pulls, PullsMerged],
            "closed" => vec![Pulls],
            _ => vec![],
        },
        EventKind::Issues(e) => match e.action.as_str() {
            "opened" => vec![Issues, IssueCreations],
            "closed" | "reopened" | "labeled" => vec![Issues],
            _ => vec![],
        },
        EventKind::IssueComment(e) if e.action == "created" => vec![IssueComments],
        EventKind::PullRequestReview(e) if e.action == "submitted" => vec![PullReviews],
        EventKind::PullRequestReviewComment(e) if e.action == "created" => vec![PullReviews],
        EventKind::Push(e) if !e.commits.is_empty() => vec![Pushes],
        EventKind::Create(_) => vec![Creates],
        EventKind::Delete(_) => vec![Deletes],
        EventKind::Star(_) => vec![Stars],
        EventKind::Release(e) => match e.action.as_str() {
            "created" | "published" | "deleted" => vec![Releases],
            _ => vec![],
        },
        EventKind::WorkflowJob(e) if e.action == "completed" => {
            match e.workflow_job.conclusion.as_deref() {
                Some("success") => vec![WorkflowSuccess],
                Some("failure") => vec![WorkflowFailure],
                _ => vec![],
            }
        }
        EventKind::Discussion(e) if e.action == "created" => vec![Discussions],
        EventKind::DiscussionComment(e) if e.action == "created" => vec![DiscussionComments],
        _ => vec![],
    }
}

/// Label check for label-scoped subscriptions
///
/// Event kinds without labels pass. For a `labeled` action the label just
/// applied must be the subscription's label; otherwise the item must carry it.
fn carries_label(kind: &EventKind, label: &str) -> bool {
    let Some(labels) = kind.labels() else {
        return true;
    };

    match kind.applied_label() {
        Some(applied) => applied == label,
        None => labels.contains(&label),
    }
}

#[cfg(test)]
#[path = "filter_tests.rs"]
mod tests;
