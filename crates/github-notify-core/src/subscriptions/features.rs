//! # Feature Categories
//!
//! A subscription opts into a set of named event categories, stored as a
//! comma-separated list such as `pulls,issues,label:"bug"`. At most one
//! `label:"…"` token narrows label-aware categories to items carrying that
//! label.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

/// Features applied when a subscribe command does not name any
pub const DEFAULT_FEATURES: &str = "pulls,issues,creates,deletes";

/// The closed set of event categories a subscription can opt into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Feature {
    IssueCreations,
    Issues,
    Pulls,
    PullsMerged,
    PullsCreated,
    Pushes,
    Creates,
    Deletes,
    IssueComments,
    PullReviews,
    Stars,
    Releases,
    WorkflowFailure,
    WorkflowSuccess,
    Discussions,
    DiscussionComments,
}

impl Feature {
    /// Every feature, in documentation order
    pub const ALL: [Feature; 16] = [
        Feature::IssueCreations,
        Feature::Issues,
        Feature::Pulls,
        Feature::PullsMerged,
        Feature::PullsCreated,
        Feature::Pushes,
        Feature::Creates,
        Feature::Deletes,
        Feature::IssueComments,
        Feature::PullReviews,
        Feature::Stars,
        Feature::Releases,
        Feature::WorkflowFailure,
        Feature::WorkflowSuccess,
        Feature::Discussions,
        Feature::DiscussionComments,
    ];

    /// Get string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IssueCreations => "issue_creations",
            Self::Issues => "issues",
            Self::Pulls => "pulls",
            Self::PullsMerged => "pulls_merged",
            Self::PullsCreated => "pulls_created",
            Self::Pushes => "pushes",
            Self::Creates => "creates",
            Self::Deletes => "deletes",
            Self::IssueComments => "issue_comments",
            Self::PullReviews => "pull_reviews",
            Self::Stars => "stars",
            Self::Releases => "releases",
            Self::WorkflowFailure => "workflow_failure",
            Self::WorkflowSuccess => "workflow_success",
            Self::Discussions => "discussions",
            Self::DiscussionComments => "discussion_comments",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Feature {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|feature| feature.as_str() == s)
            .ok_or_else(|| FeatureError::InvalidFeatures {
                invalid: vec![s.to_string()],
            })
    }
}

/// Errors raised while validating a feature list
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FeatureError {
    #[error("Invalid feature(s) provided: {}", invalid.join(","))]
    InvalidFeatures { invalid: Vec<String> },

    #[error("Feature list must have \"pulls\", \"issues\" or \"issue_creations\" when using a label.")]
    LabelWithoutCategory,

    #[error("Feature list cannot contain both {first} and {second}")]
    Conflict { first: String, second: String },
}

/// Comma-separated feature list as stored on a subscription
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Features(String);

fn label_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r#"label:"([^"]*)""#).expect("label pattern is valid"))
}

impl Features {
    /// Wrap a raw feature list without validating it
    pub fn new(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    /// Parse and validate a feature list
    pub fn parse(raw: &str) -> Result<Self, FeatureError> {
        let features = Self::new(raw.trim());
        let tokens = features.tokens();
        check_feature_conflict(&tokens)?;
        validate_features(&tokens)?;
        Ok(features)
    }

    /// Individual comma-separated tokens, trimmed
    pub fn tokens(&self) -> Vec<&str> {
        self.0
            .split(',')
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .collect()
    }

    /// Check whether a feature is enabled
    pub fn contains(&self, feature: Feature) -> bool {
        self.tokens().iter().any(|token| *token == feature.as_str())
    }

    /// Label filter, if the list contains a `label:"…"` token
    pub fn label(&self) -> Option<&str> {
        label_pattern()
            .captures(&self.0)
            .and_then(|captures| captures.get(1))
            .map(|m| m.as_str())
            .filter(|label| !label.is_empty())
    }

    /// Markdown rendering: each token wrapped in backticks
    pub fn formatted(&self) -> String {
        format!("`{}`", self.tokens().join("`, `"))
    }

    /// True when no features are set
    pub fn is_empty(&self) -> bool {
        self.tokens().is_empty()
    }

    /// Get string representation
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Features {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Features {
    type Err = FeatureError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Ensure every token is a known feature or a label, and that a label
/// accompanies a label-aware category
pub fn validate_features(tokens: &[&str]) -> Result<(), FeatureError> {
    let mut invalid = Vec::new();
    let mut has_label = false;

    for token in tokens {
        if token.parse::<Feature>().is_ok() {
            continue;
        }
        if token.starts_with("label") {
            has_label = true;
            continue;
        }
        invalid.push(token.to_string());
    }

    if !invalid.is_empty() {
        return Err(FeatureError::InvalidFeatures { invalid });
    }

    if has_label {
        let label_aware = [Feature::Pulls, Feature::Issues, Feature::IssueCreations];
        let has_category = tokens
            .iter()
            .any(|token| label_aware.iter().any(|f| f.as_str() == *token));
        if !has_category {
            return Err(FeatureError::LabelWithoutCategory);
        }
    }

    Ok(())
}

/// Reject feature pairs whose meanings overlap
pub fn check_feature_conflict(tokens: &[&str]) -> Result<(), FeatureError> {
    const CONFLICTS: [(Feature, Feature); 3] = [
        (Feature::Issues, Feature::IssueCreations),
        (Feature::Pulls, Feature::PullsMerged),
        (Feature::Pulls, Feature::PullsCreated),
    ];

    for (first, second) in CONFLICTS {
        if tokens.contains(&first.as_str()) && tokens.contains(&second.as_str()) {
            return Err(FeatureError::Conflict {
                first: first.as_str().to_string(),
                second: second.as_str().to_string(),
            });
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "features_tests.rs"]
mod tests;
