//! Follow-graph comparison.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

/// A set of usernames, ordered for stable output.
pub type UsernameSet = BTreeSet<String>;

/// How usernames are normalized before they enter a set.
///
/// GitHub logins are case-insensitive, but the comparison itself is exact, so
/// any folding happens while records are parsed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsernameCase {
    /// Keep logins as returned.
    #[default]
    Exact,
    /// Lowercase every login.
    Lowercase,
}

impl UsernameCase {
    pub fn apply(self, login: &str) -> String {
        match self {
            UsernameCase::Exact => login.to_string(),
            UsernameCase::Lowercase => login.to_lowercase(),
        }
    }
}

/// Followers and followings of one account.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FollowSets {
    pub followers: UsernameSet,
    pub following: UsernameSet,
}

impl FollowSets {
    pub fn diff(&self) -> FollowDiffReport {
        diff(&self.followers, &self.following)
    }
}

/// Asymmetric differences between followers and followings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FollowDiffReport {
    /// Accounts the user follows that do not follow back.
    pub not_following_back: UsernameSet,
    /// Accounts following the user that the user does not follow.
    pub not_followed_back: UsernameSet,
}

impl FollowDiffReport {
    pub fn is_empty(&self) -> bool {
        self.not_following_back.is_empty() && self.not_followed_back.is_empty()
    }
}

/// Compare a follower set against a following set.
///
/// Exact string comparison; no normalization is applied here.
pub fn diff(followers: &UsernameSet, following: &UsernameSet) -> FollowDiffReport {
    FollowDiffReport {
        not_following_back: following.difference(followers).cloned().collect(),
        not_followed_back: followers.difference(following).cloned().collect(),
    }
}
