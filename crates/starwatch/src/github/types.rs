//! GitHub API data types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::pagination::PageLocator;

/// A user entry from the followers, following, or stargazers endpoints.
///
/// Only `login` is read. It is optional so that a single malformed entry can
/// be skipped instead of failing the whole page.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiUser {
    #[serde(default)]
    pub login: Option<String>,
}

/// A repository entry from `/users/{user}/repos`.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiRepository {
    pub name: String,
    #[serde(default)]
    pub stargazers_count: u64,
    #[serde(default)]
    pub stargazers_url: Option<String>,
}

/// A repository owned by the audited account.
///
/// Identity is the name, which is unique per account.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Repository {
    pub name: String,
    /// Star count as declared by the listing endpoint.
    pub star_count: u64,
}

/// A repository together with the locator of its first stargazer page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryListing {
    pub repository: Repository,
    pub stargazers: PageLocator,
}

/// A single rate limit resource entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateLimitResource {
    /// Maximum requests allowed per period.
    pub limit: u64,
    /// Requests used in current period.
    #[serde(default)]
    pub used: u64,
    /// Remaining requests in current period.
    pub remaining: u64,
    /// Unix timestamp when the rate limit resets.
    pub reset: i64,
}

impl RateLimitResource {
    /// Get the reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset, 0).unwrap_or_else(Utc::now)
    }
}

/// The rate limit resources starwatch cares about.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResources {
    /// Core API rate limit (non-search REST endpoints).
    pub core: RateLimitResource,
    /// Search API rate limit.
    #[serde(default)]
    pub search: Option<RateLimitResource>,
}

/// Response body of `GET /rate_limit`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitResponse {
    pub resources: RateLimitResources,
}
