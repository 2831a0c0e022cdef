//! Starwatch - GitHub account analytics.
//!
//! Lists a user's repositories, collects every repository's stargazers
//! concurrently, and compares the user's followers against the accounts they
//! follow. All calls share one quota tracker and go through a single retry
//! policy, so a run degrades into waiting rather than failing when GitHub's
//! rate limit is hit.
//!
//! # Example
//!
//! ```ignore
//! use std::time::Duration;
//!
//! let report = starwatch::run("octocat", Some(&token), 5, Some(Duration::from_secs(600))).await?;
//! for repo in &report.repositories {
//!     println!("{}: {} stargazers", repo.name, repo.stargazers.len());
//! }
//! println!("not following back: {:?}", report.follow_diff.not_following_back);
//! ```

pub mod collect;
pub mod error;
pub mod follow;
pub mod github;
pub mod http;
pub mod progress;
pub mod rate_limit;
pub mod report;
pub mod retry;

pub use collect::{Collection, DEFAULT_CONCURRENCY, RepositoryFailure, StargazerCollector};
pub use error::{ApiError, ErrorClass, RunError, Stage, short_error_message};
pub use follow::{FollowDiffReport, FollowSets, UsernameCase, UsernameSet, diff};
pub use github::{GitHubClient, PageLocator, PaginatedFetcher, Repository};
pub use http::{HttpTransport, ReqwestTransport};
pub use progress::{AuditProgress, ProgressCallback};
pub use rate_limit::{ApiRateLimiter, GITHUB_DEFAULT_RPS, RateLimitState, RateLimitTracker};
pub use report::{
    AuditOptions, FollowSource, Report, ReportAssembler, RepositoryReport, RepositoryStatus, run,
};
pub use retry::{RetryConfig, RetryPolicy};
