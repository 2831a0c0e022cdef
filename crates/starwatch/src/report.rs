//! Audit orchestration and the final report.
//!
//! A run goes: quota preflight (optional) → repository listing → stargazer
//! collection → followers → following → diff. Any stage failing terminally
//! aborts the run with a [`RunError`] naming the stage; a single repository
//! failing only marks that repository in the report.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::collect::{DEFAULT_CONCURRENCY, StargazerCollector};
use crate::error::{RunError, Stage, short_error_message};
use crate::follow::{FollowDiffReport, FollowSets, UsernameCase, UsernameSet};
use crate::github::{
    GitHubClient, PaginatedFetcher, ProfileHtmlParser, RepositoryParser, UserLoginParser,
};
use crate::http::{DEFAULT_REQUEST_TIMEOUT, ReqwestTransport};
use crate::progress::{AuditProgress, ProgressCallback, emit};
use crate::rate_limit::{RateLimitState, RateLimitTracker};
use crate::retry::{RetryConfig, RetryPolicy};

/// Where follower and following lists are read from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FollowSource {
    /// REST API `/users/{user}/followers` and `/following`.
    #[default]
    Api,
    /// The `?tab=followers` / `?tab=following` profile pages.
    Html,
}

/// Options for one audit run.
#[derive(Debug, Clone)]
pub struct AuditOptions {
    /// Repositories collected in parallel.
    pub concurrency: usize,
    /// Overall time budget for the run.
    pub timeout: Option<Duration>,
    pub follow_source: FollowSource,
    /// Normalization applied to every username before comparison.
    pub case: UsernameCase,
    pub retry: RetryConfig,
    /// Query `/rate_limit` first when no quota has been observed yet.
    pub preflight: bool,
}

impl Default for AuditOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout: None,
            follow_source: FollowSource::default(),
            case: UsernameCase::default(),
            retry: RetryConfig::default(),
            preflight: true,
        }
    }
}

/// Collection outcome for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RepositoryStatus {
    Complete,
    /// Stargazers could not be collected; the set in the report is empty.
    Failed { error: String },
}

/// One repository in the report.
#[derive(Debug, Clone, Serialize)]
pub struct RepositoryReport {
    pub name: String,
    /// Star count declared by the repository listing.
    pub star_count: u64,
    #[serde(flatten)]
    pub status: RepositoryStatus,
    pub stargazers: UsernameSet,
}

impl RepositoryReport {
    pub fn is_complete(&self) -> bool {
        self.status == RepositoryStatus::Complete
    }
}

/// The assembled audit report.
#[derive(Debug, Clone, Serialize)]
pub struct Report {
    pub username: String,
    pub generated_at: DateTime<Utc>,
    /// Sorted by repository name.
    pub repositories: Vec<RepositoryReport>,
    pub follow: FollowSets,
    pub follow_diff: FollowDiffReport,
    /// Last quota snapshot observed during the run.
    pub rate_limit: Option<RateLimitState>,
}

impl Report {
    pub fn repository(&self, name: &str) -> Option<&RepositoryReport> {
        self.repositories.iter().find(|r| r.name == name)
    }

    /// Repositories whose stargazers could not be collected.
    pub fn failed_repositories(&self) -> impl Iterator<Item = &RepositoryReport> {
        self.repositories.iter().filter(|r| !r.is_complete())
    }

    /// Total collected stargazers across all repositories.
    pub fn total_stargazers(&self) -> usize {
        self.repositories.iter().map(|r| r.stargazers.len()).sum()
    }
}

/// Bound `fut` by the run deadline.
async fn within<T>(deadline: Option<Instant>, stage: Stage, fut: impl Future<Output = T>) -> Result<T, RunError> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.map_err(|_| {
            tracing::warn!(stage = %stage, "Audit timed out");
            RunError::Timeout {
                stage,
                incomplete: Vec::new(),
            }
        }),
        None => Ok(fut.await),
    }
}

/// Sequences an audit run and folds the results into a [`Report`].
pub struct ReportAssembler {
    client: GitHubClient,
    options: AuditOptions,
    on_progress: Option<ProgressCallback>,
}

impl ReportAssembler {
    pub fn new(client: GitHubClient, options: AuditOptions) -> Self {
        Self {
            client,
            options,
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    pub fn options(&self) -> &AuditOptions {
        &self.options
    }

    fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.options.retry.clone(), Arc::clone(self.client.tracker()))
            .with_progress(self.on_progress.clone())
    }

    fn stage_started(&self, stage: Stage) {
        emit(self.on_progress.as_ref(), AuditProgress::StageStarted { stage });
    }

    /// Run a full audit of `username`.
    pub async fn run(&self, username: &str) -> Result<Report, RunError> {
        let username = username.trim();
        if username.is_empty() {
            return Err(RunError::Config {
                message: "username must not be empty".to_string(),
            });
        }

        let deadline = self.options.timeout.map(|t| Instant::now() + t);
        let retry = self.retry_policy();

        if self.options.preflight && !self.client.tracker().has_snapshot().await {
            self.preflight(&retry, deadline).await?;
        }

        // Repositories
        self.stage_started(Stage::Repositories);
        let listings = within(deadline, Stage::Repositories, async {
            PaginatedFetcher::new(
                self.client.clone(),
                retry.clone(),
                RepositoryParser::new(username, self.client.api_url().clone()),
                username,
            )
            .with_progress(self.on_progress.clone())
            .collect_all(self.client.user_repos(username))
            .await
        })
        .await?
        .map_err(|e| RunError::stage(Stage::Repositories, e))?;

        emit(
            self.on_progress.as_ref(),
            AuditProgress::RepositoriesListed {
                username: username.to_string(),
                count: listings.len(),
            },
        );

        // Stargazers
        self.stage_started(Stage::Stargazers);
        let collection = StargazerCollector::new(self.client.clone(), retry.clone())
            .with_concurrency(self.options.concurrency)
            .with_case(self.options.case)
            .with_progress(self.on_progress.clone())
            .collect_until(listings, deadline)
            .await?;

        let mut repositories: Vec<RepositoryReport> = collection
            .stargazers
            .into_iter()
            .map(|(repository, stargazers)| RepositoryReport {
                name: repository.name,
                star_count: repository.star_count,
                status: RepositoryStatus::Complete,
                stargazers,
            })
            .chain(collection.failures.into_iter().map(|failure| RepositoryReport {
                name: failure.repository.name,
                star_count: failure.repository.star_count,
                status: RepositoryStatus::Failed {
                    error: short_error_message(&failure.error),
                },
                stargazers: UsernameSet::new(),
            }))
            .collect();
        repositories.sort_by(|a, b| a.name.cmp(&b.name));

        // Follow graph
        let followers = self
            .follow_list(&retry, username, Stage::Followers, deadline)
            .await?;
        let following = self
            .follow_list(&retry, username, Stage::Following, deadline)
            .await?;

        let follow = FollowSets {
            followers,
            following,
        };
        let follow_diff = follow.diff();

        emit(
            self.on_progress.as_ref(),
            AuditProgress::AuditComplete {
                username: username.to_string(),
                repositories: repositories.len(),
                not_following_back: follow_diff.not_following_back.len(),
                not_followed_back: follow_diff.not_followed_back.len(),
            },
        );

        Ok(Report {
            username: username.to_string(),
            generated_at: Utc::now(),
            repositories,
            follow,
            follow_diff,
            rate_limit: self.client.tracker().snapshot().await,
        })
    }

    /// Seed the quota tracker. Failures are logged and the run continues.
    async fn preflight(&self, retry: &RetryPolicy, deadline: Option<Instant>) -> Result<(), RunError> {
        self.stage_started(Stage::Preflight);

        let outcome = within(
            deadline,
            Stage::Preflight,
            retry.execute("rate_limit", || {
                let client = self.client.clone();
                async move { client.rate_limit().await }
            }),
        )
        .await?;

        match outcome {
            Ok(limits) => {
                let core = limits.resources.core;
                emit(
                    self.on_progress.as_ref(),
                    AuditProgress::RateLimitChecked {
                        remaining: core.remaining,
                        limit: core.limit,
                        reset_epoch_seconds: core.reset,
                    },
                );
            }
            Err(e) => {
                tracing::warn!(error = %short_error_message(&e), "Rate limit preflight failed, continuing");
            }
        }

        Ok(())
    }

    async fn follow_list(
        &self,
        retry: &RetryPolicy,
        username: &str,
        stage: Stage,
        deadline: Option<Instant>,
    ) -> Result<UsernameSet, RunError> {
        self.stage_started(stage);

        let tab = match stage {
            Stage::Following => "following",
            _ => "followers",
        };
        let namespace = format!("{username}/{tab}");

        let stream = match self.options.follow_source {
            FollowSource::Api => {
                let first = match stage {
                    Stage::Following => self.client.following(username),
                    _ => self.client.followers(username),
                };
                PaginatedFetcher::new(
                    self.client.clone(),
                    retry.clone(),
                    UserLoginParser::new(self.options.case),
                    namespace,
                )
                .with_progress(self.on_progress.clone())
                .fetch_all(first)
            }
            FollowSource::Html => PaginatedFetcher::new(
                self.client.clone(),
                retry.clone(),
                ProfileHtmlParser::new(self.options.case),
                namespace,
            )
            .with_progress(self.on_progress.clone())
            .fetch_all(self.client.profile_tab(username, tab)),
        };

        let users = within(deadline, stage, stream.try_collect::<UsernameSet>())
            .await?
            .map_err(|e| RunError::stage(stage, e))?;

        emit(
            self.on_progress.as_ref(),
            AuditProgress::FollowListFetched {
                stage,
                count: users.len(),
            },
        );

        Ok(users)
    }
}

/// Audit `username` against github.com with default options.
///
/// `credential` is a personal access token; without one the anonymous quota
/// applies. `timeout` bounds the whole run.
pub async fn run(
    username: &str,
    credential: Option<&str>,
    concurrency_limit: usize,
    timeout: Option<Duration>,
) -> Result<Report, RunError> {
    let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT).map_err(|e| {
        RunError::Config {
            message: e.to_string(),
        }
    })?;
    let client = GitHubClient::new(
        Arc::new(transport),
        credential,
        Arc::new(RateLimitTracker::new()),
    )
    .map_err(|e| RunError::Config {
        message: e.to_string(),
    })?;

    let options = AuditOptions {
        concurrency: concurrency_limit,
        timeout,
        ..AuditOptions::default()
    };

    ReportAssembler::new(client, options).run(username).await
}
