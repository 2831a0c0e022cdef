//! Concurrent stargazer collection.
//!
//! One task per repository, bounded by a semaphore. Each task walks the
//! repository's stargazer listing to the end before its result is merged, so a
//! repository is either complete or recorded as a failure; partial sets never
//! reach the caller.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use futures::TryStreamExt;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;

use crate::error::{ApiError, RunError, Stage, short_error_message};
use crate::follow::{UsernameCase, UsernameSet};
use crate::github::{GitHubClient, PaginatedFetcher, Repository, RepositoryListing, UserLoginParser};
use crate::progress::{AuditProgress, ProgressCallback, emit};
use crate::retry::RetryPolicy;

/// Default number of repositories collected in parallel.
pub const DEFAULT_CONCURRENCY: usize = 5;

/// A repository whose stargazers could not be collected.
#[derive(Debug)]
pub struct RepositoryFailure {
    pub repository: Repository,
    pub error: ApiError,
}

/// Outcome of a collection run.
#[derive(Debug, Default)]
pub struct Collection {
    /// Complete stargazer sets, keyed by repository. Iteration order is unspecified.
    pub stargazers: HashMap<Repository, UsernameSet>,
    /// Repositories that failed; their partial data was discarded.
    pub failures: Vec<RepositoryFailure>,
}

/// Collects stargazers for many repositories with bounded parallelism.
pub struct StargazerCollector {
    client: GitHubClient,
    retry: RetryPolicy,
    concurrency: usize,
    case: UsernameCase,
    on_progress: Option<ProgressCallback>,
}

impl StargazerCollector {
    pub fn new(client: GitHubClient, retry: RetryPolicy) -> Self {
        Self {
            client,
            retry,
            concurrency: DEFAULT_CONCURRENCY,
            case: UsernameCase::default(),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    #[must_use]
    pub fn with_case(mut self, case: UsernameCase) -> Self {
        self.case = case;
        self
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// Collect stargazers for every repository, with no deadline.
    pub async fn collect(&self, repositories: Vec<RepositoryListing>) -> Result<Collection, RunError> {
        self.collect_until(repositories, None).await
    }

    /// Collect stargazers for every repository, giving up at `deadline`.
    ///
    /// On expiry the remaining tasks are aborted and the error lists the
    /// repositories that did not finish.
    pub async fn collect_until(
        &self,
        repositories: Vec<RepositoryListing>,
        deadline: Option<Instant>,
    ) -> Result<Collection, RunError> {
        let mut collection = Collection::default();

        if repositories.is_empty() {
            return Ok(collection);
        }

        let concurrency = self.concurrency.clamp(1, repositories.len());
        let semaphore = Arc::new(Semaphore::new(concurrency));

        emit(
            self.on_progress.as_ref(),
            AuditProgress::CollectingStargazers {
                repositories: repositories.len(),
                concurrency,
            },
        );

        let mut pending: BTreeMap<String, Repository> = BTreeMap::new();
        let mut tasks = JoinSet::new();

        for listing in repositories {
            let RepositoryListing {
                repository,
                stargazers,
            } = listing;
            pending.insert(repository.name.clone(), repository.clone());

            let fetcher = PaginatedFetcher::new(
                self.client.clone(),
                self.retry.clone(),
                UserLoginParser::new(self.case),
                repository.name.clone(),
            )
            .with_progress(self.on_progress.clone());
            let semaphore = Arc::clone(&semaphore);

            tasks.spawn(async move {
                let _permit = match semaphore.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return (
                            repository,
                            Err(ApiError::internal("Semaphore closed unexpectedly")),
                        );
                    }
                };

                tracing::debug!(repository = %repository.name, "Collecting stargazers");
                let result = fetcher
                    .fetch_all(stargazers)
                    .try_collect::<UsernameSet>()
                    .await;
                (repository, result)
            });
        }

        loop {
            let joined = match deadline {
                Some(deadline) => match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                    Ok(joined) => joined,
                    Err(_) => {
                        tasks.abort_all();
                        let incomplete: Vec<String> = pending.into_keys().collect();
                        tracing::warn!(
                            incomplete = incomplete.len(),
                            "Stargazer collection timed out"
                        );
                        return Err(RunError::Timeout {
                            stage: Stage::Stargazers,
                            incomplete,
                        });
                    }
                },
                None => tasks.join_next().await,
            };

            let Some(joined) = joined else {
                break;
            };

            match joined {
                Ok((repository, Ok(stargazers))) => {
                    pending.remove(&repository.name);
                    emit(
                        self.on_progress.as_ref(),
                        AuditProgress::RepositoryCollected {
                            repository: repository.name.clone(),
                            stargazers: stargazers.len(),
                        },
                    );
                    collection.stargazers.insert(repository, stargazers);
                }
                Ok((repository, Err(error))) => {
                    pending.remove(&repository.name);
                    let message = short_error_message(&error);
                    emit(
                        self.on_progress.as_ref(),
                        AuditProgress::RepositoryFailed {
                            repository: repository.name.clone(),
                            error: message,
                        },
                    );
                    collection.failures.push(RepositoryFailure { repository, error });
                }
                Err(e) => {
                    // The repository stays pending and is reported below.
                    tracing::error!("Stargazer task panicked: {}", e);
                }
            }
        }

        for (_, repository) in pending {
            collection.failures.push(RepositoryFailure {
                repository,
                error: ApiError::internal("stargazer task did not complete"),
            });
        }
        collection
            .failures
            .sort_by(|a, b| a.repository.name.cmp(&b.repository.name));

        emit(
            self.on_progress.as_ref(),
            AuditProgress::CollectionComplete {
                succeeded: collection.stargazers.len(),
                failed: collection.failures.len(),
            },
        );

        Ok(collection)
    }
}
