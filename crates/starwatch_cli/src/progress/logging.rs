use starwatch::AuditProgress;

/// Logging reporter using tracing for structured output.
pub struct LoggingReporter;

impl LoggingReporter {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, event: AuditProgress) {
        match event {
            AuditProgress::RateLimitChecked {
                remaining,
                limit,
                reset_epoch_seconds,
            } => {
                tracing::info!(remaining, limit, reset_epoch_seconds, "Rate limit checked");
            }

            AuditProgress::StageStarted { stage } => {
                tracing::debug!(stage = %stage, "Stage started");
            }

            AuditProgress::FetchedPage {
                namespace,
                page,
                count,
                total_so_far,
            } => {
                tracing::debug!(namespace = %namespace, page, count, total_so_far, "Fetched page");
            }

            AuditProgress::RepositoriesListed { username, count } => {
                tracing::info!(username = %username, count, "Repositories listed");
            }

            AuditProgress::CollectingStargazers {
                repositories,
                concurrency,
            } => {
                tracing::info!(repositories, concurrency, "Collecting stargazers");
            }

            AuditProgress::RepositoryCollected {
                repository,
                stargazers,
            } => {
                tracing::info!(repo = %repository, stargazers, "Collected stargazers");
            }

            AuditProgress::RepositoryFailed { repository, error } => {
                tracing::warn!(repo = %repository, error = %error, "Failed to collect stargazers");
            }

            AuditProgress::CollectionComplete { succeeded, failed } => {
                tracing::info!(succeeded, failed, "Stargazer collection complete");
            }

            AuditProgress::RateLimitBackoff {
                label,
                wait,
                attempt,
            } => {
                tracing::warn!(
                    label = %label,
                    wait_secs = wait.as_secs(),
                    attempt,
                    "Rate limited, waiting for quota reset"
                );
            }

            AuditProgress::TransientRetry {
                label,
                delay,
                attempt,
                error,
            } => {
                tracing::warn!(
                    label = %label,
                    delay_ms = delay.as_millis() as u64,
                    attempt,
                    error = %error,
                    "Retrying after transient error"
                );
            }

            AuditProgress::FollowListFetched { stage, count } => {
                tracing::info!(stage = %stage, count, "Follow list fetched");
            }

            AuditProgress::AuditComplete {
                username,
                repositories,
                not_following_back,
                not_followed_back,
            } => {
                tracing::info!(
                    username = %username,
                    repositories,
                    not_following_back,
                    not_followed_back,
                    "Audit complete"
                );
            }

            _ => {}
        }
    }
}

impl Default for LoggingReporter {
    fn default() -> Self {
        Self::new()
    }
}
