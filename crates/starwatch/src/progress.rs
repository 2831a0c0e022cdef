//! Progress reporting types for audit runs.
//!
//! The library never prints. Callers that want feedback register a
//! [`ProgressCallback`] and decide how to surface each event.

use std::sync::Arc;
use std::time::Duration;

use crate::error::Stage;

/// Progress events emitted during an audit run.
#[derive(Debug, Clone)]
#[non_exhaustive]
pub enum AuditProgress {
    /// Quota preflight finished.
    RateLimitChecked {
        remaining: u64,
        limit: u64,
        reset_epoch_seconds: i64,
    },

    /// A run stage is starting.
    StageStarted { stage: Stage },

    /// Fetched one page for a paginated listing.
    FetchedPage {
        /// What is being paginated (an account or repository name).
        namespace: String,
        /// Page number (1-indexed).
        page: u32,
        /// Records on this page.
        count: usize,
        /// Running total of records so far.
        total_so_far: usize,
    },

    /// Repository listing is complete.
    RepositoriesListed { username: String, count: usize },

    /// Starting stargazer collection.
    CollectingStargazers { repositories: usize, concurrency: usize },

    /// All stargazers of one repository were collected.
    RepositoryCollected { repository: String, stargazers: usize },

    /// A repository's stargazers could not be collected.
    RepositoryFailed { repository: String, error: String },

    /// Stargazer collection finished.
    CollectionComplete { succeeded: usize, failed: usize },

    /// Waiting on an exhausted quota before retrying.
    RateLimitBackoff {
        label: String,
        wait: Duration,
        attempt: u32,
    },

    /// Retrying after a transient failure.
    TransientRetry {
        label: String,
        delay: Duration,
        attempt: u32,
        error: String,
    },

    /// Follow lists fetched.
    FollowListFetched { stage: Stage, count: usize },

    /// The report is ready.
    AuditComplete {
        username: String,
        repositories: usize,
        not_following_back: usize,
        not_followed_back: usize,
    },
}

/// Callback type for progress reporting.
///
/// Shared between concurrent repository tasks, hence the `Arc`.
pub type ProgressCallback = Arc<dyn Fn(AuditProgress) + Send + Sync>;

/// Emit a progress event if a callback is provided.
///
/// # Example
///
/// ```ignore
/// emit(on_progress, AuditProgress::StageStarted { stage: Stage::Followers });
/// ```
#[inline]
pub fn emit(on_progress: Option<&ProgressCallback>, event: AuditProgress) {
    if let Some(cb) = on_progress {
        cb(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn emit_with_none_is_noop() {
        emit(None, AuditProgress::StageStarted {
            stage: Stage::Repositories,
        });
    }

    #[test]
    fn emit_invokes_callback() {
        let events: Arc<Mutex<Vec<AuditProgress>>> = Arc::new(Mutex::new(Vec::new()));
        let captured = Arc::clone(&events);
        let callback: ProgressCallback = Arc::new(move |event| {
            captured
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .push(event);
        });

        emit(
            Some(&callback),
            AuditProgress::RepositoryCollected {
                repository: "hello-world".to_string(),
                stargazers: 3,
            },
        );

        let events = events.lock().unwrap_or_else(|e| e.into_inner());
        assert_eq!(events.len(), 1);
        assert!(matches!(
            &events[0],
            AuditProgress::RepositoryCollected { repository, stargazers: 3 } if repository == "hello-world"
        ));
    }
}
