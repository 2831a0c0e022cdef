//! Progress reporting for audit runs.
//!
//! This module provides two modes of progress reporting:
//! - Interactive mode (TTY): progress bars using indicatif
//! - Logging mode (non-TTY): structured logging using tracing

mod interactive;
mod logging;

use std::sync::Arc;

use console::Term;
use starwatch::{AuditProgress, ProgressCallback};

use interactive::InteractiveReporter;
use logging::LoggingReporter;

/// Progress reporter that handles both interactive and logging modes.
pub enum ProgressReporter {
    /// Interactive progress bars for TTY.
    Interactive(InteractiveReporter),
    /// Structured logging for non-TTY (CI, pipes).
    Logging(LoggingReporter),
}

impl ProgressReporter {
    /// Create a new progress reporter, auto-detecting TTY mode.
    pub fn new() -> Self {
        if Term::stderr().is_term() {
            Self::Interactive(InteractiveReporter::new())
        } else {
            Self::Logging(LoggingReporter::new())
        }
    }

    /// Handle a progress event.
    pub fn handle(&self, event: AuditProgress) {
        match self {
            Self::Interactive(r) => r.handle(event),
            Self::Logging(r) => r.handle(event),
        }
    }

    /// Convert to a ProgressCallback for the library.
    pub fn as_callback(self: &Arc<Self>) -> ProgressCallback {
        let reporter = Arc::clone(self);
        Arc::new(move |event| reporter.handle(event))
    }

    /// Finish all progress bars (interactive mode only).
    pub fn finish(&self) {
        if let Self::Interactive(r) = self {
            r.finish();
        }
    }
}

impl Default for ProgressReporter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use starwatch::Stage;

    use super::*;

    fn events() -> Vec<AuditProgress> {
        vec![
            AuditProgress::StageStarted {
                stage: Stage::Repositories,
            },
            AuditProgress::FetchedPage {
                namespace: "octocat".to_string(),
                page: 1,
                count: 2,
                total_so_far: 2,
            },
            AuditProgress::RepositoriesListed {
                username: "octocat".to_string(),
                count: 2,
            },
            AuditProgress::CollectingStargazers {
                repositories: 2,
                concurrency: 1,
            },
            AuditProgress::RepositoryCollected {
                repository: "R1".to_string(),
                stargazers: 2,
            },
            AuditProgress::RateLimitBackoff {
                label: "R2".to_string(),
                wait: Duration::from_secs(30),
                attempt: 1,
            },
            AuditProgress::RepositoryFailed {
                repository: "R2".to_string(),
                error: "not found".to_string(),
            },
            AuditProgress::CollectionComplete {
                succeeded: 1,
                failed: 1,
            },
            AuditProgress::FollowListFetched {
                stage: Stage::Followers,
                count: 3,
            },
            AuditProgress::AuditComplete {
                username: "octocat".to_string(),
                repositories: 2,
                not_following_back: 1,
                not_followed_back: 1,
            },
        ]
    }

    #[test]
    fn logging_reporter_callback_accepts_every_event() {
        let reporter = Arc::new(ProgressReporter::Logging(LoggingReporter::new()));
        let callback = reporter.as_callback();
        for event in events() {
            callback(event);
        }
        reporter.finish();
    }

    #[test]
    fn interactive_reporter_survives_a_full_run() {
        let reporter = InteractiveReporter::new();
        for event in events() {
            reporter.handle(event);
        }
        reporter.finish();
    }
}
