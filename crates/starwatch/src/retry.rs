//! Retry policy for GitHub calls.
//!
//! Failures are split three ways by [`ApiError::class`]:
//!
//! - transient failures back off exponentially within a fixed attempt budget
//! - quota exhaustion waits on the shared [`RateLimitTracker`] and never
//!   spends that budget
//! - everything else is surfaced immediately

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};

use crate::error::{ApiError, ErrorClass, Result, short_error_message};
use crate::progress::{AuditProgress, ProgressCallback, emit};
use crate::rate_limit::{RateLimitState, RateLimitTracker};

/// Initial backoff delay in milliseconds.
pub const INITIAL_BACKOFF_MS: u64 = 1000;

/// Maximum backoff delay in milliseconds.
pub const MAX_BACKOFF_MS: u64 = 60_000;

/// Total attempts for a transient failure, including the first.
pub const MAX_ATTEMPTS: u32 = 5;

/// Configuration for retry operations.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Maximum number of attempts for transient failures, including the first.
    pub max_attempts: u32,
    /// Whether to add jitter to delays.
    pub with_jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_delay: Duration::from_millis(INITIAL_BACKOFF_MS),
            max_delay: Duration::from_millis(MAX_BACKOFF_MS),
            max_attempts: MAX_ATTEMPTS,
            with_jitter: false,
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration with custom values.
    #[must_use]
    pub fn new(base_delay: Duration, max_delay: Duration, max_attempts: u32) -> Self {
        Self {
            base_delay,
            max_delay,
            max_attempts,
            with_jitter: false,
        }
    }

    /// Set whether to use jitter.
    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.with_jitter = jitter;
        self
    }

    /// Build an exponential backoff strategy from this configuration.
    ///
    /// The strategy yields one delay per retry, so `max_attempts - 1` in total.
    #[must_use]
    pub fn into_backoff(self) -> ExponentialBuilder {
        let retries = self.max_attempts.saturating_sub(1) as usize;
        let mut builder = ExponentialBuilder::default()
            .with_min_delay(self.base_delay)
            .with_max_delay(self.max_delay)
            .with_factor(2.0)
            .with_max_times(retries);

        if self.with_jitter {
            builder = builder.with_jitter();
        }

        builder
    }
}

/// Wraps each network call with classification-driven retries.
#[derive(Clone)]
pub struct RetryPolicy {
    config: RetryConfig,
    tracker: Arc<RateLimitTracker>,
    on_progress: Option<ProgressCallback>,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig, tracker: Arc<RateLimitTracker>) -> Self {
        Self {
            config,
            tracker,
            on_progress: None,
        }
    }

    /// Attach a progress callback for backoff events.
    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    /// The delays a transient failure would go through, in order.
    pub fn transient_delays(&self) -> Vec<Duration> {
        self.config.clone().into_backoff().build().collect()
    }

    /// Run `call` until it succeeds or fails terminally.
    ///
    /// Every attempt first waits on the shared quota. `label` names the call in
    /// logs and progress events.
    pub async fn execute<T, F, Fut>(&self, label: &str, mut call: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut backoff = self.config.clone().into_backoff().build();
        let mut attempt: u32 = 0;
        let mut rate_limit_waits: u32 = 0;

        loop {
            self.tracker.wait_if_needed().await;
            attempt += 1;

            let err = match call().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };

            match err.class() {
                ErrorClass::Fatal => {
                    tracing::debug!(label, attempt, error = %short_error_message(&err), "Not retrying");
                    return Err(err);
                }
                ErrorClass::RateLimit => {
                    // Quota waits do not count against the transient budget.
                    attempt -= 1;
                    rate_limit_waits += 1;
                    self.wait_for_quota(label, &err, rate_limit_waits).await;
                }
                ErrorClass::Transient => {
                    let Some(delay) = backoff.next() else {
                        tracing::warn!(
                            label,
                            attempts = attempt,
                            error = %short_error_message(&err),
                            "Retry budget exhausted"
                        );
                        return Err(err);
                    };

                    emit(
                        self.on_progress.as_ref(),
                        AuditProgress::TransientRetry {
                            label: label.to_string(),
                            delay,
                            attempt,
                            error: short_error_message(&err),
                        },
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    async fn wait_for_quota(&self, label: &str, err: &ApiError, waits: u32) {
        let ApiError::RateLimited {
            reset_at,
            retry_after,
        } = err
        else {
            return;
        };

        if let Some(reset_at) = reset_at {
            self.tracker
                .observe(RateLimitState::exhausted_until(*reset_at))
                .await;
        }

        // With nothing to wait out on the tracker, pause anyway so the loop
        // cannot spin against a throttled endpoint.
        let pending = self.tracker.should_wait().await;
        let fallback = pending
            .is_zero()
            .then(|| retry_after.unwrap_or(self.config.base_delay));
        let wait = fallback.unwrap_or(pending);

        emit(
            self.on_progress.as_ref(),
            AuditProgress::RateLimitBackoff {
                label: label.to_string(),
                wait,
                attempt: waits,
            },
        );

        // A tracker wait is slept by the next attempt's `wait_if_needed`.
        if let Some(delay) = fallback {
            tokio::time::sleep(delay).await;
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
