//! Quota tracking shared by every outbound call.
//!
//! Two cooperating pieces live here:
//!
//! - [`RateLimitTracker`] holds the most recent quota snapshot reported by
//!   GitHub and makes callers wait out an exhausted window. It is the only
//!   mutable state shared between concurrent repository tasks.
//! - [`ApiRateLimiter`] is an optional proactive pacer (requests per second)
//!   that smooths bursts before GitHub ever has to say no.

use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use governor::clock::DefaultClock;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::http::{HttpHeaders, header_get};

/// Type alias for the governor rate limiter.
type GovernorRateLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Default pacing for GitHub (requests per second).
///
/// 5000 requests/hour is ~1.4/sec; 10/sec allows bursts while the quota
/// tracker handles the hourly window.
pub const GITHUB_DEFAULT_RPS: u32 = 10;

/// A quota snapshot for one credential.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RateLimitState {
    /// Calls left in the current window.
    pub remaining: u64,
    /// Unix timestamp at which the window resets.
    pub reset_epoch_seconds: i64,
    /// When this snapshot was taken.
    pub observed_at: DateTime<Utc>,
}

impl RateLimitState {
    pub fn new(remaining: u64, reset_epoch_seconds: i64) -> Self {
        Self {
            remaining,
            reset_epoch_seconds,
            observed_at: Utc::now(),
        }
    }

    /// A snapshot with no calls left until `reset_at`.
    pub fn exhausted_until(reset_at: DateTime<Utc>) -> Self {
        Self::new(0, reset_at.timestamp())
    }

    /// Parse `x-ratelimit-remaining` and `x-ratelimit-reset`.
    pub fn from_headers(headers: &HttpHeaders) -> Option<Self> {
        let remaining = header_get(headers, "x-ratelimit-remaining")?
            .trim()
            .parse::<u64>()
            .ok()?;
        let reset = header_get(headers, "x-ratelimit-reset")?
            .trim()
            .parse::<i64>()
            .ok()?;
        Some(Self::new(remaining, reset))
    }

    /// The reset time as a DateTime.
    pub fn reset_at(&self) -> DateTime<Utc> {
        DateTime::from_timestamp(self.reset_epoch_seconds, 0).unwrap_or_else(Utc::now)
    }

    /// How long to wait before the next call, as of `now`.
    ///
    /// Zero while calls remain; otherwise the time until reset, floored at zero.
    pub fn wait_at(&self, now: DateTime<Utc>) -> Duration {
        if self.remaining > 0 {
            return Duration::ZERO;
        }
        (self.reset_at() - now).to_std().unwrap_or(Duration::ZERO)
    }
}

/// Stand-in deadline for a reset too far out to represent.
const FAR_FUTURE: Duration = Duration::from_secs(86_400 * 365 * 30);

/// A snapshot plus the point on the runtime clock at which its window reopens.
#[derive(Debug, Clone, Copy)]
struct Window {
    state: RateLimitState,
    resume_at: Instant,
}

impl Window {
    fn open(state: RateLimitState, previous: Option<Window>) -> Self {
        let now = Instant::now();
        let resume_at = now
            .checked_add(state.wait_at(Utc::now()))
            .unwrap_or_else(|| now + FAR_FUTURE);
        // The same exhausted window reported again keeps its first deadline.
        let resume_at = match previous {
            Some(prev)
                if prev.state.remaining == 0
                    && prev.state.reset_epoch_seconds == state.reset_epoch_seconds =>
            {
                resume_at.min(prev.resume_at)
            }
            _ => resume_at,
        };
        Self { state, resume_at }
    }

    fn wait(&self) -> Duration {
        if self.state.remaining > 0 {
            return Duration::ZERO;
        }
        self.resume_at.saturating_duration_since(Instant::now())
    }
}

/// Shared holder of the last observed quota snapshot.
///
/// All reads and writes go through one async mutex, and a caller that has to
/// wait keeps the guard for the whole sleep. Other tasks therefore queue
/// behind the sleeper instead of acting on the snapshot it is waiting out.
///
/// The reset is converted to a deadline on tokio's clock when it is
/// observed, so a window is slept through once no matter how many tasks
/// were queued behind it.
#[derive(Debug, Default)]
pub struct RateLimitTracker {
    window: Mutex<Option<Window>>,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the snapshot carried by the latest response.
    ///
    /// Snapshots with an older reset than the current one are stale (a slow
    /// response from an earlier window) and are dropped.
    pub async fn observe(&self, state: RateLimitState) {
        let mut guard = self.window.lock().await;
        match *guard {
            Some(current) if state.reset_epoch_seconds < current.state.reset_epoch_seconds => {
                tracing::trace!(
                    stale_reset = state.reset_epoch_seconds,
                    current_reset = current.state.reset_epoch_seconds,
                    "Ignoring stale rate limit snapshot"
                );
            }
            previous => *guard = Some(Window::open(state, previous)),
        }
    }

    /// The last observed snapshot, if any.
    pub async fn snapshot(&self) -> Option<RateLimitState> {
        self.window.lock().await.map(|window| window.state)
    }

    /// Whether any snapshot has been observed.
    pub async fn has_snapshot(&self) -> bool {
        self.window.lock().await.is_some()
    }

    /// How long the next call should wait, as of now.
    pub async fn should_wait(&self) -> Duration {
        self.window
            .lock()
            .await
            .map(|window| window.wait())
            .unwrap_or(Duration::ZERO)
    }

    /// How long the next call should wait, as of wall-clock time `now`.
    ///
    /// With no snapshot the quota is unknown and the call proceeds.
    pub async fn should_wait_at(&self, now: DateTime<Utc>) -> Duration {
        self.window
            .lock()
            .await
            .map(|window| window.state.wait_at(now))
            .unwrap_or(Duration::ZERO)
    }

    /// Sleep until the quota window resets, if it is exhausted.
    ///
    /// Returns the duration waited.
    pub async fn wait_if_needed(&self) -> Duration {
        let guard = self.window.lock().await;
        let Some(window) = *guard else {
            tracing::trace!(wait_secs = 0, "Rate limit unknown");
            return Duration::ZERO;
        };

        let wait = window.wait();
        if wait.is_zero() {
            tracing::trace!(wait_secs = 0, "Rate limit check");
            return wait;
        }

        tracing::info!(
            wait_secs = wait.as_secs(),
            reset_at = %window.state.reset_at(),
            "Rate limit exhausted, waiting for reset"
        );
        tokio::time::sleep_until(window.resume_at).await;
        drop(guard);
        wait
    }
}

/// A standalone proactive rate limiter using the governor crate.
///
/// ```ignore
/// let limiter = ApiRateLimiter::new(10); // 10 requests per second
/// limiter.wait().await;
/// client.get(&locator).await?;
/// ```
#[derive(Clone)]
pub struct ApiRateLimiter {
    inner: Arc<GovernorRateLimiter>,
}

impl ApiRateLimiter {
    /// Create a new rate limiter with the specified requests per second.
    ///
    /// A value of 0 is treated as 1.
    pub fn new(requests_per_second: u32) -> Self {
        let rps = NonZeroU32::new(requests_per_second).unwrap_or(NonZeroU32::MIN);
        let rate_limiter = RateLimiter::direct(Quota::per_second(rps));

        Self {
            inner: Arc::new(rate_limiter),
        }
    }

    /// Wait until a request is allowed by the rate limiter.
    pub async fn wait(&self) {
        self.inner.until_ready().await;
    }
}

impl std::fmt::Debug for ApiRateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ApiRateLimiter").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn at(epoch: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(epoch, 0).expect("valid timestamp")
    }

    #[test]
    fn wait_is_zero_while_calls_remain() {
        let state = RateLimitState::new(1, 1_000_500);
        assert_eq!(state.wait_at(at(1_000_000)), Duration::ZERO);

        let past_reset = RateLimitState::new(42, 10);
        assert_eq!(past_reset.wait_at(at(1_000_000)), Duration::ZERO);
    }

    #[test]
    fn wait_counts_down_to_reset_when_exhausted() {
        let state = RateLimitState::new(0, 1_000_090);
        assert_eq!(state.wait_at(at(1_000_000)), Duration::from_secs(90));
    }

    #[test]
    fn wait_is_floored_at_zero_after_reset() {
        let state = RateLimitState::new(0, 999_000);
        assert_eq!(state.wait_at(at(1_000_000)), Duration::ZERO);
    }

    #[test]
    fn parses_github_rate_limit_headers() {
        let headers: HttpHeaders = vec![
            ("X-RateLimit-Limit".to_string(), "5000".to_string()),
            ("X-RateLimit-Remaining".to_string(), "4987".to_string()),
            ("X-RateLimit-Reset".to_string(), "1372700873".to_string()),
        ];
        let state = RateLimitState::from_headers(&headers).expect("headers parse");
        assert_eq!(state.remaining, 4987);
        assert_eq!(state.reset_epoch_seconds, 1_372_700_873);
    }

    #[test]
    fn missing_or_garbled_headers_yield_none() {
        let missing: HttpHeaders = vec![("x-ratelimit-remaining".to_string(), "1".to_string())];
        assert!(RateLimitState::from_headers(&missing).is_none());

        let garbled: HttpHeaders = vec![
            ("x-ratelimit-remaining".to_string(), "lots".to_string()),
            ("x-ratelimit-reset".to_string(), "1".to_string()),
        ];
        assert!(RateLimitState::from_headers(&garbled).is_none());
    }

    #[tokio::test]
    async fn unknown_quota_proceeds_optimistically() {
        let tracker = RateLimitTracker::new();
        assert!(!tracker.has_snapshot().await);
        assert_eq!(tracker.should_wait().await, Duration::ZERO);
        assert_eq!(tracker.wait_if_needed().await, Duration::ZERO);
    }

    #[tokio::test]
    async fn should_wait_reflects_latest_snapshot() {
        let tracker = RateLimitTracker::new();
        let now = at(1_000_000);

        tracker.observe(RateLimitState::new(10, 1_000_100)).await;
        assert_eq!(tracker.should_wait_at(now).await, Duration::ZERO);

        tracker.observe(RateLimitState::new(0, 1_000_100)).await;
        assert_eq!(tracker.should_wait_at(now).await, Duration::from_secs(100));
    }

    #[tokio::test]
    async fn stale_snapshots_do_not_move_reset_backwards() {
        let tracker = RateLimitTracker::new();
        tracker.observe(RateLimitState::new(0, 2_000)).await;
        tracker.observe(RateLimitState::new(4_999, 1_000)).await;

        let snapshot = tracker.snapshot().await.expect("snapshot present");
        assert_eq!(snapshot.reset_epoch_seconds, 2_000);
        assert_eq!(snapshot.remaining, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_if_needed_sleeps_until_reset() {
        let tracker = RateLimitTracker::new();
        let reset = Utc::now() + chrono::Duration::seconds(30);
        tracker
            .observe(RateLimitState::exhausted_until(reset))
            .await;

        let started = tokio::time::Instant::now();
        let waited = tracker.wait_if_needed().await;

        assert!(waited > Duration::from_secs(25));
        assert!(started.elapsed() >= waited);
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_waiters_sleep_through_one_window() {
        let tracker = Arc::new(RateLimitTracker::new());
        let reset = Utc::now() + chrono::Duration::seconds(60);
        tracker
            .observe(RateLimitState::exhausted_until(reset))
            .await;

        let started = tokio::time::Instant::now();
        let a = tokio::spawn({
            let tracker = Arc::clone(&tracker);
            async move { tracker.wait_if_needed().await }
        });
        let b = tokio::spawn({
            let tracker = Arc::clone(&tracker);
            async move { tracker.wait_if_needed().await }
        });

        let waits = [a.await.expect("task a"), b.await.expect("task b")];
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(55));
        assert!(elapsed < Duration::from_secs(65), "slept {elapsed:?}");
        assert_eq!(waits.iter().filter(|w| w.is_zero()).count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn window_is_waited_out_once_even_when_reported_again() {
        let tracker = RateLimitTracker::new();
        let reset = Utc::now() + chrono::Duration::seconds(60);
        tracker
            .observe(RateLimitState::exhausted_until(reset))
            .await;

        let started = tokio::time::Instant::now();
        assert!(tracker.wait_if_needed().await > Duration::from_secs(55));

        // A late response from the same window must not restart the wait.
        tracker
            .observe(RateLimitState::exhausted_until(reset))
            .await;
        assert_eq!(tracker.should_wait().await, Duration::ZERO);
        assert_eq!(tracker.wait_if_needed().await, Duration::ZERO);
        assert!(started.elapsed() < Duration::from_secs(65));
    }

    #[tokio::test(start_paused = true)]
    async fn a_later_window_sets_a_new_deadline() {
        let tracker = RateLimitTracker::new();
        let first = Utc::now() + chrono::Duration::seconds(10);
        tracker
            .observe(RateLimitState::exhausted_until(first))
            .await;
        tracker.wait_if_needed().await;

        let second = first + chrono::Duration::seconds(30);
        tracker
            .observe(RateLimitState::exhausted_until(second))
            .await;
        assert!(tracker.should_wait().await >= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn api_rate_limiter_allows_first_request_immediately() {
        let limiter = ApiRateLimiter::new(0);
        limiter.wait().await;
        let cloned = limiter.clone();
        assert!(format!("{cloned:?}").contains("ApiRateLimiter"));
    }
}
