//! GitHub client: request construction, quota bookkeeping, and status
//! classification.

use std::sync::Arc;
use std::time::Duration;

use chrono::DateTime;
use url::Url;

use crate::error::{ApiError, Result};
use crate::http::{HttpRequest, HttpResponse, HttpTransport};
use crate::rate_limit::{ApiRateLimiter, RateLimitState, RateLimitTracker};

use super::pagination::PageLocator;
use super::types::RateLimitResponse;

/// Default REST API base URL.
pub const DEFAULT_API_URL: &str = "https://api.github.com";

/// Default web base URL, used for profile pages.
pub const DEFAULT_WEB_URL: &str = "https://github.com";

/// Page size requested from list endpoints (GitHub's maximum).
pub const PER_PAGE: u32 = 100;

const USER_AGENT: &str = concat!("starwatch/", env!("CARGO_PKG_VERSION"));
const API_VERSION: &str = "2022-11-28";

/// A GitHub client over an [`HttpTransport`].
///
/// Every response's `x-ratelimit-*` headers are fed into the shared
/// [`RateLimitTracker`], so clones handed to concurrent tasks all see the same
/// quota.
#[derive(Clone)]
pub struct GitHubClient {
    transport: Arc<dyn HttpTransport>,
    /// Sent only to the API host.
    token: Option<Arc<String>>,
    api_url: Url,
    web_url: Url,
    tracker: Arc<RateLimitTracker>,
    /// Optional proactive pacer in front of every request.
    pacer: Option<ApiRateLimiter>,
}

fn parse_base_url(raw: &str) -> Result<Url> {
    let url = Url::parse(raw).map_err(|e| ApiError::internal(format!("invalid base URL {raw}: {e}")))?;
    if url.cannot_be_a_base() {
        return Err(ApiError::internal(format!("invalid base URL {raw}: not a base")));
    }
    Ok(url)
}

impl GitHubClient {
    /// Create a client for github.com.
    pub fn new(
        transport: Arc<dyn HttpTransport>,
        token: Option<&str>,
        tracker: Arc<RateLimitTracker>,
    ) -> Result<Self> {
        Self::with_base_urls(transport, token, DEFAULT_API_URL, DEFAULT_WEB_URL, tracker)
    }

    /// Create a client for a GitHub Enterprise instance or a test server.
    pub fn with_base_urls(
        transport: Arc<dyn HttpTransport>,
        token: Option<&str>,
        api_url: &str,
        web_url: &str,
        tracker: Arc<RateLimitTracker>,
    ) -> Result<Self> {
        Ok(Self {
            transport,
            token: token
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(|t| Arc::new(t.to_string())),
            api_url: parse_base_url(api_url)?,
            web_url: parse_base_url(web_url)?,
            tracker,
            pacer: None,
        })
    }

    /// Pace requests with a requests-per-second limiter.
    #[must_use]
    pub fn with_pacing(mut self, pacer: Option<ApiRateLimiter>) -> Self {
        self.pacer = pacer;
        self
    }

    /// The shared quota tracker.
    pub fn tracker(&self) -> &Arc<RateLimitTracker> {
        &self.tracker
    }

    pub fn api_url(&self) -> &Url {
        &self.api_url
    }

    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }

    fn api_endpoint(&self, segments: &[&str], paginated: bool) -> Url {
        let mut url = self.api_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(segments);
        }
        if paginated {
            url.query_pairs_mut()
                .append_pair("per_page", &PER_PAGE.to_string());
        }
        url
    }

    /// First page of the repositories owned by `username`.
    pub fn user_repos(&self, username: &str) -> PageLocator {
        PageLocator::new(self.api_endpoint(&["users", username, "repos"], true).as_str())
    }

    /// First page of accounts following `username`.
    pub fn followers(&self, username: &str) -> PageLocator {
        PageLocator::new(self.api_endpoint(&["users", username, "followers"], true).as_str())
    }

    /// First page of accounts `username` follows.
    pub fn following(&self, username: &str) -> PageLocator {
        PageLocator::new(self.api_endpoint(&["users", username, "following"], true).as_str())
    }

    /// First page of a profile tab (`followers` or `following`) on the website.
    pub fn profile_tab(&self, username: &str, tab: &str) -> PageLocator {
        let mut url = self.web_url.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().push(username);
        }
        url.query_pairs_mut().append_pair("tab", tab);
        PageLocator::new(url.as_str())
    }

    fn targets_api(&self, locator: &PageLocator) -> bool {
        Url::parse(locator.as_str())
            .map(|url| url.origin() == self.api_url.origin())
            .unwrap_or(false)
    }

    /// Perform one GET and classify the outcome.
    ///
    /// Non-2xx statuses come back as [`ApiError`]s; retrying is the caller's
    /// business.
    pub async fn get(&self, locator: &PageLocator) -> Result<HttpResponse> {
        if let Some(ref pacer) = self.pacer {
            pacer.wait().await;
        }

        let mut request = HttpRequest::get(locator.as_str()).header("User-Agent", USER_AGENT);
        if self.targets_api(locator) {
            request = request
                .header("Accept", "application/vnd.github+json")
                .header("X-GitHub-Api-Version", API_VERSION);
            if let Some(ref token) = self.token {
                request = request.header("Authorization", format!("Bearer {}", token.as_str()));
            }
        } else {
            request = request.header("Accept", "text/html");
        }

        let response = self.transport.send(request).await?;

        if let Some(state) = RateLimitState::from_headers(&response.headers) {
            tracing::trace!(
                remaining = state.remaining,
                reset = state.reset_epoch_seconds,
                "Observed rate limit headers"
            );
            self.tracker.observe(state).await;
        }

        classify_response(locator, response)
    }

    /// Fetch the current quota from `/rate_limit` and seed the tracker with
    /// the core resource.
    pub async fn rate_limit(&self) -> Result<RateLimitResponse> {
        let locator = PageLocator::new(self.api_endpoint(&["rate_limit"], false).as_str());
        let response = self.get(&locator).await?;
        let parsed: RateLimitResponse = serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::malformed(locator.as_str(), e.to_string()))?;

        let core = parsed.resources.core;
        self.tracker
            .observe(RateLimitState::new(core.remaining, core.reset))
            .await;

        Ok(parsed)
    }
}

impl std::fmt::Debug for GitHubClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GitHubClient")
            .field("api_url", &self.api_url.as_str())
            .field("web_url", &self.web_url.as_str())
            .field("authenticated", &self.token.is_some())
            .finish_non_exhaustive()
    }
}

/// Whether a 403 means the quota ran out rather than a permission problem.
fn is_quota_exhausted(response: &HttpResponse) -> bool {
    if response.header("x-ratelimit-remaining").map(str::trim) == Some("0") {
        return true;
    }
    if response.header("retry-after").is_some() {
        return true;
    }
    response.text().to_ascii_lowercase().contains("rate limit")
}

fn rate_limited(response: &HttpResponse) -> ApiError {
    let reset_at = response
        .header("x-ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
        .and_then(|epoch| DateTime::from_timestamp(epoch, 0));
    let retry_after = response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs);

    ApiError::RateLimited {
        reset_at,
        retry_after,
    }
}

/// Map a response status onto the error taxonomy.
pub fn classify_response(locator: &PageLocator, response: HttpResponse) -> Result<HttpResponse> {
    let status = response.status;
    if response.is_success() {
        return Ok(response);
    }

    let url = locator.to_string();
    Err(match status {
        429 => rate_limited(&response),
        403 if is_quota_exhausted(&response) => rate_limited(&response),
        401 | 403 => ApiError::AuthRequired { status, url },
        404 => ApiError::not_found(url),
        500..=599 => ApiError::Server { status, url },
        _ => ApiError::UnexpectedStatus { status, url },
    })
}
