use std::sync::Arc;

use clap::ValueEnum;
use starwatch::http::DEFAULT_REQUEST_TIMEOUT;
use starwatch::{ApiRateLimiter, GitHubClient, RateLimitTracker, ReqwestTransport};

use crate::config::Config;

/// Output format for command results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub(crate) enum OutputFormat {
    /// Display as a formatted table (default)
    #[default]
    Table,
    /// Display as JSON
    Json,
}

/// Build a GitHub client from configuration.
///
/// Pacing is skipped when `no_rate_limit` is set or the configured rate is 0.
pub(crate) fn github_client(
    config: &Config,
    no_rate_limit: bool,
) -> Result<GitHubClient, Box<dyn std::error::Error>> {
    let transport = ReqwestTransport::with_timeout(DEFAULT_REQUEST_TIMEOUT)?;
    let token = config.github_token();
    if token.is_none() {
        tracing::warn!("No GitHub token configured; using the anonymous quota (60 requests/hour)");
    }

    let client = GitHubClient::with_base_urls(
        Arc::new(transport),
        token.as_deref(),
        &config.github.api_url,
        &config.github.web_url,
        Arc::new(RateLimitTracker::new()),
    )?;

    let rps = config.audit.requests_per_second;
    let pacer = (!no_rate_limit && rps > 0).then(|| ApiRateLimiter::new(rps));
    Ok(client.with_pacing(pacer))
}

/// Format a duration in human-readable form (e.g., "1h 23m", "5m 30s").
pub(crate) fn format_duration(duration: chrono::Duration) -> String {
    let total_secs = duration.num_seconds().max(0);
    let hours = total_secs / 3600;
    let minutes = (total_secs % 3600) / 60;
    let seconds = total_secs % 60;

    if hours > 0 {
        format!("{}h {}m", hours, minutes)
    } else if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}
