//! Configuration file support for starwatch.
//!
//! Configuration is loaded with the following precedence (highest to lowest):
//! 1. CLI flags
//! 2. Environment variables (prefixed with `STARWATCH_`, nested keys joined
//!    by `__`, e.g. `STARWATCH_AUDIT__CONCURRENCY`)
//! 3. Config file (./starwatch.toml, then ~/.config/starwatch/config.toml)
//! 4. Built-in defaults
//!
//! `GITHUB_TOKEN` is honored when no token is configured otherwise.
//!
//! Example config file:
//! ```toml
//! [github]
//! token = "ghp_..."  # or use STARWATCH_GITHUB__TOKEN / GITHUB_TOKEN
//! api_url = "https://api.github.com"
//! web_url = "https://github.com"
//!
//! [audit]
//! concurrency = 5
//! timeout_secs = 600
//! requests_per_second = 10  # 0 disables pacing
//! follow_source = "api"     # or "html"
//! case_insensitive = false
//!
//! [retry]
//! base_delay_ms = 1000
//! max_delay_ms = 60000
//! max_attempts = 5
//! jitter = false
//! ```

use std::path::PathBuf;
use std::time::Duration;

use config::{Config as ConfigBuilder, Environment, File, FileFormat};
use directories::ProjectDirs;
use serde::Deserialize;
use starwatch::github::{DEFAULT_API_URL, DEFAULT_WEB_URL};
use starwatch::{
    DEFAULT_CONCURRENCY, FollowSource, GITHUB_DEFAULT_RPS, RetryConfig, UsernameCase,
};

/// Top-level configuration.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// GitHub connection settings.
    pub github: GitHubConfig,
    /// Default audit options.
    pub audit: AuditConfig,
    /// Retry/backoff tuning.
    pub retry: RetryConfigFile,
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    /// GitHub API token.
    pub token: Option<String>,
    /// REST API base URL (GitHub Enterprise uses `https://host/api/v3`).
    pub api_url: String,
    /// Website base URL, used for profile pages.
    pub web_url: String,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            token: None,
            api_url: DEFAULT_API_URL.to_string(),
            web_url: DEFAULT_WEB_URL.to_string(),
        }
    }
}

/// Default audit options.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct AuditConfig {
    /// Repositories collected in parallel.
    pub concurrency: usize,
    /// Overall run timeout in seconds (0 disables it).
    pub timeout_secs: u64,
    /// Proactive pacing; 0 disables it.
    pub requests_per_second: u32,
    /// Where follower lists are read from.
    pub follow_source: FollowSource,
    /// Lowercase usernames before comparing.
    pub case_insensitive: bool,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            timeout_secs: 600,
            requests_per_second: GITHUB_DEFAULT_RPS,
            follow_source: FollowSource::Api,
            case_insensitive: false,
        }
    }
}

/// Retry tuning as written in the config file.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct RetryConfigFile {
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub max_attempts: u32,
    pub jitter: bool,
}

impl Default for RetryConfigFile {
    fn default() -> Self {
        let defaults = RetryConfig::default();
        Self {
            base_delay_ms: defaults.base_delay.as_millis() as u64,
            max_delay_ms: defaults.max_delay.as_millis() as u64,
            max_attempts: defaults.max_attempts,
            jitter: defaults.with_jitter,
        }
    }
}

impl Config {
    /// Load configuration using the config crate's layered approach.
    ///
    /// Sources are loaded in order (later sources override earlier):
    /// 1. Built-in defaults
    /// 2. XDG config file (~/.config/starwatch/config.toml)
    /// 3. Local config file (./starwatch.toml)
    /// 4. Environment variables with STARWATCH_ prefix
    pub fn load() -> Self {
        let mut builder = ConfigBuilder::builder();

        if let Some(xdg_config) = Self::default_config_path()
            && xdg_config.exists()
        {
            tracing::debug!("Loading config from {:?}", xdg_config);
            builder = builder.add_source(
                File::from(xdg_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        let local_config = PathBuf::from("starwatch.toml");
        if local_config.exists() {
            tracing::debug!("Loading config from ./starwatch.toml");
            builder = builder.add_source(
                File::from(local_config)
                    .format(FileFormat::Toml)
                    .required(false),
            );
        }

        // STARWATCH_AUDIT__TIMEOUT_SECS -> audit.timeout_secs
        builder = builder.add_source(
            Environment::with_prefix("STARWATCH")
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true),
        );

        match builder.build() {
            Ok(settings) => match settings.try_deserialize::<Config>() {
                Ok(config) => config,
                Err(e) => {
                    tracing::warn!("Failed to deserialize config: {}", e);
                    Config::default()
                }
            },
            Err(e) => {
                tracing::warn!("Failed to build config: {}", e);
                Config::default()
            }
        }
    }

    /// Get the GitHub token, falling back to `GITHUB_TOKEN`.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var("GITHUB_TOKEN").ok())
            .filter(|t| !t.trim().is_empty())
    }

    /// Overall timeout, if enabled.
    pub fn timeout(&self) -> Option<Duration> {
        (self.audit.timeout_secs > 0).then(|| Duration::from_secs(self.audit.timeout_secs))
    }

    pub fn username_case(&self) -> UsernameCase {
        if self.audit.case_insensitive {
            UsernameCase::Lowercase
        } else {
            UsernameCase::Exact
        }
    }

    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            Duration::from_millis(self.retry.base_delay_ms),
            Duration::from_millis(self.retry.max_delay_ms),
            self.retry.max_attempts.max(1),
        )
        .with_jitter(self.retry.jitter)
    }

    /// Get the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", "starwatch").map(|dirs| dirs.config_dir().join("config.toml"))
    }
}
