use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::http::HttpError;

/// How a failed call should be handled by the retry layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Retried with exponential backoff, bounded by the attempt budget.
    Transient,
    /// Waited out against the shared quota; never consumes the attempt budget.
    RateLimit,
    /// Not self-correcting. Surfaced immediately.
    Fatal,
}

/// Errors from a single GitHub call site.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Connection failure, reset, or timeout.
    #[error("Network error: {message}")]
    Transport { message: String },

    /// 5xx from the server.
    #[error("Server error {status} from {url}")]
    Server { status: u16, url: String },

    /// Quota exhausted (429, or 403 with no remaining calls).
    #[error("Rate limit exceeded, resets {}", describe_reset(.reset_at))]
    RateLimited {
        reset_at: Option<DateTime<Utc>>,
        retry_after: Option<Duration>,
    },

    /// Credential missing, invalid, or lacking permission.
    #[error("Authentication failed ({status}) for {url}")]
    AuthRequired { status: u16, url: String },

    /// The body could not be parsed into the expected shape.
    #[error("Malformed response from {url}: {message}")]
    Malformed { url: String, message: String },

    /// Account or repository does not exist.
    #[error("Not found: {resource}")]
    NotFound { resource: String },

    /// Any other non-success status.
    #[error("Unexpected HTTP status {status} from {url}")]
    UnexpectedStatus { status: u16, url: String },

    /// Unexpected/internal error.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

fn describe_reset(reset_at: &Option<DateTime<Utc>>) -> String {
    match reset_at {
        Some(at) => format!("at {}", at.format("%Y-%m-%d %H:%M:%S UTC")),
        None => "at an unknown time".to_string(),
    }
}

impl ApiError {
    #[inline]
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    #[inline]
    pub fn malformed(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Malformed {
            url: url.into(),
            message: message.into(),
        }
    }

    #[inline]
    pub fn not_found(resource: impl Into<String>) -> Self {
        Self::NotFound {
            resource: resource.into(),
        }
    }

    #[inline]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Classify this error for the retry layer.
    pub fn class(&self) -> ErrorClass {
        match self {
            Self::Transport { .. } | Self::Server { .. } | Self::Malformed { .. } => {
                ErrorClass::Transient
            }
            Self::RateLimited { .. } => ErrorClass::RateLimit,
            Self::AuthRequired { .. }
            | Self::NotFound { .. }
            | Self::UnexpectedStatus { .. }
            | Self::Internal { .. } => ErrorClass::Fatal,
        }
    }

    #[inline]
    pub fn is_rate_limited(&self) -> bool {
        matches!(self, Self::RateLimited { .. })
    }

    #[inline]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::AuthRequired { .. })
    }
}

impl From<HttpError> for ApiError {
    fn from(err: HttpError) -> Self {
        ApiError::transport(err.to_string())
    }
}

/// Phase of an audit run, used to label run-level failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Preflight,
    Repositories,
    Stargazers,
    Followers,
    Following,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Stage::Preflight => "rate limit preflight",
            Stage::Repositories => "repository listing",
            Stage::Stargazers => "stargazer collection",
            Stage::Followers => "followers fetch",
            Stage::Following => "following fetch",
        };
        f.write_str(name)
    }
}

/// Errors that abort a whole audit run.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("{stage} failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: ApiError,
    },

    #[error("Timed out during {stage} ({} repositories incomplete)", .incomplete.len())]
    Timeout { stage: Stage, incomplete: Vec<String> },

    #[error("Invalid configuration: {message}")]
    Config { message: String },
}

impl RunError {
    #[inline]
    pub fn stage(stage: Stage, source: ApiError) -> Self {
        Self::Stage { stage, source }
    }

    #[inline]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Extract a short error message suitable for display.
///
/// Takes the first line of an error message.
#[inline]
pub fn short_error_message(e: &impl std::error::Error) -> String {
    let full = e.to_string();
    full.lines().next().unwrap_or(&full).to_string()
}

/// Result type for GitHub call sites.
pub type Result<T> = std::result::Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_errors_are_classified_for_backoff() {
        assert_eq!(ApiError::transport("reset").class(), ErrorClass::Transient);
        assert_eq!(
            ApiError::Server {
                status: 502,
                url: "u".into()
            }
            .class(),
            ErrorClass::Transient
        );
        assert_eq!(
            ApiError::malformed("u", "eof").class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn rate_limit_and_fatal_classes() {
        let limited = ApiError::RateLimited {
            reset_at: None,
            retry_after: None,
        };
        assert_eq!(limited.class(), ErrorClass::RateLimit);
        assert!(limited.is_rate_limited());

        let auth = ApiError::AuthRequired {
            status: 401,
            url: "u".into(),
        };
        assert_eq!(auth.class(), ErrorClass::Fatal);
        assert!(auth.is_auth());

        assert_eq!(ApiError::not_found("octocat").class(), ErrorClass::Fatal);
        assert_eq!(ApiError::internal("x").class(), ErrorClass::Fatal);
    }

    #[test]
    fn rate_limited_message_includes_reset() {
        let reset = DateTime::from_timestamp(2_000_000_000, 0).expect("valid timestamp");
        let err = ApiError::RateLimited {
            reset_at: Some(reset),
            retry_after: None,
        };
        assert!(err.to_string().contains("2033-05-18"));

        let unknown = ApiError::RateLimited {
            reset_at: None,
            retry_after: None,
        };
        assert!(unknown.to_string().contains("unknown"));
    }

    #[test]
    fn http_errors_become_transport_errors() {
        let err: ApiError = HttpError::Timeout("deadline".into()).into();
        assert!(matches!(err, ApiError::Transport { .. }));
        assert_eq!(err.class(), ErrorClass::Transient);
    }

    #[test]
    fn run_error_messages_name_the_stage() {
        let err = RunError::stage(
            Stage::Repositories,
            ApiError::AuthRequired {
                status: 401,
                url: "https://api.github.com/users/x/repos".into(),
            },
        );
        let msg = err.to_string();
        assert!(msg.starts_with("repository listing failed"));

        let timeout = RunError::Timeout {
            stage: Stage::Stargazers,
            incomplete: vec!["a".into(), "b".into()],
        };
        assert!(timeout.is_timeout());
        assert!(timeout.to_string().contains("2 repositories incomplete"));
    }

    #[test]
    fn short_error_message_takes_first_line() {
        let err = ApiError::internal("first line\nsecond line");
        assert_eq!(short_error_message(&err), "Internal error: first line");
    }
}
