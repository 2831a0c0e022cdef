//! HTTP seam.
//!
//! The audit only ever issues GETs. [`GitHubClient`](crate::GitHubClient)
//! sends them through an [`HttpTransport`], so a run can be replayed from a
//! script in tests instead of hitting the network.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// Response and request headers, in wire order.
///
/// Lookups go through [`header_get`], which ignores case.
pub type HttpHeaders = Vec<(String, String)>;

/// An outgoing GET.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HttpHeaders,
}

impl HttpRequest {
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: HttpHeaders::new(),
        }
    }

    #[must_use]
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Value of a request header, if set.
    #[must_use]
    pub fn header_value(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }
}

/// A fully buffered response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HttpHeaders,
    pub body: Vec<u8>,
}

impl HttpResponse {
    #[must_use]
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            headers: HttpHeaders::new(),
            body: body.into(),
        }
    }

    #[must_use]
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        header_get(&self.headers, name)
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    /// False only when a `Content-Type` is present and names something other
    /// than JSON.
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_none_or(|ct| ct.to_ascii_lowercase().contains("json"))
    }

    /// Body as text, lossy.
    #[must_use]
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }
}

/// A request that never produced a response.
#[derive(Debug, Error)]
pub enum HttpError {
    #[error("connection failed: {0}")]
    Transport(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("no scripted response for {url}")]
    Unscripted { url: String },
}

#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError>;
}

/// First header named `name`, ignoring ASCII case.
#[must_use]
pub fn header_get<'a>(headers: &'a HttpHeaders, name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find_map(|(k, v)| k.eq_ignore_ascii_case(name).then_some(v.as_str()))
}

/// Per-request timeout for [`ReqwestTransport::with_timeout`].
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Production transport.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self, HttpError> {
        reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("starwatch/", env!("CARGO_PKG_VERSION")))
            .build()
            .map(Self::new)
            .map_err(|e| HttpError::Transport(e.to_string()))
    }
}

impl From<reqwest::Error> for HttpError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            HttpError::Timeout(e.to_string())
        } else {
            HttpError::Transport(e.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
        let builder = request
            .headers
            .iter()
            .fold(self.client.get(&request.url), |b, (k, v)| b.header(k, v));

        let resp = builder.send().await?;
        let status = resp.status().as_u16();
        // Non-ASCII header values are dropped to empty strings.
        let headers = resp
            .headers()
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect();
        let body = resp.bytes().await?.to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) use mock::{MockTransport, json_response};

#[cfg(test)]
mod mock {
    use std::collections::{HashMap, VecDeque};
    use std::sync::{Arc, Mutex, MutexGuard};

    use tokio::time::Instant;

    use super::*;

    #[derive(Default)]
    struct Script {
        replies: HashMap<String, VecDeque<Result<HttpResponse, String>>>,
        sent: Vec<(Instant, HttpRequest)>,
    }

    /// Replays queued replies per URL and records every request.
    #[derive(Clone, Default)]
    pub(crate) struct MockTransport {
        script: Arc<Mutex<Script>>,
    }

    impl MockTransport {
        pub(crate) fn new() -> Self {
            Self::default()
        }

        fn script(&self) -> MutexGuard<'_, Script> {
            self.script.lock().unwrap_or_else(|e| e.into_inner())
        }

        /// Queue a reply for `url`; replies for one URL come back in order.
        pub(crate) fn push_response(&self, url: impl Into<String>, response: HttpResponse) {
            self.script()
                .replies
                .entry(url.into())
                .or_default()
                .push_back(Ok(response));
        }

        /// Queue a connection failure for `url`.
        pub(crate) fn push_error(&self, url: impl Into<String>, message: &str) {
            self.script()
                .replies
                .entry(url.into())
                .or_default()
                .push_back(Err(message.to_string()));
        }

        pub(crate) fn requests(&self) -> Vec<HttpRequest> {
            self.script().sent.iter().map(|(_, r)| r.clone()).collect()
        }

        /// When each request was sent, on tokio's clock, with its URL.
        pub(crate) fn sent_at(&self) -> Vec<(Instant, String)> {
            self.script()
                .sent
                .iter()
                .map(|(at, r)| (*at, r.url.clone()))
                .collect()
        }

        pub(crate) fn request_count(&self, url: &str) -> usize {
            self.script().sent.iter().filter(|(_, r)| r.url == url).count()
        }
    }

    #[async_trait]
    impl HttpTransport for MockTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpError> {
            let mut script = self.script();
            let url = request.url.clone();
            script.sent.push((Instant::now(), request));

            match script.replies.get_mut(&url).and_then(VecDeque::pop_front) {
                Some(Ok(resp)) => Ok(resp),
                Some(Err(message)) => Err(HttpError::Transport(message)),
                None => Err(HttpError::Unscripted { url }),
            }
        }
    }

    /// JSON reply with extra headers.
    pub(crate) fn json_response(status: u16, body: &str, extra: &[(&str, &str)]) -> HttpResponse {
        extra.iter().fold(
            HttpResponse::new(status, body).with_header("Content-Type", "application/json; charset=utf-8"),
            |resp, (k, v)| resp.with_header(*k, *v),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_lookup_ignores_case_and_prefers_first() {
        let resp = HttpResponse::new(200, "")
            .with_header("X-RateLimit-Remaining", "10")
            .with_header("x-ratelimit-remaining", "9");
        assert_eq!(resp.header("x-ratelimit-remaining"), Some("10"));
        assert_eq!(resp.header("Retry-After"), None);
    }

    #[test]
    fn request_builder_keeps_headers() {
        let req = HttpRequest::get("https://api.example.test/rate_limit")
            .header("Accept", "application/vnd.github+json");
        assert_eq!(req.header_value("accept"), Some("application/vnd.github+json"));
        assert_eq!(req.header_value("authorization"), None);
    }

    #[test]
    fn json_detection_accepts_missing_content_type() {
        assert!(json_response(200, "[]", &[]).is_json());
        assert!(HttpResponse::new(200, "").is_json());
        assert!(!HttpResponse::new(200, "<html>").with_header("content-type", "text/html").is_json());
    }

    #[test]
    fn success_range() {
        assert!(HttpResponse::new(204, "").is_success());
        assert!(!HttpResponse::new(304, "").is_success());
        assert!(!HttpResponse::new(403, "").is_success());
    }

    #[tokio::test]
    async fn mock_replays_replies_per_url_in_order() {
        let transport = MockTransport::new();
        let url = "https://api.example.test/users/octocat/repos";
        transport.push_response(url, json_response(200, "[1]", &[]));
        transport.push_error(url, "connection reset");

        let first = transport.send(HttpRequest::get(url)).await.expect("first reply");
        assert_eq!(first.text(), "[1]");

        let second = transport.send(HttpRequest::get(url)).await.expect_err("second reply");
        assert!(matches!(second, HttpError::Transport(msg) if msg == "connection reset"));

        let third = transport.send(HttpRequest::get(url)).await.expect_err("queue drained");
        assert!(matches!(third, HttpError::Unscripted { url: u } if u == url));
        assert_eq!(transport.request_count(url), 3);
    }

    #[tokio::test]
    async fn reqwest_transport_reports_bad_urls_as_transport_errors() {
        let transport = ReqwestTransport::with_timeout(Duration::from_millis(50))
            .expect("client should build");
        let err = transport
            .send(HttpRequest::get("not a url"))
            .await
            .expect_err("invalid url");
        assert!(matches!(err, HttpError::Transport(_)));
    }
}
