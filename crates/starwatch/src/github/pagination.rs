//! Lazy pagination over GitHub listings.
//!
//! A listing is walked one page at a time by following the locator each page
//! advertises for its successor. The locator is opaque: for the REST API it is
//! the full `rel="next"` URL from the `Link` header, for profile pages it is
//! the "Next" anchor target. Nothing here assumes an integer page number.

use std::fmt;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};

use crate::error::{ApiError, Result};
use crate::progress::{AuditProgress, ProgressCallback, emit};
use crate::retry::RetryPolicy;

use super::client::GitHubClient;
use super::parse::PageParser;

/// Opaque position in a paginated listing.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PageLocator(String);

impl PageLocator {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Pagination links from a `Link` header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LinkPagination {
    pub next: Option<PageLocator>,
    pub last: Option<PageLocator>,
}

/// Parse the Link header to extract pagination info.
///
/// GitHub Link headers look like:
/// `<https://api.github.com/user/1/followers?page=2>; rel="next", <...&page=3>; rel="last"`
pub fn parse_link_header(link_header: &str) -> LinkPagination {
    let mut info = LinkPagination::default();
    let mut rest = link_header;

    // Link targets are delimited by angle brackets and may themselves contain
    // commas or semicolons (opaque cursors), so scan bracket to bracket.
    while let Some(open) = rest.find('<') {
        let Some(close) = rest[open + 1..].find('>').map(|i| open + 1 + i) else {
            break;
        };
        let url = rest[open + 1..close].trim();
        rest = &rest[close + 1..];

        let params_end = rest.find('<').unwrap_or(rest.len());
        let params = &rest[..params_end];

        if url.is_empty() {
            continue;
        }

        let rels = params
            .split([';', ','])
            .filter_map(|param| param.trim().strip_prefix("rel="))
            // A single link may carry several space-separated relations.
            .flat_map(|value| value.trim_matches('"').split_whitespace());

        for rel in rels {
            match rel {
                "next" => info.next = Some(PageLocator::new(url)),
                "last" => info.last = Some(PageLocator::new(url)),
                _ => {}
            }
        }
    }

    info
}

/// One fetched page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub records: Vec<T>,
    pub next: Option<PageLocator>,
}

struct Cursor {
    next: Option<PageLocator>,
    page: u32,
    total: usize,
}

/// Walks a paginated listing, yielding records as a lazy stream.
pub struct PaginatedFetcher<P> {
    client: GitHubClient,
    retry: RetryPolicy,
    parser: Arc<P>,
    namespace: String,
    on_progress: Option<ProgressCallback>,
}

impl<P> Clone for PaginatedFetcher<P> {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            retry: self.retry.clone(),
            parser: Arc::clone(&self.parser),
            namespace: self.namespace.clone(),
            on_progress: self.on_progress.clone(),
        }
    }
}

impl<P> PaginatedFetcher<P>
where
    P: PageParser + 'static,
{
    /// `namespace` names the listing in logs and progress events.
    pub fn new(
        client: GitHubClient,
        retry: RetryPolicy,
        parser: P,
        namespace: impl Into<String>,
    ) -> Self {
        Self {
            client,
            retry,
            parser: Arc::new(parser),
            namespace: namespace.into(),
            on_progress: None,
        }
    }

    #[must_use]
    pub fn with_progress(mut self, on_progress: Option<ProgressCallback>) -> Self {
        self.on_progress = on_progress;
        self
    }

    /// Fetch and parse a single page through the retry policy.
    ///
    /// Parsing happens inside the retried call, so a truncated body is
    /// refetched like any other transient failure.
    pub async fn fetch_page(&self, locator: &PageLocator) -> Result<Page<P::Record>> {
        self.retry
            .execute(&self.namespace, || {
                let client = self.client.clone();
                let parser = Arc::clone(&self.parser);
                let locator = locator.clone();
                async move {
                    let response = client.get(&locator).await?;
                    let records = parser.parse_records(&locator, &response)?;
                    let next = parser.next_locator(&locator, &response);
                    Ok(Page { records, next })
                }
            })
            .await
    }

    /// Stream every record reachable from `first`.
    ///
    /// Each page is requested only once the records of the previous one have
    /// been consumed. Empty pages are skipped over as long as they point to a
    /// successor; a page without one ends the stream. Calling this again
    /// starts over from `first`.
    pub fn fetch_all(&self, first: PageLocator) -> BoxStream<'static, Result<P::Record>> {
        let fetcher = self.clone();
        let cursor = Cursor {
            next: Some(first),
            page: 0,
            total: 0,
        };

        stream::try_unfold(cursor, move |mut cursor| {
            let fetcher = fetcher.clone();
            async move {
                let Some(locator) = cursor.next.take() else {
                    return Ok(None);
                };

                let page = fetcher.fetch_page(&locator).await?;
                cursor.page += 1;
                cursor.total += page.records.len();

                emit(
                    fetcher.on_progress.as_ref(),
                    AuditProgress::FetchedPage {
                        namespace: fetcher.namespace.clone(),
                        page: cursor.page,
                        count: page.records.len(),
                        total_so_far: cursor.total,
                    },
                );

                cursor.next = page.next;
                Ok::<_, ApiError>(Some((page.records, cursor)))
            }
        })
        .map_ok(|records| stream::iter(records.into_iter().map(Ok::<_, ApiError>)))
        .try_flatten()
        .boxed()
    }

    /// Drain [`fetch_all`](Self::fetch_all) into a vector, failing on the first error.
    pub async fn collect_all(&self, first: PageLocator) -> Result<Vec<P::Record>> {
        self.fetch_all(first).try_collect().await
    }
}
