//! GitHub access for the audit.
//!
//! # Module Structure
//!
//! - [`client`] - Request construction, quota bookkeeping, status classification
//! - [`pagination`] - Opaque page locators and the lazy [`PaginatedFetcher`]
//! - [`parse`] - JSON and profile-page body parsers
//! - [`types`] - Wire and domain data structures

mod client;
mod pagination;
mod parse;
mod types;

pub use client::{
    DEFAULT_API_URL, DEFAULT_WEB_URL, GitHubClient, PER_PAGE, classify_response,
};
pub use pagination::{LinkPagination, Page, PageLocator, PaginatedFetcher, parse_link_header};
pub use parse::{PageParser, ProfileHtmlParser, RepositoryParser, UserLoginParser};
pub use types::{
    ApiRepository, ApiUser, RateLimitResource, RateLimitResources, RateLimitResponse, Repository,
    RepositoryListing,
};
