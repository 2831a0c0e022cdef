//! Page body parsers.
//!
//! A [`PageParser`] turns one HTTP response into records plus the locator of
//! the next page. JSON parsers cover the REST API; [`ProfileHtmlParser`] reads
//! the follower/following tabs of a github.com profile.

use scraper::{ElementRef, Html, Selector};
use serde::de::DeserializeOwned;
use url::Url;

use crate::error::{ApiError, Result};
use crate::follow::UsernameCase;
use crate::http::HttpResponse;

use super::client::PER_PAGE;
use super::pagination::{PageLocator, parse_link_header};
use super::types::{ApiRepository, ApiUser, Repository, RepositoryListing};

/// Parses one page of a listing.
pub trait PageParser: Send + Sync {
    type Record: Send + 'static;

    /// Extract the records on this page.
    fn parse_records(&self, locator: &PageLocator, response: &HttpResponse)
    -> Result<Vec<Self::Record>>;

    /// The locator of the following page, if any.
    ///
    /// Defaults to the `rel="next"` entry of the `Link` header.
    fn next_locator(&self, _locator: &PageLocator, response: &HttpResponse) -> Option<PageLocator> {
        response
            .header("link")
            .and_then(|header| parse_link_header(header).next)
    }
}

/// Deserialize a JSON array body, rejecting non-JSON content types.
fn parse_json_page<T: DeserializeOwned>(locator: &PageLocator, response: &HttpResponse) -> Result<Vec<T>> {
    if !response.is_json() {
        let content_type = response.header("content-type").unwrap_or_default();
        return Err(ApiError::malformed(
            locator.as_str(),
            format!("expected JSON, got content type {content_type:?}"),
        ));
    }

    serde_json::from_slice(&response.body)
        .map_err(|e| ApiError::malformed(locator.as_str(), e.to_string()))
}

/// Logins from followers, following, and stargazers listings.
#[derive(Debug, Clone, Copy, Default)]
pub struct UserLoginParser {
    pub case: UsernameCase,
}

impl UserLoginParser {
    pub fn new(case: UsernameCase) -> Self {
        Self { case }
    }
}

impl PageParser for UserLoginParser {
    type Record = String;

    fn parse_records(&self, locator: &PageLocator, response: &HttpResponse) -> Result<Vec<String>> {
        let users: Vec<ApiUser> = parse_json_page(locator, response)?;
        let total = users.len();

        let logins: Vec<String> = users
            .into_iter()
            .filter_map(|user| user.login)
            .map(|login| self.case.apply(&login))
            .collect();

        if logins.len() < total {
            tracing::warn!(
                url = %locator,
                skipped = total - logins.len(),
                "Skipping user entries without a login"
            );
        }

        Ok(logins)
    }
}

/// Repositories from `/users/{user}/repos`.
#[derive(Debug, Clone)]
pub struct RepositoryParser {
    owner: String,
    api_url: Url,
}

impl RepositoryParser {
    pub fn new(owner: impl Into<String>, api_url: Url) -> Self {
        Self {
            owner: owner.into(),
            api_url,
        }
    }

    /// First stargazer page of a repository, at the maximum page size.
    fn stargazers_locator(&self, repo: &ApiRepository) -> PageLocator {
        let declared = repo
            .stargazers_url
            .as_deref()
            .and_then(|raw| Url::parse(raw).ok());

        let mut url = declared.unwrap_or_else(|| {
            let mut url = self.api_url.clone();
            if let Ok(mut segments) = url.path_segments_mut() {
                segments
                    .pop_if_empty()
                    .extend(["repos", self.owner.as_str(), repo.name.as_str(), "stargazers"]);
            }
            url
        });
        url.query_pairs_mut()
            .append_pair("per_page", &PER_PAGE.to_string());

        PageLocator::new(url.as_str())
    }
}

impl PageParser for RepositoryParser {
    type Record = RepositoryListing;

    fn parse_records(
        &self,
        locator: &PageLocator,
        response: &HttpResponse,
    ) -> Result<Vec<RepositoryListing>> {
        let repos: Vec<ApiRepository> = parse_json_page(locator, response)?;

        Ok(repos
            .iter()
            .map(|repo| RepositoryListing {
                stargazers: self.stargazers_locator(repo),
                repository: Repository {
                    name: repo.name.clone(),
                    star_count: repo.stargazers_count,
                },
            })
            .collect())
    }
}

/// Usernames from the followers/following tab of a github.com profile page.
///
/// Each listed account renders its login in a `span.Link--secondary`; the
/// "Next" button of the pagination bar points at the following page.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProfileHtmlParser {
    pub case: UsernameCase,
}

impl ProfileHtmlParser {
    pub fn new(case: UsernameCase) -> Self {
        Self { case }
    }
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| ApiError::internal(format!("invalid selector {css}: {e:?}")))
}

fn element_text(element: ElementRef<'_>) -> String {
    element.text().collect::<String>().trim().to_string()
}

impl PageParser for ProfileHtmlParser {
    type Record = String;

    fn parse_records(&self, _locator: &PageLocator, response: &HttpResponse) -> Result<Vec<String>> {
        let document = Html::parse_document(&response.text());
        let logins = selector("span.Link--secondary")?;

        Ok(document
            .select(&logins)
            .map(element_text)
            .filter(|login| !login.is_empty())
            .map(|login| self.case.apply(&login))
            .collect())
    }

    fn next_locator(&self, locator: &PageLocator, response: &HttpResponse) -> Option<PageLocator> {
        let base = Url::parse(locator.as_str()).ok()?;
        let document = Html::parse_document(&response.text());
        let anchors = selector("a[href]").ok()?;

        document
            .select(&anchors)
            .find(|a| element_text(*a) == "Next")
            .and_then(|a| a.value().attr("href"))
            .and_then(|href| base.join(href).ok())
            .map(|url| PageLocator::new(url.as_str()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::json_response;

    fn locator(url: &str) -> PageLocator {
        PageLocator::new(url)
    }

    fn html_response(body: &str) -> HttpResponse {
        HttpResponse {
            status: 200,
            headers: vec![("Content-Type".to_string(), "text/html; charset=utf-8".to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    #[test]
    fn user_login_parser_skips_entries_without_login() {
        let response = json_response(
            200,
            r#"[{"login":"alice","id":1},{"id":2},{"login":"Bob"}]"#,
            &[],
        );
        let logins = UserLoginParser::default()
            .parse_records(&locator("https://api.github.com/x"), &response)
            .expect("parse");
        assert_eq!(logins, vec!["alice", "Bob"]);
    }

    #[test]
    fn user_login_parser_applies_case_policy() {
        let response = json_response(200, r#"[{"login":"Bob"}]"#, &[]);
        let logins = UserLoginParser::new(UsernameCase::Lowercase)
            .parse_records(&locator("https://api.github.com/x"), &response)
            .expect("parse");
        assert_eq!(logins, vec!["bob"]);
    }

    #[test]
    fn json_parsers_reject_non_json_bodies() {
        let response = html_response("<html></html>");
        let err = UserLoginParser::default()
            .parse_records(&locator("https://api.github.com/x"), &response)
            .expect_err("html is not json");
        assert!(matches!(err, ApiError::Malformed { .. }));
    }

    #[test]
    fn json_parsers_report_truncated_bodies_as_malformed() {
        let response = json_response(200, r#"[{"login":"alice"#, &[]);
        let err = UserLoginParser::default()
            .parse_records(&locator("https://api.github.com/x"), &response)
            .expect_err("truncated");
        assert!(matches!(err, ApiError::Malformed { ref url, .. } if url == "https://api.github.com/x"));
    }

    #[test]
    fn default_next_locator_reads_link_header() {
        let response = json_response(
            200,
            "[]",
            &[("Link", "<https://api.github.com/x?page=2>; rel=\"next\"")],
        );
        let next = UserLoginParser::default().next_locator(&locator("https://api.github.com/x"), &response);
        assert_eq!(next, Some(locator("https://api.github.com/x?page=2")));

        let last = json_response(200, "[]", &[]);
        assert!(
            UserLoginParser::default()
                .next_locator(&locator("https://api.github.com/x"), &last)
                .is_none()
        );
    }

    #[test]
    fn repository_parser_builds_stargazer_locators() {
        let parser = RepositoryParser::new(
            "octocat",
            Url::parse("https://api.example.test").expect("url"),
        );
        let response = json_response(
            200,
            r#"[
                {"name":"hello-world","stargazers_count":3,
                 "stargazers_url":"https://api.example.test/repos/octocat/hello-world/stargazers"},
                {"name":"spoon-knife","stargazers_count":0}
            ]"#,
            &[],
        );

        let listings = parser
            .parse_records(&locator("https://api.example.test/users/octocat/repos"), &response)
            .expect("parse");
        assert_eq!(listings.len(), 2);
        assert_eq!(listings[0].repository.name, "hello-world");
        assert_eq!(listings[0].repository.star_count, 3);
        assert_eq!(
            listings[0].stargazers.as_str(),
            "https://api.example.test/repos/octocat/hello-world/stargazers?per_page=100"
        );
        assert_eq!(
            listings[1].stargazers.as_str(),
            "https://api.example.test/repos/octocat/spoon-knife/stargazers?per_page=100"
        );
    }

    const FOLLOWERS_PAGE: &str = r#"
        <html><body>
          <div class="d-table">
            <a href="/alice"><span class="f4 Link--primary">Alice A.</span>
              <span class="Link--secondary">alice</span></a>
          </div>
          <div class="d-table">
            <a href="/bob"><span class="Link--secondary pl-1"> Bob </span></a>
          </div>
          <div class="paginate-container">
            <a class="btn" href="https://github.com/octocat?page=1&amp;tab=followers">Previous</a>
            <a class="btn" href="/octocat?page=3&amp;tab=followers">Next</a>
          </div>
        </body></html>
    "#;

    #[test]
    fn profile_parser_extracts_secondary_spans() {
        let response = html_response(FOLLOWERS_PAGE);
        let logins = ProfileHtmlParser::new(UsernameCase::Exact)
            .parse_records(&locator("https://github.com/octocat?tab=followers"), &response)
            .expect("parse");
        assert_eq!(logins, vec!["alice", "Bob"]);
    }

    #[test]
    fn profile_parser_follows_next_button() {
        let response = html_response(FOLLOWERS_PAGE);
        let next = ProfileHtmlParser::default().next_locator(
            &locator("https://github.com/octocat?page=2&tab=followers"),
            &response,
        );
        assert_eq!(
            next,
            Some(locator("https://github.com/octocat?page=3&tab=followers"))
        );
    }

    #[test]
    fn profile_parser_last_page_has_no_next() {
        let response = html_response(
            r#"<div class="paginate-container"><span class="disabled">Next</span></div>"#,
        );
        let next = ProfileHtmlParser::default()
            .next_locator(&locator("https://github.com/octocat?tab=followers"), &response);
        assert!(next.is_none());
    }
}
