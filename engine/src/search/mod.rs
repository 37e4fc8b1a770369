//! Web search and page summaries
//!
//! Both collaborators scrape plain HTML with `scraper`: result anchors from
//! the DuckDuckGo HTML endpoint, and the first few `<p>` blocks of a result
//! page.

use async_trait::async_trait;
use reqwest::{Client, Url};
use scraper::{ElementRef, Html, Selector};
use sdk::types::SearchHit;
use std::sync::OnceLock;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::SearchConfig;

/// Upper bound on a page summary, in characters
pub const SUMMARY_MAX_CHARS: usize = 1500;

pub const NO_SUMMARY: &str = "No textual summary found.";

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Search endpoint returned {0}")]
    Status(u16),

    #[error("Failed to read search results: {0}")]
    Parse(String),
}

#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Up to `max_results` hits for `query`, best first
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError>;
}

#[async_trait]
pub trait SummaryFetcher: Send + Sync {
    /// Readable text from the first `max_paragraphs` paragraphs of `url`
    ///
    /// Never fails: problems are described in the returned text.
    async fn summarize(&self, url: &str, max_paragraphs: usize) -> String;
}

/// Shared HTTP client for search and summary requests
pub fn http_client(config: &SearchConfig) -> Result<Client, SearchError> {
    Client::builder()
        .timeout(Duration::from_secs(config.timeout_secs))
        .user_agent(config.user_agent.clone())
        .build()
        .map_err(|e| SearchError::Network(e.to_string()))
}

/// DuckDuckGo HTML search
pub struct DuckDuckGoSearch {
    base_url: String,
    client: Client,
}

impl DuckDuckGoSearch {
    pub fn new(base_url: impl Into<String>, client: Client) -> Self {
        Self {
            base_url: base_url.into(),
            client,
        }
    }
}

#[async_trait]
impl SearchProvider for DuckDuckGoSearch {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
        debug!("Searching for {:?}", query);

        let response = self
            .client
            .get(&self.base_url)
            .query(&[("q", query)])
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        let body = response
            .text()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))?;

        let hits = extract_results(&body, max_results)?;
        debug!("Search returned {} hits", hits.len());
        Ok(hits)
    }
}

/// Fetches a page and keeps its leading paragraphs
pub struct PageSummarizer {
    client: Client,
}

impl PageSummarizer {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    async fn fetch(&self, url: &str) -> Result<String, SearchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| SearchError::Network(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SearchError::Status(response.status().as_u16()));
        }

        response
            .text()
            .await
            .map_err(|e| SearchError::Parse(e.to_string()))
    }
}

#[async_trait]
impl SummaryFetcher for PageSummarizer {
    async fn summarize(&self, url: &str, max_paragraphs: usize) -> String {
        match self.fetch(url).await {
            Ok(body) => summarize_html(&body, max_paragraphs),
            Err(e) => {
                warn!("Summary fetch for {:?} failed: {}", url, e);
                format!("Could not fetch summary: {}", e)
            }
        }
    }
}

struct Selectors {
    anchor: Selector,
    paragraph: Selector,
}

static SELECTORS: OnceLock<Option<Selectors>> = OnceLock::new();

fn selectors() -> Option<&'static Selectors> {
    SELECTORS
        .get_or_init(|| {
            Some(Selectors {
                anchor: Selector::parse("a.result__a").ok()?,
                paragraph: Selector::parse("p").ok()?,
            })
        })
        .as_ref()
}

/// Pull result titles and links out of a DuckDuckGo HTML page
pub fn extract_results(html: &str, max_results: usize) -> Result<Vec<SearchHit>, SearchError> {
    let sel = selectors().ok_or_else(|| SearchError::Parse("invalid result selector".into()))?;
    let doc = Html::parse_document(html);

    Ok(doc
        .select(&sel.anchor)
        .take(max_results)
        .map(|anchor| {
            let href = anchor
                .value()
                .attr("href")
                .map(resolve_redirect)
                .unwrap_or_default();
            SearchHit::new(text_content(anchor), href)
        })
        .collect())
}

/// Join the first `max_paragraphs` paragraphs of a page, capped at
/// `SUMMARY_MAX_CHARS`
pub fn summarize_html(html: &str, max_paragraphs: usize) -> String {
    let Some(sel) = selectors() else {
        return NO_SUMMARY.to_string();
    };
    let doc = Html::parse_document(html);

    let paragraphs: Vec<String> = doc
        .select(&sel.paragraph)
        .take(max_paragraphs)
        .map(text_content)
        .collect();

    let joined = paragraphs.join(" ");
    let joined = joined.trim();
    if joined.is_empty() {
        return NO_SUMMARY.to_string();
    }

    joined.chars().take(SUMMARY_MAX_CHARS).collect()
}

/// Unwrap DuckDuckGo's `/l/?uddg=<target>` redirect links
fn resolve_redirect(href: &str) -> String {
    let absolute = if href.starts_with("//") {
        format!("https:{}", href)
    } else {
        href.to_string()
    };

    match Url::parse(&absolute) {
        Ok(url) if url.path().starts_with("/l/") => url
            .query_pairs()
            .find(|(k, _)| k == "uddg")
            .map(|(_, v)| v.into_owned())
            .unwrap_or(absolute),
        _ => absolute,
    }
}

/// Text of an element with whitespace runs collapsed
fn text_content(el: ElementRef<'_>) -> String {
    el.text()
        .collect::<String>()
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const RESULTS_PAGE: &str = r#"
        <div class="result">
          <a rel="nofollow" class="result__a" href="//duckduckgo.com/l/?uddg=https%3A%2F%2Fexample.com%2Frust&amp;rut=abc">The <b>Rust</b> Language</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://example.org/two">Second &amp; more</a>
        </div>
        <div class="result">
          <a class="result__a" href="https://example.net/three">Third</a>
        </div>
    "#;

    #[test]
    fn test_extract_results() {
        let hits = extract_results(RESULTS_PAGE, 3).unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "The Rust Language");
        assert_eq!(hits[0].href, "https://example.com/rust");
        assert_eq!(hits[1].title, "Second & more");
        assert_eq!(hits[1].href, "https://example.org/two");
    }

    #[test]
    fn test_extract_respects_limit() {
        assert_eq!(extract_results(RESULTS_PAGE, 2).unwrap().len(), 2);
        assert!(extract_results("<html></html>", 3).unwrap().is_empty());
    }

    #[test]
    fn test_summary_takes_leading_paragraphs() {
        let html = "<p>First  para.</p><p class=\"x\">Second <i>one</i>.</p><p>Third.</p>";
        assert_eq!(summarize_html(html, 2), "First para. Second one.");
    }

    #[test]
    fn test_summary_decodes_entities_and_unclosed_paragraphs() {
        let html = "<p>It&#8217;s &amp; more<p>Next &lt;one&gt;<div>after</div>";
        assert_eq!(summarize_html(html, 2), "It\u{2019}s & more Next <one>");
    }

    #[test]
    fn test_summary_without_paragraphs() {
        assert_eq!(summarize_html("<div>nothing</div>", 2), NO_SUMMARY);
    }

    #[test]
    fn test_summary_is_capped() {
        let html = format!("<p>{}</p>", "é".repeat(4000));
        assert_eq!(summarize_html(&html, 2).chars().count(), SUMMARY_MAX_CHARS);
    }
}
