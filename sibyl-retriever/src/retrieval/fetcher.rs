//! Concurrent page fetching and HTML text extraction.
//!
//! Pages are fetched concurrently and reduced to plain text by walking the
//! parsed DOM: the `<main>` element when present (falling back to `<body>`),
//! with script, style, and navigation chrome subtrees skipped. A page that
//! fails to fetch or yields no text is logged and dropped; one bad URL never
//! aborts a corpus build.

use crate::retrieval::types::Document;
use anyhow::Result;
use async_trait::async_trait;
use scraper::{Html, Node, Selector};
use sibyl_chunk::text::normalize_whitespace;
use std::time::Duration;

/// Default timeout for a single page fetch.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Browser-like user agent; some sites serve bots an empty shell.
pub const DEFAULT_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
     AppleWebKit/537.36 (KHTML, like Gecko) Chrome/128.0.0.0 Safari/537.36";

/// Subtrees that never contribute corpus text.
const EXCLUDED_TAGS: &[&str] = &["script", "style", "nav", "footer", "header", "aside"];

/// Source of documents for a corpus build.
#[async_trait]
pub trait DocumentFetcher: Send + Sync {
    /// Fetches one URL. Returns `None` when the page is unreachable or has no
    /// extractable text; the failure is logged, not propagated.
    async fn fetch(&self, url: &str) -> Option<Document>;

    /// Fetches all URLs concurrently, keeping the successes in input order.
    async fn fetch_all(&self, urls: &[String]) -> Vec<Document> {
        let fetches = urls.iter().map(|url| self.fetch(url));
        let documents: Vec<Document> = futures::future::join_all(fetches)
            .await
            .into_iter()
            .flatten()
            .collect();
        tracing::info!("fetched {}/{} pages", documents.len(), urls.len());
        documents
    }
}

/// Extracts readable text from an HTML document.
///
/// Walks the `<main>` subtree (or `<body>` when no `<main>` exists), skipping
/// [`EXCLUDED_TAGS`] subtrees, and joins the text nodes with single spaces.
/// The result is whitespace-normalized; documents with no text root yield an
/// empty string.
pub fn extract_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let main_selector = Selector::parse("main").unwrap();
    let body_selector = Selector::parse("body").unwrap();

    let root = document
        .select(&main_selector)
        .next()
        .or_else(|| document.select(&body_selector).next());

    let Some(root) = root else {
        return String::new();
    };

    let mut collected = String::new();
    for node in root.descendants() {
        if let Node::Text(text) = node.value() {
            let excluded = node.ancestors().any(|ancestor| match ancestor.value() {
                Node::Element(element) => EXCLUDED_TAGS.contains(&element.name()),
                _ => false,
            });
            if !excluded {
                collected.push_str(text);
                collected.push(' ');
            }
        }
    }

    normalize_whitespace(&collected)
}

/// HTTP document fetcher backed by a shared reqwest client.
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    /// Creates a fetcher with the default timeout and user agent.
    pub fn new() -> Result<Self> {
        Self::with_timeout(DEFAULT_FETCH_TIMEOUT)
    }

    /// Creates a fetcher with a custom per-request timeout.
    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(DEFAULT_USER_AGENT)
            .timeout(timeout)
            .build()?;
        Ok(Self { client })
    }

    async fn fetch_inner(&self, url: &str) -> Result<Option<Document>> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let html = response.text().await?;

        let text = extract_text(&html);
        if text.is_empty() {
            return Ok(None);
        }

        Ok(Some(Document {
            source: url.to_string(),
            text,
        }))
    }
}

#[async_trait]
impl DocumentFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Option<Document> {
        match self.fetch_inner(url).await {
            Ok(Some(document)) => {
                tracing::debug!("fetched {} ({} chars)", url, document.text.len());
                Some(document)
            }
            Ok(None) => {
                tracing::warn!("page has no extractable text: {}", url);
                None
            }
            Err(error) => {
                tracing::warn!("failed to fetch {}: {error:#}", url);
                None
            }
        }
    }
}
