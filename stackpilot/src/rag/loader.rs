//! Document sources and the loader that turns them into text.

use crate::errors::{StackError, StackResult};
use md5::{Digest, Md5};
use std::fmt;
#[cfg(feature = "web")]
use std::time::Duration;

/// A document to ingest: a URL to fetch, or text supplied inline.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DocumentSource {
    /// An `http` or `https` URL.
    Url(String),
    /// Text carried in the request.
    Inline(String),
}

impl DocumentSource {
    /// Classifies a request field: anything with an http(s) scheme is a URL.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        let trimmed = value.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            Self::Url(trimmed.to_string())
        } else {
            Self::Inline(value.to_string())
        }
    }

    /// The raw locator or text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::Url(s) | Self::Inline(s) => s,
        }
    }

    /// Loader kind recorded with the loader metadata.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Url(_) => "WebLoader",
            Self::Inline(_) => "TextLoader",
        }
    }

    /// Stable loader identifier: MD5 hex of the source.
    #[must_use]
    pub fn loader_id(&self) -> String {
        let digest = Md5::digest(self.as_str().as_bytes());
        format!("{}_{}", self.kind(), hex::encode(digest))
    }
}

impl fmt::Display for DocumentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Url(url) => write!(f, "{url}"),
            Self::Inline(text) => write!(f, "inline text ({} bytes)", text.len()),
        }
    }
}

/// Produces plain text for a [`DocumentSource`].
#[derive(Debug, Clone)]
pub struct DocumentLoader {
    #[cfg(feature = "web")]
    client: reqwest::Client,
}

impl Default for DocumentLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl DocumentLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new() -> Self {
        Self {
            #[cfg(feature = "web")]
            client: reqwest::Client::builder()
                .timeout(Duration::from_secs(60))
                .user_agent(concat!("stackpilot/", env!("CARGO_PKG_VERSION")))
                .build()
                .unwrap_or_default(),
        }
    }

    /// Returns the text of `source`.
    pub async fn load(&self, source: &DocumentSource) -> StackResult<String> {
        match source {
            DocumentSource::Inline(text) => Ok(text.clone()),
            DocumentSource::Url(url) => self.fetch(url).await,
        }
    }

    #[cfg(feature = "web")]
    async fn fetch(&self, url: &str) -> StackResult<String> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        let is_html = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map_or(true, |v| v.contains("html"));
        let body = response.text().await?;
        if !status.is_success() {
            return Err(StackError::Http(format!("GET {url} failed: status={status}")));
        }
        Ok(if is_html { html_to_text(&body) } else { body })
    }

    #[cfg(not(feature = "web"))]
    async fn fetch(&self, url: &str) -> StackResult<String> {
        Err(StackError::Http(format!(
            "cannot fetch {url}: built without the `web` feature"
        )))
    }
}

/// Extracts the visible text of an HTML page.
#[cfg(feature = "web")]
#[must_use]
pub fn html_to_text(html: &str) -> String {
    use scraper::{Html, Node};

    let document = Html::parse_document(html);
    let mut parts = Vec::new();
    for node in document.tree.nodes() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let hidden = node.ancestors().any(|a| {
            a.value().as_element().is_some_and(|e| {
                matches!(e.name(), "script" | "style" | "noscript" | "head" | "template")
            })
        });
        if !hidden && !text.trim().is_empty() {
            parts.push(text.trim().to_string());
        }
    }
    super::chunk::normalize_whitespace(&parts.join(" "))
}
