//! Crossref API client for DOI lookups.
//!
//! Resolves a DOI found in a PDF to its title, authors and publication year.
//! A single request per lookup; callers fall back to text heuristics on error.

use crate::config::DEFAULT_CROSSREF_BASE_URL;
use crate::error::{Result, ZoteroError};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, info};

/// Polite pool email for Crossref API
const MAILTO: &str = "zotero-add@example.com";

/// Bibliographic data returned by Crossref
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CrossrefWork {
    pub doi: String,
    pub title: String,
    /// Authors in listed order, "Given Family"
    pub authors: Vec<String>,
    pub year: Option<i32>,
}

/// Crossref API client
pub struct CrossrefClient {
    client: reqwest::Client,
    base_url: String,
}

impl CrossrefClient {
    /// Create a new CrossrefClient
    ///
    /// # Arguments
    ///
    /// * `timeout` - Per-request timeout
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("zotero-add/0.1 (mailto:{})", MAILTO))
            .timeout(timeout)
            .build()
            .map_err(|e| ZoteroError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: DEFAULT_CROSSREF_BASE_URL.to_string(),
        })
    }

    /// Point the client at another Crossref-compatible endpoint
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Lookup a work by DOI
    ///
    /// Returns `Ok(None)` when Crossref does not know the DOI.
    pub async fn lookup_by_doi(&self, doi: &str) -> Result<Option<CrossrefWork>> {
        let url = format!("{}/works/{}", self.base_url, urlencoding::encode(doi));
        debug!(doi = doi, url = %url, "Querying Crossref");

        let response = self
            .client
            .get(&url)
            .query(&[("mailto", MAILTO)])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            info!(doi = doi, "DOI not found in Crossref");
            return Ok(None);
        }

        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ZoteroError::UnexpectedServerResponse(format!(
                "Crossref returned HTTP {}: {}",
                status.as_u16(),
                body
            )));
        }

        let data: CrossrefResponse = response.json().await?;
        let work = parse_crossref_item(data.message);
        info!(doi = doi, title = %work.title, authors = work.authors.len(), "Crossref match");
        Ok(Some(work))
    }
}

// === Crossref API Response Types ===

#[derive(Debug, Deserialize)]
struct CrossrefResponse {
    message: CrossrefItem,
}

#[derive(Debug, Deserialize)]
struct CrossrefItem {
    #[serde(rename = "DOI", default)]
    doi: String,
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CrossrefAuthor>,
    #[serde(default)]
    published: Option<CrossrefDate>,
    #[serde(rename = "published-print", default)]
    published_print: Option<CrossrefDate>,
    #[serde(default)]
    issued: Option<CrossrefDate>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
    #[serde(default)]
    given: String,
    #[serde(default)]
    family: String,
    #[serde(default)]
    name: String,
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
    #[serde(rename = "date-parts", default)]
    date_parts: Vec<Vec<Option<i32>>>,
}

impl CrossrefDate {
    fn year(&self) -> Option<i32> {
        self.date_parts.first().and_then(|p| p.first().copied().flatten())
    }
}

/// Parse Crossref API item into our work struct
fn parse_crossref_item(item: CrossrefItem) -> CrossrefWork {
    let authors = item
        .author
        .iter()
        .map(|a| {
            if a.name.trim().is_empty() {
                format!("{} {}", a.given, a.family).trim().to_string()
            } else {
                a.name.trim().to_string()
            }
        })
        .filter(|s| !s.is_empty())
        .collect();

    // Date: online publication first, then print, then issued
    let year = [&item.published, &item.published_print, &item.issued]
        .into_iter()
        .flatten()
        .find_map(|d| d.year());

    let title = item
        .title
        .into_iter()
        .next()
        .map(|t| collapse_whitespace(&t))
        .unwrap_or_default();

    CrossrefWork {
        doi: item.doi,
        title,
        authors,
        year,
    }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
