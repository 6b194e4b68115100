//! Metadata resolution for PDFs and web pages.
//!
//! PDFs: search the text for a DOI, ask Crossref about it, and fall back to
//! guesses from the first pages. Web pages: fetch and read `<title>`.
//! Title/author guessing never fails; only unreadable inputs do.

use crate::config::Config;
use crate::crossref::CrossrefClient;
use crate::error::{ResolveError, Result, ZoteroError};
use crate::metadata::{has_pdf_extension, InputSource, MetadataRecord};
use crate::pdf::{LopdfExtractor, PdfTextExtractor};
use chrono::Datelike;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};
use url::Url;

/// User agent string for page fetches
const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// Longest line still considered an author list
const MAX_AUTHOR_LINE: usize = 200;

static DOI_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"10\.\d{4,9}/[^\s"<>]+"#).expect("valid regex"));
static YEAR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b(19|20)\d{2}\b").expect("valid regex"));
static AUTHOR_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s*(?:,|;|\band\b|&)\s*").expect("valid regex"));

/// Best-effort metadata read from PDF text
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextGuess {
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub year: Option<i32>,
}

/// Turns inputs into [`MetadataRecord`]s
pub struct MetadataResolver {
    http: reqwest::Client,
    crossref: CrossrefClient,
    extractor: Arc<dyn PdfTextExtractor>,
}

impl MetadataResolver {
    /// Create a resolver using the configured timeout and Crossref endpoint
    pub fn new(config: &Config) -> Result<Self> {
        let http = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ZoteroError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let crossref =
            CrossrefClient::new(config.request_timeout())?.with_base_url(&config.crossref_base_url);

        Ok(Self {
            http,
            crossref,
            extractor: Arc::new(LopdfExtractor::default()),
        })
    }

    /// Replace the PDF text source
    pub fn with_extractor(mut self, extractor: Arc<dyn PdfTextExtractor>) -> Self {
        self.extractor = extractor;
        self
    }

    /// Resolve an input into a metadata record
    ///
    /// # Errors
    ///
    /// `UnreadableInput` for files that cannot be opened or parsed,
    /// `UnreachableUrl` for pages that cannot be fetched.
    pub async fn resolve(&self, input: &InputSource) -> std::result::Result<MetadataRecord, ResolveError> {
        match input {
            InputSource::Pdf(path) => self.resolve_pdf(path).await,
            InputSource::Url(url) => self.resolve_url(url).await,
        }
    }

    async fn resolve_pdf(&self, path: &Path) -> std::result::Result<MetadataRecord, ResolveError> {
        if !has_pdf_extension(path) {
            return Err(ResolveError::UnreadableInput {
                path: path.to_path_buf(),
                reason: "unsupported file type, expected a .pdf file".to_string(),
            });
        }

        info!(path = ?path, "Resolving PDF metadata");

        let extractor = Arc::clone(&self.extractor);
        let owned = path.to_path_buf();
        let text = tokio::task::spawn_blocking(move || extractor.extract(&owned))
            .await
            .map_err(|e| ResolveError::UnreadableInput {
                path: path.to_path_buf(),
                reason: format!("text extraction aborted: {}", e),
            })??;

        let guess = guess_from_text(&text.head);
        let doi = find_doi(&text.full);
        let TextGuess {
            mut title,
            mut authors,
            mut year,
        } = guess;

        if let Some(doi) = &doi {
            info!(doi = %doi, "Found DOI in PDF text");
            match self.crossref.lookup_by_doi(doi).await {
                Ok(Some(work)) => {
                    if !work.title.is_empty() {
                        title = Some(work.title);
                    }
                    if !work.authors.is_empty() {
                        authors = work.authors;
                    }
                    year = work.year.or(year);
                }
                Ok(None) => {
                    info!(doi = %doi, "DOI unknown to Crossref, using text heuristics");
                }
                Err(e) => {
                    warn!(doi = %doi, error = %e, "DOI lookup failed, using text heuristics");
                }
            }
        } else {
            debug!(path = ?path, "No DOI found in PDF text");
        }

        let title = title.unwrap_or_else(|| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| path.display().to_string());
            warn!(path = ?path, title = %stem, "No title found, using file name");
            stem
        });

        Ok(MetadataRecord::article(title, authors, year, doi))
    }

    async fn resolve_url(&self, url: &Url) -> std::result::Result<MetadataRecord, ResolveError> {
        info!(url = %url, "Fetching web page");

        let unreachable = |reason: String| ResolveError::UnreachableUrl {
            url: url.to_string(),
            reason,
        };

        let response = self
            .http
            .get(url.clone())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .send()
            .await
            .map_err(|e| unreachable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(unreachable(format!("HTTP {}", status)));
        }

        let html = response.text().await.map_err(|e| unreachable(e.to_string()))?;

        let title = parse_page_title(&html).unwrap_or_else(|| {
            warn!(url = %url, "Page has no title, using the URL");
            url.to_string()
        });

        debug!(url = %url, title = %title, "Resolved page title");
        Ok(MetadataRecord::webpage(title, url.as_str()))
    }
}

/// Find the first DOI in text, without trailing punctuation
pub fn find_doi(text: &str) -> Option<String> {
    DOI_RE
        .find(text)
        .map(|m| {
            m.as_str()
                .trim_end_matches(|c: char| ".,;:)]}'".contains(c))
                .to_string()
        })
        .filter(|doi| doi.contains('/') && !doi.ends_with('/'))
}

/// Guess title, authors and year from the first pages of a PDF
pub fn guess_from_text(head: &str) -> TextGuess {
    let mut lines = head
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty());

    let title = lines.next();
    let authors = lines.next().map(|l| parse_author_line(&l)).unwrap_or_default();

    let max_year = chrono::Utc::now().year() + 1;
    let year = YEAR_RE
        .find_iter(head)
        .filter_map(|m| m.as_str().parse::<i32>().ok())
        .find(|y| *y <= max_year);

    TextGuess {
        title,
        authors,
        year,
    }
}

/// Split a line into author names if it looks like an author list
///
/// A name list needs at least one separator; a lone capitalized line is
/// more often a subtitle or a wrapped title than a single author.
fn parse_author_line(line: &str) -> Vec<String> {
    if line.len() > MAX_AUTHOR_LINE
        || line.chars().any(|c| c.is_ascii_digit() || c == '@')
        || !AUTHOR_SPLIT_RE.is_match(line)
    {
        return Vec::new();
    }

    let names: Vec<String> = AUTHOR_SPLIT_RE
        .split(line)
        .map(|n| n.trim().to_string())
        .filter(|n| !n.is_empty())
        .collect();

    let plausible = |name: &String| {
        let words = name.split_whitespace().count();
        (2..=4).contains(&words)
            && name
                .split_whitespace()
                .all(|w| w.chars().next().map(|c| c.is_uppercase()).unwrap_or(false))
    };

    if names.is_empty() || !names.iter().all(plausible) {
        return Vec::new();
    }
    names
}

/// Extract a page title from HTML
///
/// Prefers `<title>`, then `og:title`.
pub fn parse_page_title(html: &str) -> Option<String> {
    let document = Html::parse_document(html);

    let title_selector = Selector::parse("title").ok()?;
    let og_selector = Selector::parse(r#"meta[property="og:title"]"#).ok()?;

    let from_title = document
        .select(&title_selector)
        .next()
        .map(|t| collapse(&t.text().collect::<String>()))
        .filter(|t| !t.is_empty());

    from_title.or_else(|| {
        document
            .select(&og_selector)
            .next()
            .and_then(|m| m.value().attr("content"))
            .map(collapse)
            .filter(|t| !t.is_empty())
    })
}

fn collapse(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
