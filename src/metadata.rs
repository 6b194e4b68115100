//! Bibliographic metadata and input classification.

use serde::Serialize;
use std::path::{Path, PathBuf};
use url::Url;

/// Zotero item type assigned to a resolved input
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemType {
    JournalArticle,
    Webpage,
}

impl ItemType {
    /// Name used by the Zotero API
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::JournalArticle => "journalArticle",
            ItemType::Webpage => "webpage",
        }
    }
}

/// Metadata resolved for one input
///
/// Built once by the resolver and never mutated afterwards. A webpage
/// record never carries a DOI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MetadataRecord {
    pub title: String,
    pub authors: Vec<String>,
    pub year: Option<i32>,
    pub doi: Option<String>,
    pub item_type: ItemType,
    /// Source URL for web pages
    pub url: Option<String>,
}

impl MetadataRecord {
    /// Record for a journal article found in a PDF
    pub fn article(
        title: impl Into<String>,
        authors: Vec<String>,
        year: Option<i32>,
        doi: Option<String>,
    ) -> Self {
        Self {
            title: title.into(),
            authors,
            year,
            doi,
            item_type: ItemType::JournalArticle,
            url: None,
        }
    }

    /// Record for a web page; authors, year and DOI stay empty
    pub fn webpage(title: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            authors: Vec::new(),
            year: None,
            doi: None,
            item_type: ItemType::Webpage,
            url: Some(url.into()),
        }
    }
}

/// What the user asked to add
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InputSource {
    /// Local PDF file
    Pdf(PathBuf),
    /// Remote web page
    Url(Url),
}

impl InputSource {
    /// Classify a command-line argument
    ///
    /// `http://` and `https://` strings are URLs; anything else is a path.
    /// A string that looks like a URL but does not parse is treated as a path,
    /// which then fails to open.
    pub fn parse(input: &str) -> Self {
        let trimmed = input.trim();
        let lower = trimmed.to_ascii_lowercase();
        if lower.starts_with("http://") || lower.starts_with("https://") {
            if let Ok(url) = Url::parse(trimmed) {
                return InputSource::Url(url);
            }
        }
        InputSource::Pdf(PathBuf::from(trimmed))
    }

    pub fn is_pdf(&self) -> bool {
        matches!(self, InputSource::Pdf(_))
    }
}

/// True when the path carries a `.pdf` extension
pub fn has_pdf_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|e| e.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}
