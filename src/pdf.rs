//! PDF text extraction.
//!
//! The resolver only needs raw text: a short prefix for title/author/year
//! guesses and the whole document for DOI search. [`LopdfExtractor`] is the
//! default implementation; tests swap in fixtures through [`PdfTextExtractor`].

use crate::error::ResolveError;
use lopdf::Document;
use std::path::Path;
use tracing::{debug, warn};

/// Number of leading pages used for title/author heuristics
pub const DEFAULT_HEAD_PAGES: usize = 2;

/// Raw text pulled from a PDF
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PdfText {
    /// Text of the first pages
    pub head: String,
    /// Text of every page
    pub full: String,
}

/// Source of PDF text
pub trait PdfTextExtractor: Send + Sync {
    fn extract(&self, path: &Path) -> Result<PdfText, ResolveError>;
}

/// Extractor backed by `lopdf`
#[derive(Debug, Clone)]
pub struct LopdfExtractor {
    head_pages: usize,
}

impl LopdfExtractor {
    pub fn new(head_pages: usize) -> Self {
        Self { head_pages }
    }
}

impl Default for LopdfExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_HEAD_PAGES)
    }
}

impl PdfTextExtractor for LopdfExtractor {
    fn extract(&self, path: &Path) -> Result<PdfText, ResolveError> {
        let bytes = std::fs::read(path).map_err(|e| unreadable(path, e.to_string()))?;

        // Empty files are accepted as documents without text
        if bytes.is_empty() {
            debug!(path = ?path, "Empty PDF, no text to extract");
            return Ok(PdfText::default());
        }

        let document = Document::load_mem(&bytes)
            .map_err(|e| unreadable(path, format!("not a readable PDF: {}", e)))?;

        let page_numbers: Vec<u32> = document.get_pages().keys().copied().collect();
        let mut text = PdfText::default();

        for (idx, page) in page_numbers.iter().enumerate() {
            match document.extract_text(&[*page]) {
                Ok(page_text) => {
                    if idx < self.head_pages {
                        text.head.push_str(&page_text);
                        text.head.push('\n');
                    }
                    text.full.push_str(&page_text);
                    text.full.push('\n');
                }
                Err(e) => {
                    warn!(path = ?path, page = page, error = %e, "Failed to extract page text");
                }
            }
        }

        debug!(
            path = ?path,
            pages = page_numbers.len(),
            chars = text.full.len(),
            "Extracted PDF text"
        );
        Ok(text)
    }
}

fn unreadable(path: &Path, reason: String) -> ResolveError {
    ResolveError::UnreadableInput {
        path: path.to_path_buf(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::content::{Content, Operation};
    use lopdf::{dictionary, Object, Stream};
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn one_page_pdf(line: &str) -> Vec<u8> {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let font_id = doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type1",
            "BaseFont" => "Courier",
        });
        let resources_id = doc.add_object(dictionary! {
            "Font" => dictionary! {
                "F1" => font_id,
            },
        });
        let content = Content {
            operations: vec![
                Operation::new("BT", vec![]),
                Operation::new("Tf", vec!["F1".into(), 24.into()]),
                Operation::new("Td", vec![100.into(), 600.into()]),
                Operation::new("Tj", vec![Object::string_literal(line)]),
                Operation::new("ET", vec![]),
            ],
        };
        let encoded = content.encode().expect("content should encode");
        let content_id = doc.add_object(Stream::new(dictionary! {}, encoded));
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "Contents" => content_id,
        });
        let pages = dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
            "Resources" => resources_id,
            "MediaBox" => vec![0.into(), 0.into(), 595.into(), 842.into()],
        };
        doc.objects.insert(pages_id, Object::Dictionary(pages));
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        doc.trailer.set("Root", catalog_id);

        let mut bytes = Vec::new();
        doc.save_to(&mut bytes).expect("document should serialize");
        bytes
    }

    #[test]
    fn test_extract_text() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(&one_page_pdf("Hello World"))
            .expect("write pdf");

        let text = LopdfExtractor::default()
            .extract(temp.path())
            .expect("pdf should parse");
        assert!(text.head.contains("Hello"));
        assert!(text.full.contains("Hello"));
    }

    #[test]
    fn test_empty_file_has_no_text() {
        let temp = NamedTempFile::new().expect("temp file");
        let text = LopdfExtractor::default()
            .extract(temp.path())
            .expect("empty file is accepted");
        assert_eq!(text, PdfText::default());
    }

    #[test]
    fn test_garbage_is_unreadable() {
        let mut temp = NamedTempFile::new().expect("temp file");
        temp.write_all(b"definitely not a pdf").expect("write");
        let err = LopdfExtractor::default()
            .extract(temp.path())
            .expect_err("garbage must fail");
        assert!(matches!(err, ResolveError::UnreadableInput { .. }));
    }

    #[test]
    fn test_missing_file_is_unreadable() {
        let err = LopdfExtractor::default()
            .extract(Path::new("/nonexistent/paper.pdf"))
            .expect_err("missing file must fail");
        assert!(matches!(err, ResolveError::UnreadableInput { .. }));
    }
}
