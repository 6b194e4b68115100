//! Add-paper workflow: resolve metadata, create the item, upload the PDF.
//!
//! Failures before item creation leave the library untouched. Once the item
//! exists it is never rolled back: upload-phase failures come back as
//! [`ZoteroError::UploadFailed`] carrying the item key.

use crate::catalog::{CatalogClient, CatalogItem, PDF_CONTENT_TYPE};
use crate::config::Config;
use crate::error::{Result, ZoteroError};
use crate::metadata::{InputSource, MetadataRecord};
use crate::resolver::MetadataResolver;
use crate::upload::{UploadCoordinator, UploadResult};
use std::path::Path;
use tracing::{info, warn};

/// Result of adding one input
#[derive(Debug, Clone)]
pub struct AddPaperOutcome {
    pub item_key: String,
    pub record: MetadataRecord,
    /// Present for PDF inputs
    pub upload: Option<UploadResult>,
}

/// Item as read back from the library after adding it
#[derive(Debug, Clone)]
pub struct Verification {
    pub item: CatalogItem,
    pub attachments: Vec<CatalogItem>,
}

pub struct AddPaperWorkflow {
    resolver: MetadataResolver,
    client: CatalogClient,
}

impl AddPaperWorkflow {
    /// Build the resolver and library client from one config
    pub fn new(config: &Config) -> Result<Self> {
        Ok(Self::from_parts(
            MetadataResolver::new(config)?,
            CatalogClient::new(config)?,
        ))
    }

    pub fn from_parts(resolver: MetadataResolver, client: CatalogClient) -> Self {
        Self { resolver, client }
    }

    /// Resolve metadata without touching the library
    pub async fn resolve(&self, input: &InputSource) -> Result<MetadataRecord> {
        Ok(self.resolver.resolve(input).await?)
    }

    /// Add an input to the library
    pub async fn run(&self, input: &InputSource) -> Result<AddPaperOutcome> {
        let record = self.resolve(input).await?;
        info!(title = %record.title, item_type = record.item_type.as_str(), "Resolved metadata");

        let item_key = self.client.create_item(&record).await?;

        let upload = match input {
            InputSource::Pdf(path) => match self.attach(&item_key, path).await {
                Ok(result) => Some(result),
                Err(e) => {
                    warn!(item_key = %item_key, error = %e, "Item created but attachment failed");
                    return Err(ZoteroError::UploadFailed {
                        item_key,
                        source: Box::new(e),
                    });
                }
            },
            InputSource::Url(_) => None,
        };

        Ok(AddPaperOutcome {
            item_key,
            record,
            upload,
        })
    }

    /// Create the attachment stub and upload the file into it
    async fn attach(&self, item_key: &str, path: &Path) -> Result<UploadResult> {
        // The name is sent as-is; a lossy conversion would store a different one
        let filename = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| ZoteroError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::new(
                    std::io::ErrorKind::InvalidInput,
                    "file name is missing or not valid UTF-8",
                ),
            })?;

        let stub = self
            .client
            .create_attachment_stub(item_key, filename, PDF_CONTENT_TYPE)
            .await?;

        UploadCoordinator::new(&self.client).upload(path, &stub).await
    }

    /// Read an item and its attachments back from the library
    pub async fn verify(&self, item_key: &str) -> Result<Verification> {
        let item = self.client.get_item(item_key).await?;
        let attachments = self
            .client
            .item_children(item_key)
            .await?
            .into_iter()
            .filter(|c| c.is_attachment())
            .collect();
        Ok(Verification { item, attachments })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LibraryType;
    use crate::error::ResolveError;
    use crate::metadata::ItemType;
    use crate::pdf::{PdfText, PdfTextExtractor};
    use crate::upload::UploadStatus;
    use mockito::Matcher;
    use serde_json::json;
    use std::io::Write;
    use std::path::PathBuf;
    use std::sync::Arc;
    use url::Url;

    struct FixtureExtractor(&'static str);

    impl PdfTextExtractor for FixtureExtractor {
        fn extract(&self, _path: &Path) -> std::result::Result<PdfText, ResolveError> {
            Ok(PdfText {
                head: self.0.to_string(),
                full: self.0.to_string(),
            })
        }
    }

    fn workflow_for(server: &mockito::Server, pdf_text: &'static str) -> AddPaperWorkflow {
        let mut config = Config::new("test-key", "5", LibraryType::Group);
        config.api_base_url = server.url();
        config.crossref_base_url = server.url();
        let resolver = MetadataResolver::new(&config)
            .expect("resolver")
            .with_extractor(Arc::new(FixtureExtractor(pdf_text)));
        AddPaperWorkflow::from_parts(resolver, CatalogClient::new(&config).expect("client"))
    }

    fn temp_pdf(contents: &[u8]) -> tempfile::NamedTempFile {
        let mut temp = tempfile::Builder::new()
            .suffix(".pdf")
            .tempfile()
            .expect("temp pdf");
        temp.write_all(contents).expect("write");
        temp
    }

    fn file_name(path: &Path) -> String {
        path.file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_default()
    }

    #[tokio::test]
    async fn test_url_input_creates_item_without_upload() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let page_url = format!("{}/a", server.url());

        let _page = server
            .mock("GET", "/a")
            .with_status(200)
            .with_body("<html><head><title>Example Article</title></head></html>")
            .create_async()
            .await;
        let create = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Json(json!([{
                "itemType": "webpage",
                "title": "Example Article",
                "creators": [],
                "url": page_url
            }])))
            .with_status(200)
            .with_body(json!({"successful": {"0": {"key": "WEB00001"}}}).to_string())
            .expect(1)
            .create_async()
            .await;

        let workflow = workflow_for(&server, "");
        let input = InputSource::Url(Url::parse(&page_url).expect("url"));
        let outcome = workflow.run(&input).await?;

        create.assert_async().await;
        assert_eq!(outcome.item_key, "WEB00001");
        assert_eq!(outcome.record.item_type, ItemType::Webpage);
        assert!(outcome.record.doi.is_none());
        assert!(outcome.upload.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_item_rejection_stops_before_attachment() {
        let mut server = mockito::Server::new_async().await;
        let temp = temp_pdf(b"%PDF");

        let create = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Regex(r#""itemType":"journalArticle""#.into()))
            .with_status(400)
            .with_body("Invalid creator")
            .expect(1)
            .create_async()
            .await;
        let attachment = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Regex(r#""itemType":"attachment""#.into()))
            .expect(0)
            .create_async()
            .await;

        let workflow = workflow_for(&server, "Some Title\n");
        let err = workflow
            .run(&InputSource::Pdf(temp.path().to_path_buf()))
            .await
            .expect_err("400 must fail");

        create.assert_async().await;
        attachment.assert_async().await;
        assert!(matches!(err, ZoteroError::ItemCreation { status: 400, .. }));
        assert!(err.orphaned_item_key().is_none());
    }

    #[tokio::test]
    async fn test_pdf_input_full_upload() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let temp = temp_pdf(b"%PDF-1.4 paper");
        let filename = file_name(temp.path());

        let create = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Regex(r#""title":"Deep Learning for Cats""#.into()))
            .with_status(200)
            .with_body(json!({"successful": {"0": {"key": "ITEM0001"}}}).to_string())
            .expect(1)
            .create_async()
            .await;
        let attachment = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex(r#""itemType":"attachment""#.into()),
                Matcher::Regex(r#""parentItem":"ITEM0001""#.into()),
            ]))
            .with_status(200)
            .with_body(json!({"successful": {"0": {"key": "ATTACH01"}}}).to_string())
            .expect(1)
            .create_async()
            .await;
        let _auth = server
            .mock("POST", "/groups/5/items/ATTACH01/file")
            .match_body(Matcher::AllOf(vec![
                Matcher::Regex("^md5=".into()),
                Matcher::UrlEncoded("filename".into(), filename.clone()),
            ]))
            .with_status(200)
            .with_body(
                json!({"url": format!("{}/s3", server.url()), "contentType": "application/pdf", "uploadKey": "UP1"})
                    .to_string(),
            )
            .create_async()
            .await;
        let transfer = server
            .mock("POST", "/s3")
            .with_status(201)
            .expect(1)
            .create_async()
            .await;
        let register = server
            .mock("POST", "/groups/5/items/ATTACH01/file")
            .match_body(Matcher::UrlEncoded("upload".into(), "UP1".into()))
            .with_status(204)
            .expect(1)
            .create_async()
            .await;

        let workflow = workflow_for(&server, "Deep Learning for Cats\nJane Smith\n");
        let outcome = workflow
            .run(&InputSource::Pdf(temp.path().to_path_buf()))
            .await?;

        create.assert_async().await;
        attachment.assert_async().await;
        transfer.assert_async().await;
        register.assert_async().await;

        assert_eq!(outcome.item_key, "ITEM0001");
        let upload = outcome.upload.expect("pdf inputs upload");
        assert_eq!(upload.status, UploadStatus::Uploaded);
        assert_eq!(upload.stub.filename, filename);
        assert_eq!(upload.stub.parent_item, "ITEM0001");
        assert!(upload.stub.md5.is_some());
        Ok(())
    }

    #[tokio::test]
    async fn test_upload_failure_reports_created_item() {
        let mut server = mockito::Server::new_async().await;
        let temp = temp_pdf(b"%PDF-1.4 paper");

        let _create = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Regex(r#""itemType":"journalArticle""#.into()))
            .with_status(200)
            .with_body(json!({"successful": {"0": {"key": "ITEM0002"}}}).to_string())
            .create_async()
            .await;
        let _attachment = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Regex(r#""itemType":"attachment""#.into()))
            .with_status(200)
            .with_body(json!({"successful": {"0": {"key": "ATTACH02"}}}).to_string())
            .create_async()
            .await;
        let _auth = server
            .mock("POST", "/groups/5/items/ATTACH02/file")
            .with_status(200)
            .with_body(r#"{"unexpected":true}"#)
            .create_async()
            .await;

        let workflow = workflow_for(&server, "A Title\n");
        let err = workflow
            .run(&InputSource::Pdf(temp.path().to_path_buf()))
            .await
            .expect_err("upload must fail");

        assert_eq!(err.orphaned_item_key(), Some("ITEM0002"));
        match err {
            ZoteroError::UploadFailed { source, .. } => {
                assert!(matches!(*source, ZoteroError::UnexpectedServerResponse(_)));
            }
            other => panic!("expected UploadFailed, got {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_non_utf8_file_name_is_not_uploaded() {
        use std::ffi::OsStr;
        use std::os::unix::ffi::OsStrExt;

        let mut server = mockito::Server::new_async().await;
        let _create = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Regex(r#""itemType":"journalArticle""#.into()))
            .with_status(200)
            .with_body(json!({"successful": {"0": {"key": "ITEM0003"}}}).to_string())
            .create_async()
            .await;
        let attachment = server
            .mock("POST", "/groups/5/items")
            .match_body(Matcher::Regex(r#""itemType":"attachment""#.into()))
            .expect(0)
            .create_async()
            .await;

        let path = Path::new("/papers").join(OsStr::from_bytes(b"r\xe9sum\xe9.pdf"));
        let workflow = workflow_for(&server, "A Title\n");
        let err = workflow
            .run(&InputSource::Pdf(path.clone()))
            .await
            .expect_err("non-UTF-8 name must fail");

        attachment.assert_async().await;
        assert_eq!(err.orphaned_item_key(), Some("ITEM0003"));
        match err {
            ZoteroError::UploadFailed { source, .. } => match *source {
                ZoteroError::FileRead { path: ref failed, ref source } => {
                    assert_eq!(failed, &path);
                    assert_eq!(source.kind(), std::io::ErrorKind::InvalidInput);
                }
                other => panic!("expected FileRead, got {:?}", other),
            },
            other => panic!("expected UploadFailed, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_resolution_failure_creates_nothing() {
        let mut server = mockito::Server::new_async().await;
        let create = server
            .mock("POST", "/groups/5/items")
            .expect(0)
            .create_async()
            .await;

        let workflow = workflow_for(&server, "");
        let err = workflow
            .run(&InputSource::Pdf(PathBuf::from("notes.docx")))
            .await
            .expect_err("non-pdf must fail");

        create.assert_async().await;
        assert!(matches!(err, ZoteroError::ResolutionFailed(_)));
    }

    #[tokio::test]
    async fn test_verify() -> Result<()> {
        let mut server = mockito::Server::new_async().await;
        let _item = server
            .mock("GET", "/groups/5/items/ITEM0001")
            .with_status(200)
            .with_body(
                json!({"key": "ITEM0001", "version": 3, "data": {"itemType": "journalArticle", "title": "T"}})
                    .to_string(),
            )
            .create_async()
            .await;
        let _children = server
            .mock("GET", "/groups/5/items/ITEM0001/children")
            .with_status(200)
            .with_body(
                json!([
                    {"key": "ATTACH01", "data": {"itemType": "attachment", "filename": "p.pdf"}},
                    {"key": "NOTE0001", "data": {"itemType": "note"}}
                ])
                .to_string(),
            )
            .create_async()
            .await;

        let verification = workflow_for(&server, "").verify("ITEM0001").await?;
        assert_eq!(verification.item.data.title, "T");
        assert_eq!(verification.attachments.len(), 1);
        assert_eq!(verification.attachments[0].key, "ATTACH01");
        Ok(())
    }
}
