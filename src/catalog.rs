//! Zotero Web API client.
//!
//! Thin authenticated wrapper around the library endpoints used to add an
//! item and upload its attachment:
//! - `POST /{type}s/{id}/items` - create items and attachment stubs
//! - `POST /{type}s/{id}/items/{key}/file` - upload authorization and registration
//! - `POST {authorized url}` - file transfer (no API key)
//! - `GET /{type}s/{id}/items/{key}[/children]` - read back items
//!
//! Every call is a single request; nothing is retried here.

use crate::config::Config;
use crate::digest::FileDigest;
use crate::error::{OptionExt, Result, ZoteroError};
use crate::metadata::MetadataRecord;
use reqwest::header::{CONTENT_TYPE, IF_NONE_MATCH};
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use tracing::{debug, info, warn};

/// Zotero API version sent with every request
pub const API_VERSION: &str = "3";

/// Content type used for PDF attachments
pub const PDF_CONTENT_TYPE: &str = "application/pdf";

// === Request payloads ===

/// Creator entry of an item
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Creator {
    #[serde(default)]
    pub creator_type: String,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub last_name: String,
}

impl Creator {
    /// Author from a display name; the last word is the last name
    pub fn author(name: &str) -> Self {
        let name = name.trim();
        let (first, last) = match name.rsplit_once(char::is_whitespace) {
            Some((first, last)) => (first.trim(), last.trim()),
            None => ("", name),
        };
        Self {
            creator_type: "author".to_string(),
            first_name: first.to_string(),
            last_name: last.to_string(),
        }
    }
}

/// Item object sent on creation
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemPayload {
    pub item_type: String,
    pub title: String,
    pub creators: Vec<Creator>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date: Option<String>,
    #[serde(rename = "DOI", skip_serializing_if = "Option::is_none")]
    pub doi: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl From<&MetadataRecord> for ItemPayload {
    fn from(record: &MetadataRecord) -> Self {
        Self {
            item_type: record.item_type.as_str().to_string(),
            title: record.title.clone(),
            creators: record.authors.iter().map(|a| Creator::author(a)).collect(),
            date: record.year.map(|y| y.to_string()),
            doi: record.doi.clone(),
            url: record.url.clone(),
        }
    }
}

/// Attachment item sent before the upload; md5/mtime stay null until registration
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AttachmentPayload<'a> {
    item_type: &'static str,
    link_mode: &'static str,
    parent_item: &'a str,
    filename: &'a str,
    content_type: &'a str,
    md5: Option<&'a str>,
    mtime: Option<i64>,
}

// === Domain types ===

/// Attachment entity of kind `imported_file`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AttachmentStub {
    pub key: String,
    pub parent_item: String,
    pub filename: String,
    pub content_type: String,
    /// Set only after the file is registered
    pub md5: Option<String>,
    /// Modification time in milliseconds, set only after registration
    pub mtime: Option<i64>,
}

/// Item as returned by the API
#[derive(Debug, Clone, Deserialize)]
pub struct CatalogItem {
    pub key: String,
    #[serde(default)]
    pub version: u64,
    pub data: ItemData,
}

/// Fields of an item's `data` object used by this crate
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemData {
    #[serde(default)]
    pub item_type: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub creators: Vec<Creator>,
    pub parent_item: Option<String>,
    pub link_mode: Option<String>,
    pub filename: Option<String>,
    pub md5: Option<String>,
    #[serde(rename = "DOI")]
    pub doi: Option<String>,
    /// Remaining fields, untouched
    #[serde(flatten)]
    pub extra: serde_json::Map<String, Value>,
}

impl CatalogItem {
    pub fn is_attachment(&self) -> bool {
        self.data.item_type == "attachment"
    }
}

/// Where and how to send the file bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadTarget {
    pub url: String,
    pub content_type: String,
    pub prefix: String,
    pub suffix: String,
    pub upload_key: String,
    /// Form fields for a multipart upload, when the server asked for one
    pub params: Option<BTreeMap<String, String>>,
}

/// Answer to an upload authorization request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadAuthorization {
    /// Server already stores a file with this digest
    Exists,
    /// Bytes must be sent to the target
    Granted(UploadTarget),
}

// === Response types ===

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WrittenKey {
    Key(String),
    Object { key: String },
}

impl WrittenKey {
    fn into_key(self) -> String {
        match self {
            WrittenKey::Key(key) | WrittenKey::Object { key } => key,
        }
    }
}

#[derive(Debug, Deserialize)]
struct WriteResponse {
    #[serde(default)]
    successful: HashMap<String, WrittenKey>,
    #[serde(default)]
    success: HashMap<String, WrittenKey>,
    #[serde(default)]
    failed: HashMap<String, FailedWrite>,
}

#[derive(Debug, Deserialize)]
struct FailedWrite {
    #[serde(default)]
    code: u16,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AuthorizationResponse {
    #[serde(default)]
    exists: Option<Value>,
    url: Option<String>,
    content_type: Option<String>,
    prefix: Option<String>,
    suffix: Option<String>,
    upload_key: Option<String>,
    params: Option<BTreeMap<String, String>>,
}

impl AuthorizationResponse {
    fn into_authorization(self) -> Result<UploadAuthorization> {
        let exists = match &self.exists {
            Some(Value::Bool(b)) => *b,
            Some(Value::Number(n)) => n.as_u64() == Some(1),
            _ => false,
        };
        if exists {
            return Ok(UploadAuthorization::Exists);
        }

        let upload_key = self
            .upload_key
            .ok_or_unexpected("authorization response has neither 'exists' nor 'uploadKey'")?;
        let url = self
            .url
            .ok_or_unexpected("authorization response has 'uploadKey' but no 'url'")?;

        Ok(UploadAuthorization::Granted(UploadTarget {
            url,
            content_type: self
                .content_type
                .unwrap_or_else(|| "application/octet-stream".to_string()),
            prefix: self.prefix.unwrap_or_default(),
            suffix: self.suffix.unwrap_or_default(),
            upload_key,
            params: self.params,
        }))
    }
}

/// Authenticated client for one library
pub struct CatalogClient {
    client: reqwest::Client,
    library_url: String,
    api_key: String,
}

impl CatalogClient {
    /// Create a client for the configured library
    pub fn new(config: &Config) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(concat!("zotero-add/", env!("CARGO_PKG_VERSION")))
            .timeout(config.request_timeout())
            .build()
            .map_err(|e| ZoteroError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            library_url: config.library_url(),
            api_key: config.api_key.clone(),
        })
    }

    /// Request to the library API with auth and version headers
    fn api(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.client
            .request(method, format!("{}{}", self.library_url, path))
            .header("Zotero-API-Key", &self.api_key)
            .header("Zotero-API-Version", API_VERSION)
    }

    /// Create a regular item from a metadata record
    ///
    /// Returns the key assigned by the server.
    pub async fn create_item(&self, record: &MetadataRecord) -> Result<String> {
        let payload = ItemPayload::from(record);
        info!(item_type = %payload.item_type, title = %payload.title, "Creating item");
        let key = self.write_single(&payload).await?;
        info!(item_key = %key, "Item created");
        Ok(key)
    }

    /// Create an `imported_file` attachment under a parent item
    pub async fn create_attachment_stub(
        &self,
        parent_key: &str,
        filename: &str,
        content_type: &str,
    ) -> Result<AttachmentStub> {
        let payload = AttachmentPayload {
            item_type: "attachment",
            link_mode: "imported_file",
            parent_item: parent_key,
            filename,
            content_type,
            md5: None,
            mtime: None,
        };
        info!(parent_item = parent_key, filename = filename, "Creating attachment stub");
        let key = self.write_single(&payload).await?;
        info!(attachment_key = %key, "Attachment stub created");

        Ok(AttachmentStub {
            key,
            parent_item: parent_key.to_string(),
            filename: filename.to_string(),
            content_type: content_type.to_string(),
            md5: None,
            mtime: None,
        })
    }

    /// POST a one-element item array and return the new key
    async fn write_single<T: Serialize>(&self, payload: &T) -> Result<String> {
        let response = self
            .api(reqwest::Method::POST, "/items")
            .json(&[payload])
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            warn!(status = status.as_u16(), body = %body, "Item write rejected");
            return Err(ZoteroError::ItemCreation {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: WriteResponse = serde_json::from_str(&body).map_err(|e| {
            ZoteroError::UnexpectedServerResponse(format!("unparsable write response ({}): {}", e, body))
        })?;

        let WriteResponse {
            mut successful,
            mut success,
            mut failed,
        } = parsed;

        if let Some(written) = successful.remove("0").or_else(|| success.remove("0")) {
            return Ok(written.into_key());
        }
        if let Some(failure) = failed.remove("0") {
            warn!(code = failure.code, message = %failure.message, "Item write failed");
            return Err(ZoteroError::ItemCreation {
                status: failure.code,
                body: failure.message,
            });
        }
        Err(ZoteroError::UnexpectedServerResponse(format!(
            "write response has no result for the item: {}",
            body
        )))
    }

    /// Ask permission to upload a file for an attachment
    pub async fn request_upload_authorization(
        &self,
        stub: &AttachmentStub,
        digest: &FileDigest,
        mtime: i64,
    ) -> Result<UploadAuthorization> {
        let form = [
            ("md5", digest.md5().to_string()),
            ("filename", stub.filename.clone()),
            ("filesize", digest.size().to_string()),
            ("mtime", mtime.to_string()),
        ];

        debug!(
            attachment_key = %stub.key,
            md5 = digest.md5(),
            filesize = digest.size(),
            "Requesting upload authorization"
        );

        let response = self
            .api(reqwest::Method::POST, &format!("/items/{}/file", stub.key))
            .header(IF_NONE_MATCH, "*")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            return Err(ZoteroError::UploadAuthorization {
                status: status.as_u16(),
                body,
            });
        }

        let parsed: AuthorizationResponse = serde_json::from_str(&body).map_err(|e| {
            ZoteroError::UnexpectedServerResponse(format!(
                "unparsable authorization response ({}): {}",
                e, body
            ))
        })?;
        parsed.into_authorization()
    }

    /// Send the file bytes to an authorized target
    ///
    /// The API key is not sent; the target is usually third-party storage.
    pub async fn transfer_file(
        &self,
        target: &UploadTarget,
        filename: &str,
        bytes: &[u8],
    ) -> Result<()> {
        let request = match &target.params {
            Some(params) => {
                let mut form = multipart::Form::new();
                for (name, value) in params {
                    form = form.text(name.clone(), value.clone());
                }
                let part = multipart::Part::bytes(bytes.to_vec())
                    .file_name(filename.to_string())
                    .mime_str(&target.content_type)?;
                self.client.post(&target.url).multipart(form.part("file", part))
            }
            None => {
                let mut body =
                    Vec::with_capacity(target.prefix.len() + bytes.len() + target.suffix.len());
                body.extend_from_slice(target.prefix.as_bytes());
                body.extend_from_slice(bytes);
                body.extend_from_slice(target.suffix.as_bytes());
                self.client
                    .post(&target.url)
                    .header(CONTENT_TYPE, &target.content_type)
                    .body(body)
            }
        };

        debug!(url = %target.url, bytes = bytes.len(), "Transferring file");
        let response = request.send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ZoteroError::UploadTransfer {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Tell the library the upload finished
    pub async fn register_upload(
        &self,
        stub: &AttachmentStub,
        upload_key: &str,
        digest: &FileDigest,
        mtime: i64,
    ) -> Result<()> {
        let form = [
            ("upload", upload_key.to_string()),
            ("md5", digest.md5().to_string()),
            ("filename", stub.filename.clone()),
            ("filesize", digest.size().to_string()),
            ("mtime", mtime.to_string()),
        ];

        debug!(attachment_key = %stub.key, upload_key = upload_key, "Registering upload");

        let response = self
            .api(reqwest::Method::POST, &format!("/items/{}/file", stub.key))
            .header(IF_NONE_MATCH, "*")
            .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
            .form(&form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ZoteroError::UploadRegistration {
                status: status.as_u16(),
                body,
            });
        }
        Ok(())
    }

    /// Fetch one item by key
    pub async fn get_item(&self, key: &str) -> Result<CatalogItem> {
        let response = self
            .api(reqwest::Method::GET, &format!("/items/{}", key))
            .send()
            .await?;
        read_json(response).await
    }

    /// Fetch the child items (attachments, notes) of an item
    pub async fn item_children(&self, key: &str) -> Result<Vec<CatalogItem>> {
        let response = self
            .api(reqwest::Method::GET, &format!("/items/{}/children", key))
            .send()
            .await?;
        read_json(response).await
    }
}

async fn read_json<T: serde::de::DeserializeOwned>(response: reqwest::Response) -> Result<T> {
    let status = response.status();
    let body = response.text().await?;
    if !status.is_success() {
        return Err(ZoteroError::UnexpectedServerResponse(format!(
            "HTTP {}: {}",
            status.as_u16(),
            body
        )));
    }
    Ok(serde_json::from_str(&body)?)
}
