//! Custom error types for zotero-add.
//!
//! This module defines all error types used throughout the application.
//! All functions return `Result<T, ZoteroError>` instead of using `unwrap()`.

use std::path::PathBuf;
use thiserror::Error;

/// Failure to turn an input into a metadata record.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// Local file could not be opened or parsed
    #[error("Unreadable input {path:?}: {reason}")]
    UnreadableInput {
        /// Path that was given on the command line
        path: PathBuf,
        /// What went wrong
        reason: String,
    },

    /// Web page could not be fetched
    #[error("Unreachable URL {url}: {reason}")]
    UnreachableUrl {
        /// URL that was given on the command line
        url: String,
        /// Transport error or HTTP status
        reason: String,
    },
}

/// Main error type for zotero-add operations.
///
/// Uses `thiserror` for ergonomic error handling and automatic `Display` implementation.
#[derive(Debug, Error)]
pub enum ZoteroError {
    /// Missing or invalid credentials/settings
    #[error("Config error: {0}")]
    Config(String),

    /// Metadata extraction or page fetch failed; nothing was created remotely
    #[error("Metadata resolution failed: {0}")]
    ResolutionFailed(#[from] ResolveError),

    /// Library rejected an item payload
    #[error("Item creation failed: HTTP {status} - {body}")]
    ItemCreation { status: u16, body: String },

    /// Attachment file could not be read while computing its digest
    #[error("Failed to read {path:?}: {source}")]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Library refused to authorize the upload
    #[error("Upload authorization failed: HTTP {status} - {body}")]
    UploadAuthorization { status: u16, body: String },

    /// File bytes were not accepted by the authorized upload target
    #[error("Upload transfer failed: HTTP {status} - {body}")]
    UploadTransfer { status: u16, body: String },

    /// Library did not accept the upload registration
    #[error("Upload registration failed: HTTP {status} - {body}")]
    UploadRegistration { status: u16, body: String },

    /// Response did not match the protocol
    #[error("Unexpected server response: {0}")]
    UnexpectedServerResponse(String),

    /// Parent item exists but its attachment could not be uploaded
    #[error("Item {item_key} was created but its attachment upload failed: {source}")]
    UploadFailed {
        item_key: String,
        #[source]
        source: Box<ZoteroError>,
    },

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ZoteroError {
    /// Key of the parent item left in the library by a failed upload, if any
    pub fn orphaned_item_key(&self) -> Option<&str> {
        match self {
            ZoteroError::UploadFailed { item_key, .. } => Some(item_key),
            _ => None,
        }
    }
}

/// Result type alias using `ZoteroError`
pub type Result<T> = std::result::Result<T, ZoteroError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with an unexpected-response message
    fn ok_or_unexpected(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_unexpected(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| ZoteroError::UnexpectedServerResponse(msg.to_string()))
    }
}
