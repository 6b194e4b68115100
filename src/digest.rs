//! MD5 digests of attachment files.
//!
//! The library uses the MD5 hex digest and byte length to deduplicate
//! uploads and to check integrity, so both are computed once and carried
//! around as an immutable [`FileDigest`].

use md5::{Digest, Md5};

/// MD5 hex digest and size of a file's contents
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDigest {
    md5: String,
    size: u64,
}

impl FileDigest {
    pub fn of_bytes(data: &[u8]) -> Self {
        Self {
            md5: calculate_md5(data),
            size: data.len() as u64,
        }
    }

    /// Lowercase hex MD5
    pub fn md5(&self) -> &str {
        &self.md5
    }

    /// Length in bytes
    pub fn size(&self) -> u64 {
        self.size
    }
}

pub fn calculate_md5(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}
