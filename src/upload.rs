//! Attachment upload handshake.
//!
//! Uploading a file to an attachment takes three calls that must happen in
//! this order:
//!
//! 1. request authorization with the file's MD5, size, name and mtime
//! 2. send the bytes to the authorized target (skipped when the server
//!    already has a file with that digest)
//! 3. register the upload with the same MD5 and size
//!
//! [`UploadCoordinator`] drives the handshake as a tagged [`UploadState`].
//! Only `FileTransferring` holds an [`UploadTarget`], and only
//! `RegistrationPending` holds an upload key, so a duplicate can never be
//! transferred or registered. Any error ends the run (the `Failed` state).

use crate::catalog::{AttachmentStub, CatalogClient, UploadAuthorization, UploadTarget};
use crate::digest::FileDigest;
use crate::error::{Result, ZoteroError};
use chrono::{DateTime, Utc};
use std::fs::File;
use std::io::Read;
use std::path::Path;
use std::time::SystemTime;
use tracing::{debug, error, info};

/// How the attachment ended up stored
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UploadStatus {
    /// Bytes were transferred and registered
    Uploaded,
    /// Server already had an identical file
    AlreadyExists,
}

/// Outcome of a successful upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    pub status: UploadStatus,
    /// Stub with `md5` and `mtime` filled from the registered values
    pub stub: AttachmentStub,
}

/// File data for one upload attempt
///
/// Created from the file once; the digest is never recomputed, so the
/// authorization and registration calls see identical values.
struct UploadSession {
    digest: FileDigest,
    mtime: i64,
    contents: Vec<u8>,
}

impl UploadSession {
    /// Read the whole file on the blocking pool and compute its digest
    async fn open(path: &Path) -> Result<Self> {
        let owned = path.to_path_buf();
        let session = tokio::task::spawn_blocking(move || Self::read(&owned))
            .await
            .map_err(|e| ZoteroError::FileRead {
                path: path.to_path_buf(),
                source: std::io::Error::other(format!("file read aborted: {}", e)),
            })??;

        debug!(
            path = ?path,
            md5 = session.digest.md5(),
            size = session.digest.size(),
            mtime = session.mtime,
            "Computed file digest"
        );
        Ok(session)
    }

    /// The file handle is closed before this returns.
    fn read(path: &Path) -> Result<Self> {
        let read_err = |source: std::io::Error| ZoteroError::FileRead {
            path: path.to_path_buf(),
            source,
        };

        let (contents, modified) = {
            let mut file = File::open(path).map_err(read_err)?;
            let metadata = file.metadata().map_err(read_err)?;
            let modified = metadata.modified().unwrap_or_else(|_| SystemTime::now());
            let mut contents = Vec::with_capacity(metadata.len() as usize);
            file.read_to_end(&mut contents).map_err(read_err)?;
            (contents, modified)
        };

        Ok(Self {
            digest: FileDigest::of_bytes(&contents),
            mtime: DateTime::<Utc>::from(modified).timestamp_millis(),
            contents,
        })
    }
}

/// Handshake progress
///
/// `Done` and `Failed` are terminal.
enum UploadState {
    Idle,
    AuthorizationRequested(UploadSession),
    FileTransferring(UploadSession, UploadTarget),
    SkippedDuplicate(UploadSession),
    RegistrationPending(UploadSession, String),
    Registered(UploadSession, UploadStatus),
    Done(UploadResult),
    /// The step that was running and the error that stopped it
    Failed(&'static str, ZoteroError),
}

impl UploadState {
    fn name(&self) -> &'static str {
        match self {
            UploadState::Idle => "idle",
            UploadState::AuthorizationRequested(_) => "authorization_requested",
            UploadState::FileTransferring(..) => "file_transferring",
            UploadState::SkippedDuplicate(_) => "skipped_duplicate",
            UploadState::RegistrationPending(..) => "registration_pending",
            UploadState::Registered(..) => "registered",
            UploadState::Done(_) => "done",
            UploadState::Failed(..) => "failed",
        }
    }
}

/// Runs the upload handshake for one attachment
pub struct UploadCoordinator<'a> {
    client: &'a CatalogClient,
}

impl<'a> UploadCoordinator<'a> {
    pub fn new(client: &'a CatalogClient) -> Self {
        Self { client }
    }

    /// Upload `path` as the file of `stub`
    ///
    /// # Errors
    ///
    /// `FileRead`, `UploadAuthorization`, `UnexpectedServerResponse`,
    /// `UploadTransfer` or `UploadRegistration`, depending on the failing step.
    pub async fn upload(&self, path: &Path, stub: &AttachmentStub) -> Result<UploadResult> {
        let mut state = UploadState::Idle;

        loop {
            let phase = state.name();
            debug!(attachment_key = %stub.key, state = phase, "Upload step");

            state = match state {
                UploadState::Done(result) => {
                    info!(
                        attachment_key = %stub.key,
                        status = ?result.status,
                        "Upload finished"
                    );
                    return Ok(result);
                }
                UploadState::Failed(failed_in, e) => {
                    error!(attachment_key = %stub.key, state = failed_in, error = %e, "Upload failed");
                    return Err(e);
                }
                other => self
                    .advance(other, path, stub)
                    .await
                    .unwrap_or_else(|e| UploadState::Failed(phase, e)),
            };
        }
    }

    async fn advance(
        &self,
        state: UploadState,
        path: &Path,
        stub: &AttachmentStub,
    ) -> Result<UploadState> {
        let next = match state {
            UploadState::Idle => {
                UploadState::AuthorizationRequested(UploadSession::open(path).await?)
            }

            UploadState::AuthorizationRequested(session) => {
                match self
                    .client
                    .request_upload_authorization(stub, &session.digest, session.mtime)
                    .await?
                {
                    UploadAuthorization::Exists => {
                        info!(attachment_key = %stub.key, md5 = session.digest.md5(), "File already stored, skipping transfer");
                        UploadState::SkippedDuplicate(session)
                    }
                    UploadAuthorization::Granted(target) => {
                        UploadState::FileTransferring(session, target)
                    }
                }
            }

            UploadState::FileTransferring(mut session, target) => {
                let contents = std::mem::take(&mut session.contents);
                self.client
                    .transfer_file(&target, &stub.filename, &contents)
                    .await?;
                info!(attachment_key = %stub.key, bytes = contents.len(), "File transferred");
                UploadState::RegistrationPending(session, target.upload_key)
            }

            UploadState::SkippedDuplicate(session) => {
                UploadState::Registered(session, UploadStatus::AlreadyExists)
            }

            UploadState::RegistrationPending(session, upload_key) => {
                self.client
                    .register_upload(stub, &upload_key, &session.digest, session.mtime)
                    .await?;
                UploadState::Registered(session, UploadStatus::Uploaded)
            }

            UploadState::Registered(session, status) => UploadState::Done(UploadResult {
                status,
                stub: AttachmentStub {
                    md5: Some(session.digest.md5().to_string()),
                    mtime: Some(session.mtime),
                    ..stub.clone()
                },
            }),

            terminal @ (UploadState::Done(_) | UploadState::Failed(..)) => terminal,
        };
        Ok(next)
    }
}
