//! Content-addressed remote storage for saved sheets.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;

const CID_VERSION: u8 = 0x01;
const CODEC_RAW: u8 = 0x55;
const MULTIHASH_SHA2_256: u8 = 0x12;
const SHA2_256_LEN: u8 = 0x20;

/// Opaque content identifier returned by a store.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(pub String);

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One file inside an uploaded directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFile {
    /// File name inside the directory.
    pub name: String,
    /// MIME type sent with the upload.
    pub mime: String,
    /// Raw bytes.
    pub bytes: Vec<u8>,
}

/// Account and space the user configured for uploads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageAccount {
    /// Login email of the storage account.
    pub email: String,
    /// Space (bucket) uploads are attached to.
    pub space: String,
}

/// JSON document pinned for a saved sheet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SheetPayload {
    /// Sheet name.
    pub name: String,
    /// Encoded sheet content.
    pub content: String,
    /// Creation stamp.
    pub created: DateTime<Utc>,
    /// Modification stamp.
    pub modified: DateTime<Utc>,
}

impl SheetPayload {
    /// Serializes the payload as `<name>.json`.
    pub fn to_upload_file(&self) -> Result<UploadFile, UploadError> {
        let bytes =
            serde_json::to_vec(self).map_err(|err| UploadError::Encode(err.to_string()))?;
        Ok(UploadFile {
            name: format!("{}.json", self.name),
            mime: "application/json".to_string(),
            bytes,
        })
    }
}

/// Upload failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UploadError {
    /// No account email or space has been configured.
    #[error("IPFS account not set up. Please set up your IPFS account in the Files section first.")]
    NotConfigured,
    /// An upload or space selection was attempted before login.
    #[error("not logged in to the storage service")]
    NotLoggedIn,
    /// An upload was attempted before choosing a space.
    #[error("no storage space selected")]
    NoSpace,
    /// The login email is unusable.
    #[error("invalid account email `{0}`")]
    InvalidEmail(String),
    /// Nothing to upload.
    #[error("upload contains no files")]
    Empty,
    /// Payload serialization failed.
    #[error("failed to encode upload: {0}")]
    Encode(String),
    /// The remote service rejected or failed the request.
    #[error("storage service error: {0}")]
    Remote(String),
}

/// Remote content-addressed store with an account/space session.
#[async_trait]
pub trait ContentStore: Send + Sync {
    /// Authenticates the account identified by `email`.
    async fn login(&self, email: &str) -> Result<(), UploadError>;

    /// Chooses the space subsequent uploads belong to.
    async fn select_space(&self, space: &str) -> Result<(), UploadError>;

    /// Uploads `files` as one directory and returns the directory identifier.
    async fn upload_directory(&self, files: Vec<UploadFile>) -> Result<ContentId, UploadError>;
}

/// Logs in, selects the configured space, and uploads `payload` as a one-file directory.
pub async fn upload_sheet<S: ContentStore + ?Sized>(
    store: &S,
    account: Option<&StorageAccount>,
    payload: &SheetPayload,
) -> Result<ContentId, UploadError> {
    let account = account
        .filter(|acct| !acct.email.trim().is_empty() && !acct.space.trim().is_empty())
        .ok_or(UploadError::NotConfigured)?;
    store.login(account.email.trim()).await?;
    store.select_space(account.space.trim()).await?;
    let file = payload.to_upload_file()?;
    store.upload_directory(vec![file]).await
}

/// CIDv1 (raw codec, sha2-256) of `bytes`, base32 multibase encoded.
pub fn cid_v1_raw(bytes: &[u8]) -> ContentId {
    let digest = Sha256::digest(bytes);
    let mut cid = Vec::with_capacity(4 + digest.len());
    cid.push(CID_VERSION);
    cid.push(CODEC_RAW);
    cid.push(MULTIHASH_SHA2_256);
    cid.push(SHA2_256_LEN);
    cid.extend_from_slice(&digest);
    let body = base32::encode(base32::Alphabet::Rfc4648 { padding: false }, &cid);
    ContentId(format!("b{}", body.to_lowercase()))
}

pub(crate) fn check_email(email: &str) -> Result<(), UploadError> {
    match email.split_once('@') {
        Some((user, domain)) if !user.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(UploadError::InvalidEmail(email.to_string())),
    }
}

#[derive(Debug, Default)]
struct Session {
    email: Option<String>,
    space: Option<String>,
}

/// Store that keeps uploads in memory and derives identifiers locally.
#[derive(Debug, Default)]
pub struct MemoryContentStore {
    session: Mutex<Session>,
    objects: Mutex<HashMap<ContentId, Vec<UploadFile>>>,
}

impl MemoryContentStore {
    /// Empty store with no session.
    pub fn new() -> Self {
        Self::default()
    }

    /// Files uploaded under `cid`.
    pub fn fetch(&self, cid: &ContentId) -> Option<Vec<UploadFile>> {
        self.objects.lock().ok()?.get(cid).cloned()
    }

    /// Number of stored directories.
    pub fn len(&self) -> usize {
        self.objects.lock().map(|objects| objects.len()).unwrap_or(0)
    }

    /// `true` when nothing has been uploaded.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl ContentStore for MemoryContentStore {
    async fn login(&self, email: &str) -> Result<(), UploadError> {
        check_email(email)?;
        let mut session = self
            .session
            .lock()
            .map_err(|_| UploadError::Remote("session lock poisoned".into()))?;
        session.email = Some(email.to_string());
        session.space = None;
        Ok(())
    }

    async fn select_space(&self, space: &str) -> Result<(), UploadError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| UploadError::Remote("session lock poisoned".into()))?;
        if session.email.is_none() {
            return Err(UploadError::NotLoggedIn);
        }
        session.space = Some(space.to_string());
        Ok(())
    }

    async fn upload_directory(&self, files: Vec<UploadFile>) -> Result<ContentId, UploadError> {
        {
            let session = self
                .session
                .lock()
                .map_err(|_| UploadError::Remote("session lock poisoned".into()))?;
            if session.email.is_none() {
                return Err(UploadError::NotLoggedIn);
            }
            if session.space.is_none() {
                return Err(UploadError::NoSpace);
            }
        }
        if files.is_empty() {
            return Err(UploadError::Empty);
        }
        let mut listing = Vec::new();
        for file in &files {
            listing.extend_from_slice(file.name.as_bytes());
            listing.push(0);
            listing.extend_from_slice(&Sha256::digest(&file.bytes));
        }
        let cid = cid_v1_raw(&listing);
        self.objects
            .lock()
            .map_err(|_| UploadError::Remote("object lock poisoned".into()))?
            .insert(cid.clone(), files);
        Ok(cid)
    }
}
