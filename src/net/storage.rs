use crate::content::{check_email, ContentId, ContentStore, UploadError, UploadFile};
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::sync::Mutex;
use std::time::Duration;
use tracing::{debug, info};

const UPLOAD_TIMEOUT_SECS: u64 = 60;
const ACCOUNT_HEADER: &str = "x-account-email";
const SPACE_HEADER: &str = "x-space";

#[derive(Debug, Deserialize)]
struct AddEntry {
    #[serde(rename = "Name", default)]
    name: String,
    #[serde(rename = "Hash")]
    hash: String,
}

#[derive(Debug, Default, Clone)]
struct Session {
    email: Option<String>,
    space: Option<String>,
}

/// Uploads through an IPFS-compatible `/api/v0/add` endpoint.
#[derive(Debug)]
pub struct HttpContentStore {
    http: reqwest::Client,
    endpoint: String,
    session: Mutex<Session>,
}

impl HttpContentStore {
    /// Store posting to `endpoint` (scheme, host and port).
    pub fn new(endpoint: impl Into<String>, user_agent: &str) -> Result<Self, UploadError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(UPLOAD_TIMEOUT_SECS))
            .user_agent(user_agent)
            .build()
            .map_err(|err| UploadError::Remote(err.to_string()))?;
        Ok(Self {
            http,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            session: Mutex::new(Session::default()),
        })
    }

    fn add_url(&self) -> String {
        format!("{}/api/v0/add?wrap-with-directory=true&pin=true", self.endpoint)
    }

    fn session(&self) -> Result<Session, UploadError> {
        self.session
            .lock()
            .map(|session| session.clone())
            .map_err(|_| UploadError::Remote("session lock poisoned".into()))
    }

    fn update(&self, apply: impl FnOnce(&mut Session)) -> Result<(), UploadError> {
        let mut session = self
            .session
            .lock()
            .map_err(|_| UploadError::Remote("session lock poisoned".into()))?;
        apply(&mut session);
        Ok(())
    }
}

#[async_trait]
impl ContentStore for HttpContentStore {
    /// Records the account locally; it is sent as request headers on upload.
    async fn login(&self, email: &str) -> Result<(), UploadError> {
        check_email(email)?;
        debug!(email, "storage login");
        self.update(|session| {
            session.email = Some(email.to_string());
            session.space = None;
        })
    }

    async fn select_space(&self, space: &str) -> Result<(), UploadError> {
        if self.session()?.email.is_none() {
            return Err(UploadError::NotLoggedIn);
        }
        self.update(|session| session.space = Some(space.to_string()))
    }

    async fn upload_directory(&self, files: Vec<UploadFile>) -> Result<ContentId, UploadError> {
        let session = self.session()?;
        let email = session.email.ok_or(UploadError::NotLoggedIn)?;
        let space = session.space.ok_or(UploadError::NoSpace)?;
        if files.is_empty() {
            return Err(UploadError::Empty);
        }
        let mut form = Form::new();
        for file in files {
            let part = Part::bytes(file.bytes)
                .file_name(file.name)
                .mime_str(&file.mime)
                .map_err(|err| UploadError::Encode(err.to_string()))?;
            form = form.part("file", part);
        }
        let response = self
            .http
            .post(self.add_url())
            .header(ACCOUNT_HEADER, email)
            .header(SPACE_HEADER, space)
            .multipart(form)
            .send()
            .await
            .map_err(|err| UploadError::Remote(err.to_string()))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|err| UploadError::Remote(err.to_string()))?;
        if !status.is_success() {
            return Err(UploadError::Remote(format!("{status}: {}", body.trim())));
        }
        let cid = directory_cid(&body)?;
        info!(cid = %cid, "directory uploaded");
        Ok(cid)
    }
}

/// The add endpoint streams one JSON object per entry; the wrapping directory comes last.
fn directory_cid(body: &str) -> Result<ContentId, UploadError> {
    let mut last = None;
    for line in body.lines().filter(|line| !line.trim().is_empty()) {
        let entry: AddEntry = serde_json::from_str(line)
            .map_err(|err| UploadError::Remote(format!("unreadable add response: {err}")))?;
        debug!(name = %entry.name, hash = %entry.hash, "add entry");
        last = Some(entry);
    }
    last.map(|entry| ContentId(entry.hash))
        .ok_or_else(|| UploadError::Remote("empty add response".into()))
}
