//! Remote object store client for image uploads.
//!
//! Wire contract: multipart POST to `<base>/image/upload` with a binary
//! `file` field, an optional `upload_preset` and an optional `public_id`.
//! The JSON reply must carry `public_id` and `secure_url`.

use crate::hash::ContentHash;
use reqwest::blocking::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

pub const UPLOAD_ROUTE: &str = "/image/upload";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadRequest {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub public_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct UploadedObject {
    pub public_id: String,
    pub secure_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UploadError {
    #[error("upload request failed: {0}")]
    Network(String),
    #[error("upload endpoint returned HTTP {code}: {body}")]
    Status { code: u16, body: String },
    #[error("upload response was not understood: {0}")]
    InvalidResponse(String),
    #[error("image bytes could not be read: {0}")]
    Read(String),
    #[error("no upload endpoint configured")]
    NotConfigured,
}

impl UploadError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Network(_) => "upload-network",
            Self::Status { .. } => "upload-status",
            Self::InvalidResponse(_) => "upload-invalid-response",
            Self::Read(_) => "upload-read",
            Self::NotConfigured => "upload-not-configured",
        }
    }

    /// Transport failures, timeouts, throttling and server errors can succeed
    /// on a second attempt; everything else needs user action first.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { code, .. } => *code == 408 || *code == 429 || (500..600).contains(code),
            Self::InvalidResponse(_) | Self::Read(_) | Self::NotConfigured => false,
        }
    }
}

pub trait ObjectStore: Send + Sync {
    fn upload(&self, request: &UploadRequest) -> Result<UploadedObject, UploadError>;
}

/// Stand-in used when no endpoint is configured; every upload fails
/// non-retryably so batches still settle.
pub struct UnconfiguredStore;

impl ObjectStore for UnconfiguredStore {
    fn upload(&self, _request: &UploadRequest) -> Result<UploadedObject, UploadError> {
        Err(UploadError::NotConfigured)
    }
}

/// `<stem>~<hash>`, or `None` while the content hash is still unknown.
pub fn format_public_id(stem: &str, hash: Option<&ContentHash>) -> Option<String> {
    hash.map(|hash| format!("{stem}~{hash}"))
}

pub struct HttpObjectStore {
    client: reqwest::blocking::Client,
    endpoint: String,
    upload_preset: Option<String>,
}

impl HttpObjectStore {
    pub fn new(
        base_url: &str,
        upload_preset: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UploadError> {
        let base = base_url.trim().trim_end_matches('/');
        if base.is_empty() {
            return Err(UploadError::NotConfigured);
        }
        let client = reqwest::blocking::Client::builder()
            .user_agent(concat!("lyrix/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(|err| UploadError::Network(err.to_string()))?;

        Ok(Self {
            client,
            endpoint: format!("{base}{UPLOAD_ROUTE}"),
            upload_preset: upload_preset.filter(|preset| !preset.trim().is_empty()),
        })
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl ObjectStore for HttpObjectStore {
    fn upload(&self, request: &UploadRequest) -> Result<UploadedObject, UploadError> {
        let part = Part::bytes(request.bytes.clone()).file_name(request.file_name.clone());
        let mut form = Form::new().part("file", part);
        if let Some(preset) = &self.upload_preset {
            form = form.text("upload_preset", preset.clone());
        }
        if let Some(public_id) = &request.public_id {
            form = form.text("public_id", public_id.clone());
        }

        debug!(
            file = %request.file_name,
            bytes = request.bytes.len(),
            public_id = ?request.public_id,
            "posting image upload"
        );
        let response = self
            .client
            .post(&self.endpoint)
            .multipart(form)
            .send()
            .map_err(|err| UploadError::Network(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().unwrap_or_default();
            return Err(UploadError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let uploaded: UploadedObject = response
            .json()
            .map_err(|err| UploadError::InvalidResponse(err.to_string()))?;
        info!(file = %request.file_name, url = %uploaded.secure_url, "image uploaded");
        Ok(uploaded)
    }
}
