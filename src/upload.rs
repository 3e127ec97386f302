//! Upload finished captures to the file-sharing service
//!
//! The service takes a single multipart POST with a `file` field and answers
//! with `{"status": "success", "url": ...}` or
//! `{"status": "error", "message": ...}`.

use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

const MIB: f64 = 1024.0 * 1024.0;

/// Why an upload did not produce a URL
#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("File not found: {0}")]
    NotFound(PathBuf),

    #[error("File too large: {size_mb:.1} MB exceeds {limit_mb:.0} MB limit")]
    TooLarge { size_mb: f64, limit_mb: f64 },

    #[error("File is empty")]
    Empty,

    #[error("Upload timed out")]
    Timeout,

    #[error("Connection failed, is the network available?")]
    Connection,

    #[error("Upload failed: {0}")]
    Http(String),

    #[error("{0}")]
    Rejected(String),

    #[error("Invalid response from server: {0}")]
    InvalidResponse(String),
}

/// Accepts a finished file and returns its hosted URL
#[async_trait]
pub trait Uploader: Send + Sync {
    async fn upload(&self, path: &Path) -> Result<String, UploadError>;
}

#[derive(Debug, Deserialize)]
struct UploadResponse {
    status: String,
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

/// Uploader for the HTTP sharing endpoint
#[derive(Debug, Clone)]
pub struct HttpUploader {
    client: reqwest::Client,
    url: String,
    max_size: u64,
}

impl HttpUploader {
    pub const TIMEOUT: Duration = Duration::from_secs(120);

    pub fn new(url: impl Into<String>, max_size: u64) -> Result<Self, UploadError> {
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(Self::TIMEOUT)
            .build()
            .map_err(|e| UploadError::Http(e.to_string()))?;

        Ok(Self {
            client,
            url: url.into(),
            max_size,
        })
    }

    /// Open `path` for streaming after checking its size against the limit
    async fn open_checked(&self, path: &Path) -> Result<(tokio::fs::File, u64), UploadError> {
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|_| UploadError::NotFound(path.to_path_buf()))?;
        let size = file
            .metadata()
            .await
            .map_err(|e| UploadError::Http(format!("could not read {}: {}", path.display(), e)))?
            .len();

        if size > self.max_size {
            return Err(UploadError::TooLarge {
                size_mb: size as f64 / MIB,
                limit_mb: self.max_size as f64 / MIB,
            });
        }
        if size == 0 {
            return Err(UploadError::Empty);
        }
        Ok((file, size))
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, path: &Path) -> Result<String, UploadError> {
        let (file, size) = self.open_checked(path).await?;
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_else(|| "upload".to_string());

        log::info!("Uploading {} ({} bytes) to {}", file_name, size, self.url);
        let part = reqwest::multipart::Part::stream_with_length(reqwest::Body::from(file), size)
            .file_name(file_name);
        let form = reqwest::multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(&self.url)
            .multipart(form)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?;

        let body: UploadResponse = response
            .json()
            .await
            .map_err(|e| UploadError::InvalidResponse(e.to_string()))?;

        match body {
            UploadResponse {
                status, url: Some(url), ..
            } if status == "success" => {
                log::info!("Upload complete: {}", url);
                Ok(url)
            }
            UploadResponse { status, .. } if status == "success" => Err(
                UploadError::InvalidResponse("success response without url".to_string()),
            ),
            UploadResponse { message, .. } => Err(UploadError::Rejected(
                message.unwrap_or_else(|| "Unknown error".to_string()),
            )),
        }
    }
}

fn classify(err: reqwest::Error) -> UploadError {
    if err.is_timeout() {
        UploadError::Timeout
    } else if err.is_connect() {
        UploadError::Connection
    } else {
        UploadError::Http(err.to_string())
    }
}

/// Whether a file exists and fits under the upload ceiling
pub fn check_file_size(path: &Path, limit: u64) -> bool {
    std::fs::metadata(path).is_ok_and(|meta| meta.len() <= limit)
}
