//! In-memory upload service.

use async_trait::async_trait;
use festsync_client::{FileUploader, LocalFile, UploadResult};

/// Uploader that stores nothing and hands back a CDN-style URL.
#[derive(Debug, Clone)]
pub struct SimUploader {
    base_url: String,
    available: bool,
}

impl SimUploader {
    /// Uploader that always succeeds.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), available: true }
    }

    /// Uploader that rejects every file.
    pub fn unavailable() -> Self {
        Self { base_url: String::new(), available: false }
    }
}

#[async_trait]
impl FileUploader for SimUploader {
    async fn upload(&self, file: &LocalFile) -> Result<UploadResult, String> {
        if !self.available {
            return Err("upload service unavailable".to_string());
        }
        Ok(UploadResult {
            url: format!("{}/{}", self.base_url, file.file_name),
            file_type: file.mime_type.clone(),
            file_name: file.file_name.clone(),
            file_size: file.size(),
        })
    }
}
