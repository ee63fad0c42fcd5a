//! Binding uploaded files to outgoing messages.
//!
//! Uploading happens elsewhere (see [`FileUploader`]). The binder only turns
//! an upload result into an [`Attachment`] plus a readable summary line, and
//! rejects results that should never reach the channel.

use async_trait::async_trait;
use festsync_proto::{Attachment, AttachmentKind, ConversationId};

use crate::error::ClientError;

/// A file the user picked, before upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalFile {
    /// Name as shown in the file picker.
    pub file_name: String,
    /// MIME type reported by the picker.
    pub mime_type: String,
    /// Contents.
    pub bytes: Vec<u8>,
}

impl LocalFile {
    /// Size in bytes.
    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// What the upload service returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadResult {
    /// Public URL of the stored file.
    pub url: String,
    /// MIME type as stored.
    pub file_type: String,
    /// Stored file name.
    pub file_name: String,
    /// Stored size in bytes.
    pub file_size: u64,
}

/// External upload collaborator.
#[async_trait]
pub trait FileUploader: Send + Sync {
    /// Upload one file.
    ///
    /// # Errors
    ///
    /// Any failure, described as text. It surfaces as
    /// [`ClientError::Upload`].
    async fn upload(&self, file: &LocalFile) -> Result<UploadResult, String>;
}

/// A ready-to-send attachment message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoundAttachment {
    /// Where it goes.
    pub conversation_id: ConversationId,
    /// Summary line used as the message body.
    pub content: String,
    /// The file.
    pub attachment: Attachment,
}

/// Builds attachment messages from upload results.
#[derive(Debug, Clone)]
pub struct AttachmentBinder {
    max_bytes: u64,
}

impl AttachmentBinder {
    /// Create a binder that rejects files above `max_bytes`.
    pub fn new(max_bytes: u64) -> Self {
        Self { max_bytes }
    }

    /// Turn an upload result into a message for `conversation_id`.
    ///
    /// # Errors
    ///
    /// - `ClientError::MissingFileName` if the result has a blank name
    /// - `ClientError::AttachmentTooLarge` if it exceeds the size limit
    pub fn bind(
        &self,
        conversation_id: ConversationId,
        upload: UploadResult,
    ) -> Result<BoundAttachment, ClientError> {
        let file_name = upload.file_name.trim().to_string();
        if file_name.is_empty() {
            return Err(ClientError::MissingFileName);
        }
        self.check_size(&file_name, upload.file_size)?;

        let attachment = Attachment {
            kind: AttachmentKind::from_mime(&upload.file_type),
            file_name,
            file_url: upload.url,
            file_size: upload.file_size,
        };

        Ok(BoundAttachment { conversation_id, content: summarize(&attachment), attachment })
    }

    /// Upload `file` and bind the result.
    ///
    /// The size limit is checked before uploading so oversize files never
    /// leave the device.
    ///
    /// # Errors
    ///
    /// - `ClientError::AttachmentTooLarge` before upload
    /// - `ClientError::Upload` if the uploader fails
    /// - anything `bind` rejects
    pub async fn upload_and_bind<U>(
        &self,
        uploader: &U,
        conversation_id: ConversationId,
        file: &LocalFile,
    ) -> Result<BoundAttachment, ClientError>
    where
        U: FileUploader + ?Sized,
    {
        self.check_size(&file.file_name, file.size())?;

        let upload = uploader.upload(file).await.map_err(ClientError::Upload)?;
        tracing::debug!(conversation_id, file_name = %upload.file_name, "upload finished");

        self.bind(conversation_id, upload)
    }

    fn check_size(&self, file_name: &str, size: u64) -> Result<(), ClientError> {
        if size > self.max_bytes {
            return Err(ClientError::AttachmentTooLarge {
                file_name: file_name.to_string(),
                size,
                limit: self.max_bytes,
            });
        }
        Ok(())
    }
}

/// Human-readable body for an attachment message.
pub fn summarize(attachment: &Attachment) -> String {
    match attachment.kind {
        AttachmentKind::Image => format!("shared an image: {}", attachment.file_name),
        AttachmentKind::Document => format!("shared a document: {}", attachment.file_name),
    }
}
