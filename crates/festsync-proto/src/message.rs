//! Chat message payload types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{ConversationId, MessageId, UserId};

/// Kind of file attached to a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    /// Rendered inline as a picture.
    Image,
    /// Anything else (PDF, spreadsheet, ...), rendered as a download link.
    Document,
}

impl AttachmentKind {
    /// Classify a MIME type. `image/*` is an image, everything else a
    /// document.
    pub fn from_mime(mime: &str) -> Self {
        let major = mime.split('/').next().unwrap_or_default();
        if major.trim().eq_ignore_ascii_case("image") { Self::Image } else { Self::Document }
    }
}

/// Uploaded file metadata carried by a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    /// Image or document.
    pub kind: AttachmentKind,
    /// Original file name as selected by the user.
    pub file_name: String,
    /// Public URL returned by the upload service.
    pub file_url: String,
    /// Size in bytes.
    pub file_size: u64,
}

/// Message type tag sent alongside outgoing content.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageType {
    /// Plain text.
    Text,
    /// Text plus an image attachment.
    Image,
    /// Text plus a document attachment.
    File,
}

impl From<AttachmentKind> for MessageType {
    fn from(kind: AttachmentKind) -> Self {
        match kind {
            AttachmentKind::Image => Self::Image,
            AttachmentKind::Document => Self::File,
        }
    }
}

/// A message in a conversation log.
///
/// `id` is the only identity: the history path and the push path construct
/// independent values for the same logical message, so equality of content
/// is never used for deduplication.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Server-assigned id, unique within the conversation.
    pub id: MessageId,
    /// Conversation this message belongs to.
    pub conversation_id: ConversationId,
    /// Author.
    pub sender_id: UserId,
    /// Author display name. May be empty when the backend omits it.
    #[serde(default)]
    pub sender_name: String,
    /// Text body.
    #[serde(default)]
    pub content: String,
    /// Ordered attachments.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub attachments: Vec<Attachment>,
    /// Server-authoritative creation time. Logs are ordered by this field.
    pub created_at: DateTime<Utc>,
}

impl Message {
    /// Ordering key used by conversation logs.
    ///
    /// `created_at` first; `id` breaks ties so that two messages stamped in
    /// the same millisecond still have a single deterministic order.
    pub fn sort_key(&self) -> (DateTime<Utc>, MessageId) {
        (self.created_at, self.id)
    }
}
