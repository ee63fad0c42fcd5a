//! Persistent channel events.
//!
//! Every event travels as one JSON text frame shaped
//! `{ "event": "<snake_case name>", "data": { ... } }`. Unit events such as
//! `connect` carry no `data` member.

use serde::{Deserialize, Serialize};

use crate::{
    ConversationId, UserId,
    errors::{ProtocolError, Result},
    message::{Attachment, Message, MessageType},
    notification::Notification,
};

/// Events the client emits on the channel.
///
/// All outbound events are fire-and-forget: the backend answers (if at all)
/// with an unsolicited [`Inbound`] event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Outbound {
    /// Subscribe to live pushes for these conversations.
    JoinConversations {
        /// Conversations to subscribe to.
        conversation_ids: Vec<ConversationId>,
    },

    /// Post a text message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Always [`MessageType::Text`] for this event.
        #[serde(rename = "type")]
        message_type: MessageType,
        /// Body.
        content: String,
    },

    /// Post a message carrying an uploaded file.
    SendMessageWithAttachment {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Derived from the attachment kind.
        #[serde(rename = "type")]
        message_type: MessageType,
        /// Body (usually an auto-generated summary).
        content: String,
        /// Uploaded file metadata.
        attachment: Attachment,
    },

    /// Ask for a page of history. Answered by [`Inbound::MessageHistory`].
    RequestHistory {
        /// Conversation to page through.
        conversation_id: ConversationId,
        /// 1-based page number.
        page: u32,
        /// Page size.
        limit: u32,
    },

    /// Local user started typing.
    TypingStart {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },

    /// Local user stopped typing.
    TypingStop {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },
}

impl Outbound {
    /// Event name as it appears on the wire.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::JoinConversations { .. } => "join_conversations",
            Self::SendMessage { .. } => "send_message",
            Self::SendMessageWithAttachment { .. } => "send_message_with_attachment",
            Self::RequestHistory { .. } => "request_history",
            Self::TypingStart { .. } => "typing_start",
            Self::TypingStop { .. } => "typing_stop",
        }
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a JSON text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` on malformed JSON or unknown event names
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}

/// Events the backend pushes to the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum Inbound {
    /// Transport handshake acknowledged. The channel is live.
    Connect,

    /// Transport closed by the backend.
    Disconnect {
        /// Close reason, if the backend supplied one.
        #[serde(default)]
        reason: String,
    },

    /// Out-of-band failure reported by the backend.
    Error {
        /// Failure description.
        reason: String,
    },

    /// Live push of a single message (including the echo of our own sends).
    NewMessage(Message),

    /// Answer to [`Outbound::RequestHistory`].
    MessageHistory {
        /// Conversation the page belongs to.
        conversation_id: ConversationId,
        /// Page contents in arbitrary order.
        messages: Vec<Message>,
    },

    /// A remote user is typing.
    UserTyping {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// Typing user.
        user_id: UserId,
    },

    /// A remote user stopped typing.
    UserStoppedTyping {
        /// Conversation being typed in.
        conversation_id: ConversationId,
        /// User who stopped.
        user_id: UserId,
    },

    /// Notification pushed on the recipient's personal topic.
    Notification {
        /// Topic key: the recipient's user id.
        recipient_id: UserId,
        /// The notification itself.
        notification: Notification,
    },
}

impl Inbound {
    /// Event name as it appears on the wire.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Connect => "connect",
            Self::Disconnect { .. } => "disconnect",
            Self::Error { .. } => "error",
            Self::NewMessage(_) => "new_message",
            Self::MessageHistory { .. } => "message_history",
            Self::UserTyping { .. } => "user_typing",
            Self::UserStoppedTyping { .. } => "user_stopped_typing",
            Self::Notification { .. } => "notification",
        }
    }

    /// Encode as a JSON text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Encode` if serialization fails
    pub fn encode(&self) -> Result<String> {
        serde_json::to_string(self).map_err(|e| ProtocolError::Encode(e.to_string()))
    }

    /// Decode a JSON text frame.
    ///
    /// # Errors
    ///
    /// - `ProtocolError::Decode` on malformed JSON or unknown event names
    pub fn decode(text: &str) -> Result<Self> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Decode(e.to_string()))
    }
}
