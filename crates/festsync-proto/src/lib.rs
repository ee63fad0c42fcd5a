//! Festsync wire protocol.
//!
//! Types exchanged with the two external collaborators of the sync engine:
//!
//! - The persistent channel: [`Outbound`] events the client emits and
//!   [`Inbound`] events the backend pushes. Both travel as JSON text with an
//!   `{ "event": ..., "data": ... }` envelope.
//! - The notification REST service: [`NotificationQuery`], [`NotificationPage`]
//!   and [`UserRef`] bodies.
//!
//! This crate only describes data. Merge semantics, timers and connection
//! policy live in `festsync-core` and `festsync-client`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod channel;
pub mod errors;
pub mod message;
pub mod notification;

pub use channel::{Inbound, Outbound};
pub use errors::{ProtocolError, Result};
pub use message::{Attachment, AttachmentKind, Message, MessageType};
pub use notification::{
    Notification, NotificationFilter, NotificationPage, NotificationQuery, UserRef,
};

/// Stable identifier of a conversation (chat group).
pub type ConversationId = u64;

/// Stable identifier of a user account.
pub type UserId = u64;

/// Server-assigned message identifier, unique per conversation.
pub type MessageId = u64;

/// Server-assigned notification identifier.
pub type NotificationId = u64;
