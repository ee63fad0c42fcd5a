//! Sync client
//!
//! Action-based synchronization engine for the festival dashboard. Keeps a
//! client's view of conversations, typing presence and notifications
//! consistent with the backend over one persistent channel plus a REST
//! notification service.
//!
//! # Architecture
//!
//! The client follows the same Sans-IO and action-based patterns as
//! [`festsync_core`]. It receives events ([`ClientEvent`]), processes them
//! through pure state machine logic, and returns actions ([`ClientAction`]) for
//! the caller to execute. [`Runtime`] is a ready-made caller that executes
//! actions through a [`Driver`] and a [`NotificationService`].
//!
//! # Components
//!
//! - [`SyncClient`]: Top-level state machine for one signed-in session
//! - [`MessageStore`]: Per-conversation logs merged from history and pushes
//! - [`PresenceTracker`]: Local and remote typing state
//! - [`NotificationFeed`]: Paginated, filterable notifications
//! - [`ScrollAnchor`]: Follow-the-newest-message decisions
//! - [`AttachmentBinder`]: Upload results to attachment messages
//!
//! # Adapters (optional)
//!
//! - `transport` feature: [`transport::WsDriver`], a WebSocket [`Driver`]
//! - `http` feature: [`http::HttpNotificationService`] over reqwest

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod attachment;
mod client;
mod driver;
mod error;
mod event;
mod message_store;
mod notification_feed;
mod presence;
mod runtime;
mod scroll_anchor;
mod service;
mod session;

#[cfg(feature = "http")]
pub mod http;
#[cfg(feature = "transport")]
pub mod transport;

pub use attachment::{AttachmentBinder, BoundAttachment, FileUploader, LocalFile, UploadResult, summarize};
pub use client::SyncClient;
pub use driver::Driver;
pub use error::ClientError;
pub use event::{ClientAction, ClientEvent};
pub use festsync_core::{ConnectionState, Environment, Identity, SyncConfig, SystemEnv};
pub use message_store::{ConversationLog, MergeOutcome, MessageStore, StalledSend};
pub use notification_feed::{FeedAction, NotificationFeed, RequestId};
pub use presence::{PresenceTick, PresenceTracker};
pub use runtime::Runtime;
pub use scroll_anchor::{ScrollAnchor, ScrollCommand};
pub use service::{NotificationService, ServiceError, execute_feed_action};
pub use session::Session;

/// Runtime wired to the production WebSocket channel, REST notification
/// service and system clock.
#[cfg(all(feature = "transport", feature = "http"))]
pub type DashboardRuntime = Runtime<transport::WsDriver, SystemEnv, http::HttpNotificationService>;
