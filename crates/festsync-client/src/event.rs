//! Client events and actions.

use std::time::Duration;

use festsync_core::Identity;
use festsync_proto::{
    ConversationId, Inbound, Notification, NotificationFilter, NotificationId, Outbound, UserId,
};

use crate::{
    attachment::BoundAttachment,
    notification_feed::{FeedAction, RequestId},
    scroll_anchor::ScrollCommand,
};

/// Events the caller feeds into the client.
///
/// The caller is responsible for:
/// - Delivering inbound channel events and transport closures
/// - Driving time forward via ticks
/// - Forwarding user intents (open a conversation, send, type, ...)
/// - Feeding back notification service completions
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (virtual) environments.
#[derive(Debug, Clone)]
pub enum ClientEvent<I = std::time::Instant> {
    /// Open the channel as the session identity.
    Connect,

    /// Close the channel on request.
    Disconnect,

    /// Event received on the channel.
    Inbound(Inbound),

    /// Transport went away (network drop, auth loss, open failure).
    TransportClosed {
        /// Human-readable cause.
        reason: String,
    },

    /// Time tick for deadline processing.
    ///
    /// The caller should tick at least at `SyncClient::next_deadline`.
    Tick {
        /// Current time from the environment.
        now: I,
    },

    /// Subscribe to live pushes for these conversations.
    JoinConversations {
        /// Conversations to join.
        conversation_ids: Vec<ConversationId>,
    },

    /// A conversation view was mounted and put on screen.
    OpenConversation {
        /// Conversation to show.
        conversation_id: ConversationId,
    },

    /// A conversation view was unmounted.
    CloseConversation {
        /// Conversation to drop.
        conversation_id: ConversationId,
    },

    /// Ask for an older page of history.
    RequestHistory {
        /// Conversation to page through.
        conversation_id: ConversationId,
        /// 1-based page number.
        page: u32,
    },

    /// Send a text message.
    SendMessage {
        /// Target conversation.
        conversation_id: ConversationId,
        /// Body.
        content: String,
    },

    /// Send a message carrying an uploaded file.
    SendAttachment(BoundAttachment),

    /// Local keystroke in a conversation's composer.
    Typing {
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },

    /// Reader scrolled the active conversation.
    Scrolled {
        /// Gap between the viewport and the bottom edge.
        distance_from_bottom_px: u32,
    },

    /// (Re)load the notification feed under a filter.
    BootstrapFeed {
        /// Filter to apply.
        filter: NotificationFilter,
    },

    /// Fetch the next notification page.
    LoadMoreNotifications,

    /// Mark one notification read.
    MarkNotificationRead {
        /// Notification to mark.
        notification_id: NotificationId,
    },

    /// Mark every notification read.
    MarkAllNotificationsRead,

    /// Delete every notification.
    ClearNotifications,

    /// A `FeedAction::FetchPage` completed.
    FeedPageLoaded {
        /// Correlation from the action.
        request_id: RequestId,
        /// Items, or the failure reason.
        result: Result<Vec<Notification>, String>,
    },

    /// A `FeedAction::CountUnread` completed.
    UnreadCountLoaded {
        /// Correlation from the action.
        request_id: RequestId,
        /// Count, or the failure reason.
        result: Result<u64, String>,
    },
}

/// Actions the client produces for the caller to execute.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientAction {
    /// Open a transport authenticated as `identity`.
    Open {
        /// Who to authenticate as.
        identity: Identity,
    },

    /// Tear the transport down.
    Close {
        /// Why.
        reason: String,
    },

    /// Send an event on the live channel.
    Emit(Outbound),

    /// The is-live signal flipped.
    LiveChanged(bool),

    /// Call the notification service.
    Feed(FeedAction),

    /// A mounted conversation log changed.
    LogUpdated {
        /// Conversation whose log changed.
        conversation_id: ConversationId,
        /// Number of newly inserted messages.
        inserted: usize,
    },

    /// Move the active conversation view.
    Scroll {
        /// Conversation on screen.
        conversation_id: ConversationId,
        /// How to move.
        command: ScrollCommand,
    },

    /// The set of remote typers changed.
    TypingChanged {
        /// Conversation affected.
        conversation_id: ConversationId,
        /// Everyone now typing there, ascending.
        users: Vec<UserId>,
    },

    /// An outgoing message has not been echoed back in time.
    SendStalled {
        /// Conversation it was sent to.
        conversation_id: ConversationId,
        /// Body as sent.
        content: String,
        /// Time since the send.
        waited: Duration,
    },

    /// Notification feed items or unread count changed.
    FeedUpdated,

    /// The backend reported an error on the channel.
    BackendError {
        /// Reason as sent by the backend.
        reason: String,
    },
}
