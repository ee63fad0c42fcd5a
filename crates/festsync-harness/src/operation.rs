//! Operations a simulation step can perform.
//!
//! Every operation names its client by index; the world reduces indices
//! modulo the number of clients, so any generated value is valid.

use std::fmt;

use festsync_proto::{ConversationId, NotificationFilter};

use crate::SimEnv;

/// Conversations every simulated client belongs to.
pub const CONVERSATIONS: [ConversationId; 3] = [1, 2, 3];

/// One simulation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SimOp {
    /// Open the channel.
    Connect {
        /// Client index.
        client: usize,
    },
    /// Close the channel on request.
    Disconnect {
        /// Client index.
        client: usize,
    },
    /// Backend severs the client's transport.
    DropConnection {
        /// Client index.
        client: usize,
    },
    /// Refuse (or accept again) new transports.
    SetReachable(bool),
    /// Mount a conversation view.
    Open {
        /// Client index.
        client: usize,
        /// Conversation to mount.
        conversation_id: ConversationId,
    },
    /// Unmount a conversation view.
    Close {
        /// Client index.
        client: usize,
        /// Conversation to unmount.
        conversation_id: ConversationId,
    },
    /// Send a text message.
    Send {
        /// Client index.
        client: usize,
        /// Target conversation.
        conversation_id: ConversationId,
    },
    /// Upload a file and send it.
    SendFile {
        /// Client index.
        client: usize,
        /// Target conversation.
        conversation_id: ConversationId,
        /// Image or document.
        image: bool,
    },
    /// A keystroke in the composer.
    Type {
        /// Client index.
        client: usize,
        /// Conversation being typed in.
        conversation_id: ConversationId,
    },
    /// Scroll the active view.
    Scroll {
        /// Client index.
        client: usize,
        /// Distance from the bottom after scrolling.
        distance_px: u32,
    },
    /// (Re)load the notification feed.
    Bootstrap {
        /// Client index.
        client: usize,
        /// Filter to load.
        filter: NotificationFilter,
    },
    /// Fetch the next notification page.
    LoadMore {
        /// Client index.
        client: usize,
    },
    /// Mark the nth shown notification read.
    MarkRead {
        /// Client index.
        client: usize,
        /// Position in the feed (reduced modulo its length).
        nth: usize,
    },
    /// Mark everything read.
    MarkAllRead {
        /// Client index.
        client: usize,
    },
    /// Delete every notification.
    ClearNotifications {
        /// Client index.
        client: usize,
    },
    /// Backend publishes a notification to a client's user.
    Publish {
        /// Client index.
        client: usize,
    },
    /// Make the next notification service calls fail.
    FailService {
        /// Number of calls to fail.
        calls: u32,
    },
    /// Let virtual time pass.
    Advance {
        /// Milliseconds to advance.
        millis: u64,
    },
}

impl SimOp {
    /// Draw a random operation from the environment's RNG.
    pub fn random(env: &SimEnv, clients: usize) -> Self {
        let client = env.below(clients as u64) as usize;
        let conversation_id = env.pick(&CONVERSATIONS).copied().unwrap_or(CONVERSATIONS[0]);

        match env.below(100) {
            0..=4 => Self::Connect { client },
            5..=6 => Self::Disconnect { client },
            7..=9 => Self::DropConnection { client },
            10 => Self::SetReachable(env.chance(0.7)),
            11..=18 => Self::Open { client, conversation_id },
            19..=21 => Self::Close { client, conversation_id },
            22..=39 => Self::Send { client, conversation_id },
            40..=42 => Self::SendFile { client, conversation_id, image: env.chance(0.5) },
            43..=54 => Self::Type { client, conversation_id },
            55..=59 => Self::Scroll { client, distance_px: env.below(400) as u32 },
            60..=63 => {
                let filter = if env.chance(0.5) {
                    NotificationFilter::All
                } else {
                    NotificationFilter::UnreadOnly
                };
                Self::Bootstrap { client, filter }
            },
            64..=66 => Self::LoadMore { client },
            67..=70 => Self::MarkRead { client, nth: env.below(32) as usize },
            71 => Self::MarkAllRead { client },
            72 => Self::ClearNotifications { client },
            73..=80 => Self::Publish { client },
            81 => Self::FailService { calls: env.below(3) as u32 + 1 },
            _ => Self::Advance { millis: env.below(4000) },
        }
    }
}

impl fmt::Display for SimOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect { client } => write!(f, "client {client} connects"),
            Self::Disconnect { client } => write!(f, "client {client} disconnects"),
            Self::DropConnection { client } => write!(f, "backend drops client {client}"),
            Self::SetReachable(reachable) => write!(f, "backend reachable={reachable}"),
            Self::Open { client, conversation_id } => {
                write!(f, "client {client} opens conversation {conversation_id}")
            },
            Self::Close { client, conversation_id } => {
                write!(f, "client {client} closes conversation {conversation_id}")
            },
            Self::Send { client, conversation_id } => {
                write!(f, "client {client} sends to {conversation_id}")
            },
            Self::SendFile { client, conversation_id, image } => {
                write!(f, "client {client} sends file (image={image}) to {conversation_id}")
            },
            Self::Type { client, conversation_id } => {
                write!(f, "client {client} types in {conversation_id}")
            },
            Self::Scroll { client, distance_px } => {
                write!(f, "client {client} scrolls to {distance_px}px from bottom")
            },
            Self::Bootstrap { client, filter } => {
                write!(f, "client {client} loads feed ({filter:?})")
            },
            Self::LoadMore { client } => write!(f, "client {client} loads more"),
            Self::MarkRead { client, nth } => write!(f, "client {client} marks #{nth} read"),
            Self::MarkAllRead { client } => write!(f, "client {client} marks all read"),
            Self::ClearNotifications { client } => write!(f, "client {client} clears feed"),
            Self::Publish { client } => write!(f, "notify client {client}"),
            Self::FailService { calls } => write!(f, "fail next {calls} service calls"),
            Self::Advance { millis } => write!(f, "advance {millis}ms"),
        }
    }
}
