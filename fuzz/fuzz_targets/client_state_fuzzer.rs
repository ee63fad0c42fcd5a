//! Fuzz target for the sync client state machine
//!
//! Drives a `SyncClient` with arbitrary interleavings of user intents,
//! channel events and time, with no backend behind it.
//!
//! # Strategy
//!
//! - Channel: handshake acks, drops, errors and pushes at any moment
//! - Messages: small id and timestamp ranges so duplicates and ties are common
//! - Time: jumps across the typing, staleness and stall thresholds
//!
//! # Invariants
//!
//! - `handle` never panics
//! - Every mounted log stays strictly ordered by `(created_at, id)`
//! - The local user never shows up as a remote typer
//! - The unread badge matches the feed under the `all` filter when idle

#![no_main]

use std::{
    sync::{Arc, Mutex},
    time::{Duration, Instant},
};

use arbitrary::Arbitrary;
use chrono::DateTime;
use festsync_client::{ClientEvent, Environment, Identity, SyncClient, SyncConfig};
use festsync_proto::{Inbound, Message, Notification, NotificationFilter};
use libfuzzer_sys::fuzz_target;

const ME: u64 = 1;

#[derive(Clone)]
struct FuzzEnv {
    now: Arc<Mutex<Instant>>,
}

impl FuzzEnv {
    fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Environment for FuzzEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        *self.now.lock().unwrap()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }
}

#[derive(Debug, Clone, Arbitrary)]
enum Op {
    Connect,
    Disconnect,
    Ack,
    Dropped,
    BackendError,
    Open(u8),
    Close(u8),
    Send { conversation: u8, blank: bool },
    Type(u8),
    Scroll(u16),
    Push { id: u8, conversation: u8, sender: u8, second: u8 },
    History { conversation: u8, ids: Vec<u8> },
    RemoteTyping { conversation: u8, user: u8, stopped: bool },
    Notify { id: u8, read: bool },
    Bootstrap { unread_only: bool },
    PageLoaded { request_id: u8, ids: Vec<u8>, fail: bool },
    MarkRead(u8),
    MarkAllRead,
    Advance(u16),
}

fn message(id: u8, conversation: u8, sender: u8, second: u8) -> Message {
    Message {
        id: u64::from(id),
        conversation_id: u64::from(conversation % 4),
        sender_id: u64::from(sender % 4),
        sender_name: String::new(),
        content: format!("m{id}"),
        attachments: Vec::new(),
        created_at: DateTime::from_timestamp(1_700_000_000 + i64::from(second % 16), 0)
            .unwrap_or_default(),
    }
}

fn notification(id: u8, read: bool) -> Notification {
    Notification {
        id: u64::from(id),
        recipient_id: ME,
        content: String::new(),
        kind: "announcement".into(),
        payload: Default::default(),
        created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap_or_default(),
        is_read: read,
    }
}

fuzz_target!(|ops: Vec<Op>| {
    let env = FuzzEnv { now: Arc::new(Mutex::new(Instant::now())) };
    let mut client = SyncClient::login(env.clone(), Identity::new(ME, "Me"), &SyncConfig::default());

    for op in ops {
        let event = match op {
            Op::Connect => ClientEvent::Connect,
            Op::Disconnect => ClientEvent::Disconnect,
            Op::Ack => ClientEvent::Inbound(Inbound::Connect),
            Op::Dropped => ClientEvent::TransportClosed { reason: "fuzz".into() },
            Op::BackendError => ClientEvent::Inbound(Inbound::Error { reason: "fuzz".into() }),
            Op::Open(c) => ClientEvent::OpenConversation { conversation_id: u64::from(c % 4) },
            Op::Close(c) => ClientEvent::CloseConversation { conversation_id: u64::from(c % 4) },
            Op::Send { conversation, blank } => ClientEvent::SendMessage {
                conversation_id: u64::from(conversation % 4),
                content: if blank { "  ".into() } else { "hi".into() },
            },
            Op::Type(c) => ClientEvent::Typing { conversation_id: u64::from(c % 4) },
            Op::Scroll(px) => ClientEvent::Scrolled { distance_from_bottom_px: u32::from(px) },
            Op::Push { id, conversation, sender, second } => {
                ClientEvent::Inbound(Inbound::NewMessage(message(id, conversation, sender, second)))
            },
            Op::History { conversation, ids } => ClientEvent::Inbound(Inbound::MessageHistory {
                conversation_id: u64::from(conversation % 4),
                messages: ids.iter().map(|id| message(*id, conversation, *id, *id)).collect(),
            }),
            Op::RemoteTyping { conversation, user, stopped } => {
                let conversation_id = u64::from(conversation % 4);
                let user_id = u64::from(user % 4);
                ClientEvent::Inbound(if stopped {
                    Inbound::UserStoppedTyping { conversation_id, user_id }
                } else {
                    Inbound::UserTyping { conversation_id, user_id }
                })
            },
            Op::Notify { id, read } => ClientEvent::Inbound(Inbound::Notification {
                recipient_id: ME,
                notification: notification(id, read),
            }),
            Op::Bootstrap { unread_only } => ClientEvent::BootstrapFeed {
                filter: if unread_only {
                    NotificationFilter::UnreadOnly
                } else {
                    NotificationFilter::All
                },
            },
            Op::PageLoaded { request_id, ids, fail } => ClientEvent::FeedPageLoaded {
                request_id: u64::from(request_id % 8),
                result: if fail {
                    Err("fuzz".into())
                } else {
                    Ok(ids.iter().map(|id| notification(*id, id % 3 == 0)).collect())
                },
            },
            Op::MarkRead(id) => ClientEvent::MarkNotificationRead { notification_id: u64::from(id) },
            Op::MarkAllRead => ClientEvent::MarkAllNotificationsRead,
            Op::Advance(millis) => {
                env.advance(Duration::from_millis(u64::from(millis)));
                ClientEvent::Tick { now: env.now() }
            },
        };

        let _ = client.handle(event);

        for conversation_id in client.messages().mounted() {
            if let Some(log) = client.log(conversation_id) {
                let keys: Vec<_> = log.messages().iter().map(Message::sort_key).collect();
                assert!(keys.windows(2).all(|w| w[0] < w[1]), "unordered log {keys:?}");
            }
            assert!(!client.typing_users(conversation_id).contains(&ME), "local user typing");
        }

        let feed = client.feed();
        if feed.filter() == NotificationFilter::All && !feed.is_loading() {
            let shown = feed.items().iter().filter(|n| !n.is_read).count() as u64;
            assert_eq!(feed.unread_count(), shown, "badge drifted from feed");
        }
    }
});
