//! Frozen views of the simulated deployment.
//!
//! A snapshot copies only what a dashboard user could see (log order,
//! typing sets, feed contents and badge) plus the backend's stored ids, so
//! checks never hold locks on live runtimes.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use festsync_client::{Environment, SyncClient};
use festsync_proto::{ConversationId, MessageId, NotificationFilter, NotificationId, UserId};

use crate::sim_server::SimBackend;

/// Every client plus the backend, at one instant.
#[derive(Debug, Clone, Default)]
pub struct SystemSnapshot {
    /// One entry per simulated client, in world order.
    pub clients: Vec<ClientSnapshot>,
    /// Message ids the backend stored, oldest first, per conversation.
    pub server_history: BTreeMap<ConversationId, Vec<MessageId>>,
    /// Size of the first history page a client fetches.
    pub history_page_size: usize,
}

impl SystemSnapshot {
    /// A deployment with no clients.
    pub fn empty() -> Self {
        Self::default()
    }

    /// One client and no backend view, for unit-testing checks.
    pub fn single(client: ClientSnapshot) -> Self {
        Self { clients: vec![client], ..Self::default() }
    }

    /// Capture the backend's stored history.
    pub fn with_backend(mut self, backend: &SimBackend, history_page_size: u32) -> Self {
        self.server_history = backend
            .conversations()
            .map(|id| (id, backend.history(id).iter().map(|m| m.id).collect()))
            .collect();
        self.history_page_size = history_page_size as usize;
        self
    }

    /// Append a client.
    pub fn add_client(&mut self, client: ClientSnapshot) {
        self.clients.push(client);
    }
}

/// Snapshot of a single client's observable state.
#[derive(Debug, Clone, Default)]
pub struct ClientSnapshot {
    /// Local user.
    pub user_id: UserId,
    /// Whether the channel was live.
    pub live: bool,
    /// Conversations the client asked to receive pushes for.
    pub joined: BTreeSet<ConversationId>,
    /// Mounted conversation logs as `(created_at, id)` keys, in log order.
    pub logs: BTreeMap<ConversationId, Vec<(DateTime<Utc>, MessageId)>>,
    /// Remote typers per mounted conversation.
    pub typing: BTreeMap<ConversationId, Vec<UserId>>,
    /// Notification feed state.
    pub feed: FeedSnapshot,
}

/// Snapshot of a notification feed.
#[derive(Debug, Clone, Default)]
pub struct FeedSnapshot {
    /// Active filter.
    pub filter: NotificationFilter,
    /// Displayed notification ids, in display order.
    pub ids: Vec<NotificationId>,
    /// Displayed notifications already read.
    pub read: usize,
    /// Badge value.
    pub unread_count: u64,
    /// Whether a page fetch was in flight.
    pub loading: bool,
}

impl FeedSnapshot {
    /// Displayed notifications not yet read.
    pub fn shown_unread(&self) -> u64 {
        (self.ids.len() - self.read) as u64
    }
}

impl ClientSnapshot {
    /// Create an empty snapshot for `user_id`.
    pub fn new(user_id: UserId) -> Self {
        Self { user_id, ..Default::default() }
    }

    /// Capture the observable state of a client.
    pub fn from_client<E: Environment>(client: &SyncClient<E>) -> Self {
        let store = client.messages();
        let mut logs = BTreeMap::new();
        let mut typing = BTreeMap::new();
        for conversation_id in store.mounted() {
            if let Some(log) = store.log(conversation_id) {
                logs.insert(conversation_id, log.messages().iter().map(|m| m.sort_key()).collect());
            }
            typing.insert(conversation_id, client.typing_users(conversation_id));
        }

        let feed = client.feed();
        let feed = FeedSnapshot {
            filter: feed.filter(),
            ids: feed.items().iter().map(|n| n.id).collect(),
            read: feed.items().iter().filter(|n| n.is_read).count(),
            unread_count: feed.unread_count(),
            loading: feed.is_loading(),
        };

        Self {
            user_id: client.user_id(),
            live: client.is_live(),
            joined: store.joined().clone(),
            logs,
            typing,
            feed,
        }
    }
}
