//! In-memory channel backend for simulation.
//!
//! `SimBackend` plays the server side of the persistent channel: it keeps
//! conversation history, assigns message ids and timestamps, fans pushes
//! out to subscribed connections and answers history requests. Delivery is
//! by per-user inbox so the test decides when each client reads.
//!
//! Faults are explicit: [`SimBackend::drop_connection`] severs one user's
//! transport and [`SimBackend::set_reachable`] refuses new opens.

use std::{
    collections::{BTreeMap, HashMap, HashSet, VecDeque},
    sync::{Arc, Mutex, PoisonError},
};

use chrono::{DateTime, TimeDelta, Utc};
use festsync_core::{Environment, Identity};
use festsync_proto::{Attachment, ConversationId, Inbound, Message, MessageId, Outbound, UserId};

use crate::SimEnv;

/// Wall-clock time the simulated backend stamps at virtual time zero.
const EPOCH_SECS: i64 = 1_760_000_000;

/// Per-user connection state.
#[derive(Debug, Default)]
struct Connection {
    display_name: String,
    open: bool,
    subscriptions: HashSet<ConversationId>,
    inbox: VecDeque<Inbound>,
}

/// Simulated channel backend.
pub struct SimBackend {
    env: SimEnv,
    history: BTreeMap<ConversationId, Vec<Message>>,
    connections: HashMap<UserId, Connection>,
    next_message_id: MessageId,
    reachable: bool,
}

/// Backend shared between every [`crate::SimDriver`] in a simulation.
pub type SharedBackend = Arc<Mutex<SimBackend>>;

/// Create a backend wrapped for sharing.
pub fn create_shared_backend(env: SimEnv) -> SharedBackend {
    Arc::new(Mutex::new(SimBackend::new(env)))
}

/// Lock a shared backend, recovering from a poisoned lock.
pub fn lock_backend(backend: &SharedBackend) -> std::sync::MutexGuard<'_, SimBackend> {
    backend.lock().unwrap_or_else(PoisonError::into_inner)
}

impl SimBackend {
    /// Create an empty backend on the given clock.
    pub fn new(env: SimEnv) -> Self {
        Self {
            env,
            history: BTreeMap::new(),
            connections: HashMap::new(),
            next_message_id: 1,
            reachable: true,
        }
    }

    /// Accept or refuse new transports.
    pub fn set_reachable(&mut self, reachable: bool) {
        self.reachable = reachable;
    }

    /// Whether new transports are accepted.
    pub fn is_reachable(&self) -> bool {
        self.reachable
    }

    /// Open a transport for `identity`.
    ///
    /// Returns `false` if the backend is unreachable. On success the
    /// handshake ack is queued; subscriptions start empty.
    pub fn connect(&mut self, identity: &Identity) -> bool {
        if !self.reachable {
            return false;
        }

        let connection = self.connections.entry(identity.user_id).or_default();
        connection.display_name.clone_from(&identity.display_name);
        connection.open = true;
        connection.subscriptions.clear();
        connection.inbox.clear();
        connection.inbox.push_back(Inbound::Connect);
        tracing::debug!(user_id = identity.user_id, "sim backend accepted transport");
        true
    }

    /// Client closed its transport.
    pub fn disconnect(&mut self, user_id: UserId) {
        if let Some(connection) = self.connections.get_mut(&user_id) {
            connection.open = false;
            connection.subscriptions.clear();
            connection.inbox.clear();
        }
    }

    /// Sever a user's transport from the server side.
    ///
    /// Pending deliveries are lost and the client reads a disconnect next.
    pub fn drop_connection(&mut self, user_id: UserId, reason: &str) {
        if let Some(connection) = self.connections.get_mut(&user_id) {
            if connection.open {
                connection.open = false;
                connection.subscriptions.clear();
                connection.inbox.clear();
                connection.inbox.push_back(Inbound::Disconnect { reason: reason.to_string() });
                tracing::debug!(user_id, reason, "sim backend dropped transport");
            }
        }
    }

    /// Whether `user_id` has an open transport.
    pub fn is_connected(&self, user_id: UserId) -> bool {
        self.connections.get(&user_id).is_some_and(|c| c.open)
    }

    /// Next event waiting for `user_id`.
    pub fn take_inbound(&mut self, user_id: UserId) -> Option<Inbound> {
        self.connections.get_mut(&user_id)?.inbox.pop_front()
    }

    /// Number of events waiting for `user_id`.
    pub fn pending(&self, user_id: UserId) -> usize {
        self.connections.get(&user_id).map_or(0, |c| c.inbox.len())
    }

    /// Push an arbitrary event to a connected user (notifications, errors).
    pub fn deliver(&mut self, user_id: UserId, event: Inbound) -> bool {
        match self.connections.get_mut(&user_id) {
            Some(connection) if connection.open => {
                connection.inbox.push_back(event);
                true
            },
            _ => false,
        }
    }

    /// Full stored history of a conversation, oldest first.
    pub fn history(&self, conversation_id: ConversationId) -> &[Message] {
        self.history.get(&conversation_id).map_or(&[], Vec::as_slice)
    }

    /// Every conversation with at least one message.
    pub fn conversations(&self) -> impl Iterator<Item = ConversationId> + '_ {
        self.history.keys().copied()
    }

    /// Store a message without routing it through a connection (seed data).
    pub fn seed_message(
        &mut self,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: &str,
        content: &str,
    ) -> Message {
        self.store(conversation_id, sender_id, sender_name.to_string(), content.to_string(), None)
    }

    /// Handle one event sent by `user_id`.
    pub fn handle(&mut self, user_id: UserId, event: Outbound) {
        if !self.is_connected(user_id) {
            tracing::debug!(user_id, event = event.name(), "ignoring event from closed transport");
            return;
        }

        match event {
            Outbound::JoinConversations { conversation_ids } => {
                if let Some(connection) = self.connections.get_mut(&user_id) {
                    connection.subscriptions.extend(conversation_ids);
                }
            },
            Outbound::SendMessage { conversation_id, content, .. } => {
                self.post(user_id, conversation_id, content, None);
            },
            Outbound::SendMessageWithAttachment { conversation_id, content, attachment, .. } => {
                self.post(user_id, conversation_id, content, Some(attachment));
            },
            Outbound::RequestHistory { conversation_id, page, limit } => {
                let messages = self.page(conversation_id, page, limit);
                self.deliver(user_id, Inbound::MessageHistory { conversation_id, messages });
            },
            Outbound::TypingStart { conversation_id } => {
                self.relay(user_id, conversation_id, |user_id| Inbound::UserTyping {
                    conversation_id,
                    user_id,
                });
            },
            Outbound::TypingStop { conversation_id } => {
                self.relay(user_id, conversation_id, |user_id| Inbound::UserStoppedTyping {
                    conversation_id,
                    user_id,
                });
            },
        }
    }

    fn post(
        &mut self,
        sender_id: UserId,
        conversation_id: ConversationId,
        content: String,
        attachment: Option<Attachment>,
    ) {
        let sender_name =
            self.connections.get(&sender_id).map(|c| c.display_name.clone()).unwrap_or_default();
        let message = self.store(conversation_id, sender_id, sender_name, content, attachment);

        for connection in self.connections.values_mut() {
            if connection.open && connection.subscriptions.contains(&conversation_id) {
                connection.inbox.push_back(Inbound::NewMessage(message.clone()));
            }
        }
    }

    fn store(
        &mut self,
        conversation_id: ConversationId,
        sender_id: UserId,
        sender_name: String,
        content: String,
        attachment: Option<Attachment>,
    ) -> Message {
        let id = self.next_message_id;
        self.next_message_id += 1;

        let message = Message {
            id,
            conversation_id,
            sender_id,
            sender_name,
            content,
            attachments: attachment.into_iter().collect(),
            created_at: self.wall_clock(),
        };
        self.history.entry(conversation_id).or_default().push(message.clone());
        message
    }

    /// Page `page` (1-based) of a conversation, newest first.
    fn page(&self, conversation_id: ConversationId, page: u32, limit: u32) -> Vec<Message> {
        let skip = (page.max(1) as usize - 1) * limit as usize;
        self.history(conversation_id).iter().rev().skip(skip).take(limit as usize).cloned().collect()
    }

    fn relay(
        &mut self,
        from: UserId,
        conversation_id: ConversationId,
        event: impl Fn(UserId) -> Inbound,
    ) {
        for (user_id, connection) in &mut self.connections {
            if *user_id != from && connection.open && connection.subscriptions.contains(&conversation_id)
            {
                connection.inbox.push_back(event(from));
            }
        }
    }

    /// Millisecond-precision wall clock derived from virtual time, so
    /// messages sent in the same instant share a timestamp.
    fn wall_clock(&self) -> DateTime<Utc> {
        let elapsed = TimeDelta::from_std(self.env.now().since_start()).unwrap_or_default();
        let millis = TimeDelta::milliseconds(elapsed.num_milliseconds());
        DateTime::from_timestamp(EPOCH_SECS, 0).unwrap_or_default() + millis
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> SimBackend {
        SimBackend::new(SimEnv::with_seed(0))
    }

    fn drain(backend: &mut SimBackend, user_id: UserId) -> Vec<Inbound> {
        std::iter::from_fn(|| backend.take_inbound(user_id)).collect()
    }

    #[test]
    fn connect_queues_handshake() {
        let mut backend = backend();
        assert!(backend.connect(&Identity::new(1, "Aoi")));
        assert_eq!(drain(&mut backend, 1), vec![Inbound::Connect]);
    }

    #[test]
    fn unreachable_refuses_connect() {
        let mut backend = backend();
        backend.set_reachable(false);
        assert!(!backend.connect(&Identity::new(1, "Aoi")));
        assert!(!backend.is_connected(1));
    }

    #[test]
    fn send_echoes_to_subscribers_only() {
        let mut backend = backend();
        backend.connect(&Identity::new(1, "Aoi"));
        backend.connect(&Identity::new(2, "Ren"));
        backend.connect(&Identity::new(3, "Sora"));
        backend.handle(1, Outbound::JoinConversations { conversation_ids: vec![7] });
        backend.handle(2, Outbound::JoinConversations { conversation_ids: vec![7] });
        for user in 1..=3 {
            drain(&mut backend, user);
        }

        backend.handle(1, Outbound::SendMessage {
            conversation_id: 7,
            message_type: festsync_proto::MessageType::Text,
            content: "hello".into(),
        });

        let echo = drain(&mut backend, 1);
        assert!(matches!(&echo[..], [Inbound::NewMessage(m)] if m.sender_name == "Aoi"));
        assert_eq!(drain(&mut backend, 2).len(), 1);
        assert!(drain(&mut backend, 3).is_empty());
        assert_eq!(backend.history(7).len(), 1);
    }

    #[test]
    fn history_pages_newest_first() {
        let mut backend = backend();
        for i in 0..5 {
            backend.seed_message(7, 2, "Ren", &format!("m{i}"));
        }
        backend.connect(&Identity::new(1, "Aoi"));
        drain(&mut backend, 1);

        backend.handle(1, Outbound::RequestHistory { conversation_id: 7, page: 2, limit: 2 });
        let Some(Inbound::MessageHistory { messages, .. }) = backend.take_inbound(1) else {
            panic!("expected a history page");
        };
        let contents: Vec<_> = messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, vec!["m2", "m1"]);
    }

    #[test]
    fn typing_is_relayed_to_others() {
        let mut backend = backend();
        backend.connect(&Identity::new(1, "Aoi"));
        backend.connect(&Identity::new(2, "Ren"));
        backend.handle(1, Outbound::JoinConversations { conversation_ids: vec![7] });
        backend.handle(2, Outbound::JoinConversations { conversation_ids: vec![7] });
        drain(&mut backend, 1);
        drain(&mut backend, 2);

        backend.handle(1, Outbound::TypingStart { conversation_id: 7 });
        assert!(drain(&mut backend, 1).is_empty());
        assert_eq!(
            drain(&mut backend, 2),
            vec![Inbound::UserTyping { conversation_id: 7, user_id: 1 }]
        );
    }

    #[test]
    fn dropped_connection_loses_pending_and_reports_disconnect() {
        let mut backend = backend();
        backend.connect(&Identity::new(1, "Aoi"));
        backend.drop_connection(1, "reset");

        assert!(!backend.is_connected(1));
        assert_eq!(drain(&mut backend, 1), vec![Inbound::Disconnect { reason: "reset".into() }]);

        backend.handle(1, Outbound::JoinConversations { conversation_ids: vec![7] });
        assert!(!backend.deliver(1, Inbound::Connect));
    }
}
