//! Sync client state machine.
//!
//! `SyncClient` owns one instance of every component for a signed-in session
//! and routes events between them. It is the only place that knows how the
//! components relate: the connection's live signal gates channel emissions,
//! a reconnect triggers re-join and history re-fetch, message merges feed the
//! scroll anchor, and so on.

use festsync_core::{
    Connection, ConnectionAction, ConnectionState, Environment, Identity, SyncConfig,
};
use festsync_proto::{Attachment, ConversationId, Inbound, Message, Outbound, UserId};

use crate::{
    attachment::{AttachmentBinder, BoundAttachment},
    error::ClientError,
    event::{ClientAction, ClientEvent},
    message_store::{ConversationLog, MergeOutcome, MessageStore},
    notification_feed::{FeedAction, NotificationFeed},
    presence::PresenceTracker,
    scroll_anchor::ScrollAnchor,
    session::Session,
};

/// Real-time sync engine for one signed-in user.
pub struct SyncClient<E: Environment> {
    /// Environment for time.
    env: E,

    /// Who is signed in.
    session: Session,

    /// Channel lifecycle and the is-live signal.
    connection: Connection<E::Instant>,

    /// Conversation logs, joins and pending sends.
    messages: MessageStore<E::Instant>,

    /// Local and remote typing state.
    presence: PresenceTracker<E::Instant>,

    /// Paginated notifications.
    feed: NotificationFeed,

    /// Follow-the-bottom state of the active view.
    scroll: ScrollAnchor,

    /// Attachment validation.
    binder: AttachmentBinder,
}

impl<E: Environment> SyncClient<E> {
    /// Start a session. Nothing is connected until [`ClientEvent::Connect`].
    pub fn login(env: E, identity: Identity, config: &SyncConfig) -> Self {
        let user_id = identity.user_id;
        Self {
            env,
            messages: MessageStore::new(user_id, identity.display_name.clone(), config),
            presence: PresenceTracker::new(user_id, config),
            feed: NotificationFeed::new(user_id, config.notification_page_size),
            scroll: ScrollAnchor::new(config.scroll_threshold_px),
            binder: AttachmentBinder::new(config.max_attachment_bytes),
            connection: Connection::new(config),
            session: Session::login(identity),
        }
    }

    /// End the session: close the channel and drop every store.
    ///
    /// Further events are rejected with `ClientError::SessionEnded`.
    pub fn logout(&mut self) -> Vec<ClientAction> {
        if !self.session.is_active() {
            return vec![];
        }

        let closed = self.connection.disconnect();
        let mut actions = self.convert_connection_actions(closed);
        actions.extend(self.drop_presence());
        self.messages.clear();
        self.feed.reset();
        if let Some(active) = self.scroll.active() {
            self.scroll.deactivate(active);
        }
        self.session.logout();
        actions
    }

    /// Environment the client reads time from.
    pub fn env(&self) -> &E {
        &self.env
    }

    /// Signed-in session.
    pub fn session(&self) -> &Session {
        &self.session
    }

    /// Signed-in user id.
    pub fn user_id(&self) -> UserId {
        self.session.user_id()
    }

    /// Channel state.
    pub fn connection_state(&self) -> ConnectionState {
        self.connection.state()
    }

    /// The is-live signal.
    pub fn is_live(&self) -> bool {
        self.connection.is_live()
    }

    /// How many times the channel has become live this session.
    pub fn session_epoch(&self) -> u64 {
        self.connection.session_epoch()
    }

    /// Log of a mounted conversation.
    pub fn log(&self, conversation_id: ConversationId) -> Option<&ConversationLog> {
        self.messages.log(conversation_id)
    }

    /// Message store, read-only.
    pub fn messages(&self) -> &MessageStore<E::Instant> {
        &self.messages
    }

    /// Presence tracker, read-only.
    pub fn presence(&self) -> &PresenceTracker<E::Instant> {
        &self.presence
    }

    /// Remote users typing in a conversation.
    pub fn typing_users(&self, conversation_id: ConversationId) -> Vec<UserId> {
        self.presence.typing_users(conversation_id)
    }

    /// Notification feed, read-only.
    pub fn feed(&self) -> &NotificationFeed {
        &self.feed
    }

    /// Scroll anchor, read-only.
    pub fn scroll(&self) -> &ScrollAnchor {
        &self.scroll
    }

    /// Attachment binder configured for this session.
    pub fn binder(&self) -> &AttachmentBinder {
        &self.binder
    }

    /// Earliest instant at which a tick has work to do.
    pub fn next_deadline(&self) -> Option<E::Instant> {
        [
            self.connection.next_deadline(),
            self.presence.next_deadline(),
            self.messages.next_deadline(),
        ]
        .into_iter()
        .flatten()
        .min()
    }

    /// Process an event and return resulting actions.
    ///
    /// # Errors
    ///
    /// - `ClientError::SessionEnded` after `logout`
    /// - `ClientError::Connectivity` for `RequestHistory` while not live
    /// - `ClientError::EmptyMessage` for a blank text send
    pub fn handle(
        &mut self,
        event: ClientEvent<E::Instant>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if !self.session.is_active() {
            return Err(ClientError::SessionEnded);
        }

        match event {
            ClientEvent::Connect => Ok(self.handle_connect()),
            ClientEvent::Disconnect => {
                let actions = self.connection.disconnect();
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::Inbound(inbound) => Ok(self.handle_inbound(inbound)),
            ClientEvent::TransportClosed { reason } => {
                let actions = self.connection.handle_closed(&reason);
                Ok(self.convert_connection_actions(actions))
            },
            ClientEvent::Tick { now } => Ok(self.handle_tick(now)),
            ClientEvent::JoinConversations { conversation_ids } => {
                let event = self.messages.join(&conversation_ids, self.is_live());
                Ok(self.emit_all(event))
            },
            ClientEvent::OpenConversation { conversation_id } => {
                Ok(self.handle_open_conversation(conversation_id))
            },
            ClientEvent::CloseConversation { conversation_id } => {
                Ok(self.handle_close_conversation(conversation_id))
            },
            ClientEvent::RequestHistory { conversation_id, page } => {
                let event =
                    self.messages.request_history(conversation_id, page, None, self.is_live())?;
                Ok(self.emit_all(Some(event)))
            },
            ClientEvent::SendMessage { conversation_id, content } => {
                self.handle_send(conversation_id, content, None)
            },
            ClientEvent::SendAttachment(bound) => self.handle_send_attachment(bound),
            ClientEvent::Typing { conversation_id } => Ok(self.handle_typing(conversation_id)),
            ClientEvent::Scrolled { distance_from_bottom_px } => {
                self.scroll.on_scroll(distance_from_bottom_px);
                Ok(vec![])
            },
            ClientEvent::BootstrapFeed { filter } => {
                Ok(feed_actions(self.feed.bootstrap(filter), true))
            },
            ClientEvent::LoadMoreNotifications => Ok(feed_actions(self.feed.load_more(), false)),
            ClientEvent::MarkNotificationRead { notification_id } => {
                Ok(feed_actions(self.feed.mark_one_read(notification_id), true))
            },
            ClientEvent::MarkAllNotificationsRead => {
                Ok(feed_actions(self.feed.mark_all_read(), true))
            },
            ClientEvent::ClearNotifications => Ok(feed_actions(self.feed.clear_all(), true)),
            ClientEvent::FeedPageLoaded { request_id, result } => {
                let changed = self.feed.handle_page(request_id, result);
                Ok(if changed { vec![ClientAction::FeedUpdated] } else { vec![] })
            },
            ClientEvent::UnreadCountLoaded { request_id, result } => {
                let changed = self.feed.handle_unread_count(request_id, result);
                Ok(if changed { vec![ClientAction::FeedUpdated] } else { vec![] })
            },
        }
    }

    fn handle_connect(&mut self) -> Vec<ClientAction> {
        let identity = self.session.identity().clone();
        let now = self.env.now();
        let actions = self.connection.connect(identity, now);
        self.convert_connection_actions(actions)
    }

    fn handle_inbound(&mut self, inbound: Inbound) -> Vec<ClientAction> {
        match inbound {
            Inbound::Connect => match self.connection.handle_connected() {
                Ok(actions) => self.convert_connection_actions(actions),
                Err(error) => {
                    tracing::warn!(%error, "ignoring handshake ack");
                    vec![]
                },
            },
            Inbound::Disconnect { reason } => {
                let actions = self.connection.handle_closed(&reason);
                self.convert_connection_actions(actions)
            },
            Inbound::Error { reason } => {
                let mut actions = Vec::new();
                if self.connection.state() == ConnectionState::Connecting {
                    // Backend refused the connect (bad identity, auth expired)
                    let closed = self.connection.handle_closed(&reason);
                    actions.extend(self.convert_connection_actions(closed));
                    actions.push(ClientAction::Close { reason: reason.clone() });
                } else {
                    tracing::warn!(%reason, "backend error on channel");
                }
                actions.push(ClientAction::BackendError { reason });
                actions
            },
            Inbound::NewMessage(message) => self.handle_new_message(message),
            Inbound::MessageHistory { conversation_id, messages } => {
                match self.messages.apply_history(conversation_id, messages) {
                    Some(outcome) => self.after_merge(conversation_id, &outcome),
                    None => vec![],
                }
            },
            Inbound::UserTyping { conversation_id, user_id } => {
                let now = self.env.now();
                if self.presence.handle_remote_typing(conversation_id, user_id, now) {
                    vec![self.typing_changed(conversation_id)]
                } else {
                    vec![]
                }
            },
            Inbound::UserStoppedTyping { conversation_id, user_id } => {
                if self.presence.handle_remote_stopped(conversation_id, user_id) {
                    vec![self.typing_changed(conversation_id)]
                } else {
                    vec![]
                }
            },
            Inbound::Notification { recipient_id, notification } => {
                if recipient_id != self.user_id() {
                    tracing::debug!(recipient_id, "notification push for another user");
                    return vec![];
                }
                if self.feed.handle_push(notification) {
                    vec![ClientAction::FeedUpdated]
                } else {
                    vec![]
                }
            },
        }
    }

    fn handle_new_message(&mut self, message: Message) -> Vec<ClientAction> {
        let conversation_id = message.conversation_id;
        let sender_id = message.sender_id;

        let mut actions = Vec::new();

        // A posted message ends that sender's typing burst
        if self.presence.handle_remote_stopped(conversation_id, sender_id) {
            actions.push(self.typing_changed(conversation_id));
        }

        if let Some(outcome) = self.messages.apply_push(message) {
            actions.extend(self.after_merge(conversation_id, &outcome));
        }

        actions
    }

    fn after_merge(
        &mut self,
        conversation_id: ConversationId,
        outcome: &MergeOutcome,
    ) -> Vec<ClientAction> {
        if !outcome.changed() {
            return vec![];
        }

        let mut actions =
            vec![ClientAction::LogUpdated { conversation_id, inserted: outcome.inserted }];

        if let Some(command) = self.scroll.on_log_grew(conversation_id, outcome, self.user_id()) {
            actions.push(ClientAction::Scroll { conversation_id, command });
        }

        actions
    }

    fn handle_tick(&mut self, now: E::Instant) -> Vec<ClientAction> {
        let connection_actions = self.connection.tick(now);
        let mut actions = self.convert_connection_actions(connection_actions);

        let presence = self.presence.tick(now);
        for event in presence.outbound {
            actions.extend(self.emit(event));
        }
        for conversation_id in presence.changed {
            actions.push(self.typing_changed(conversation_id));
        }

        for stalled in self.messages.tick(now) {
            tracing::warn!(
                conversation_id = stalled.conversation_id,
                waited = ?stalled.waited,
                "send not echoed back"
            );
            actions.push(ClientAction::SendStalled {
                conversation_id: stalled.conversation_id,
                content: stalled.content,
                waited: stalled.waited,
            });
        }

        actions
    }

    fn handle_open_conversation(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        self.messages.open(conversation_id);

        let existing = self.messages.log(conversation_id).map_or(0, ConversationLog::len);
        let mut actions = Vec::new();
        if let Some(command) = self.scroll.activate(conversation_id, existing) {
            actions.push(ClientAction::Scroll { conversation_id, command });
        }

        // Offline opens are fetched on the next transition to live
        if self.is_live() {
            actions.extend(self.request_first_page(conversation_id));
        }

        actions
    }

    fn handle_close_conversation(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        self.messages.close(conversation_id);
        self.scroll.deactivate(conversation_id);
        let stop = self.presence.forget(conversation_id);
        self.emit_all(stop)
    }

    fn handle_send(
        &mut self,
        conversation_id: ConversationId,
        content: String,
        attachment: Option<Attachment>,
    ) -> Result<Vec<ClientAction>, ClientError> {
        if !self.is_live() {
            tracing::debug!(conversation_id, "send while not live, dropped");
            return Ok(vec![]);
        }

        let now = self.env.now();
        let event = self.messages.send(conversation_id, content, attachment, now)?;

        let stop = self.presence.stop_typing(conversation_id);
        let mut actions = self.emit_all(stop);
        actions.extend(self.emit(event));
        Ok(actions)
    }

    fn handle_send_attachment(
        &mut self,
        bound: BoundAttachment,
    ) -> Result<Vec<ClientAction>, ClientError> {
        let BoundAttachment { conversation_id, content, attachment } = bound;
        self.handle_send(conversation_id, content, Some(attachment))
    }

    fn handle_typing(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        if !self.is_live() {
            return vec![];
        }
        let now = self.env.now();
        let start = self.presence.notify_typing(conversation_id, now);
        self.emit_all(start)
    }

    /// Re-subscribe and re-fetch after the channel became live.
    fn on_live_gained(&mut self) -> Vec<ClientAction> {
        let mut actions = self.emit_all(self.messages.rejoin());

        let mounted: Vec<ConversationId> = self.messages.mounted().collect();
        for conversation_id in mounted {
            actions.extend(self.request_first_page(conversation_id));
        }

        // Pushes were missed while offline
        if self.feed.is_bootstrapped() {
            actions.extend(feed_actions(self.feed.bootstrap(self.feed.filter()), true));
        }

        actions
    }

    fn on_live_lost(&mut self) -> Vec<ClientAction> {
        self.messages.forget_history_requests();
        self.drop_presence()
    }

    fn drop_presence(&mut self) -> Vec<ClientAction> {
        self.presence
            .clear()
            .into_iter()
            .map(|conversation_id| ClientAction::TypingChanged { conversation_id, users: vec![] })
            .collect()
    }

    fn request_first_page(&mut self, conversation_id: ConversationId) -> Vec<ClientAction> {
        match self.messages.request_history(conversation_id, 1, None, self.is_live()) {
            Ok(event) => self.emit_all(Some(event)),
            Err(error) => {
                tracing::debug!(%error, conversation_id, "history not requested");
                vec![]
            },
        }
    }

    fn typing_changed(&self, conversation_id: ConversationId) -> ClientAction {
        ClientAction::TypingChanged { conversation_id, users: self.typing_users(conversation_id) }
    }

    fn emit(&self, event: Outbound) -> Option<ClientAction> {
        self.connection.emit(event).map(convert_connection_action)
    }

    fn emit_all(&self, events: impl IntoIterator<Item = Outbound>) -> Vec<ClientAction> {
        events.into_iter().filter_map(|event| self.emit(event)).collect()
    }

    /// Convert connection actions, reacting to live-signal flips.
    fn convert_connection_actions(&mut self, actions: Vec<ConnectionAction>) -> Vec<ClientAction> {
        let mut converted = Vec::with_capacity(actions.len());
        for action in actions {
            let live_changed = match action {
                ConnectionAction::LiveChanged(live) => Some(live),
                _ => None,
            };
            converted.push(convert_connection_action(action));

            match live_changed {
                Some(true) => converted.extend(self.on_live_gained()),
                Some(false) => converted.extend(self.on_live_lost()),
                None => {},
            }
        }
        converted
    }
}

fn convert_connection_action(action: ConnectionAction) -> ClientAction {
    match action {
        ConnectionAction::Open { identity } => ClientAction::Open { identity },
        ConnectionAction::Close { reason } => ClientAction::Close { reason },
        ConnectionAction::Emit(event) => ClientAction::Emit(event),
        ConnectionAction::LiveChanged(live) => ClientAction::LiveChanged(live),
    }
}

/// Wrap feed actions, optionally followed by a re-render.
fn feed_actions(actions: Vec<FeedAction>, render: bool) -> Vec<ClientAction> {
    let mut converted: Vec<ClientAction> = actions.into_iter().map(ClientAction::Feed).collect();
    if render {
        converted.push(ClientAction::FeedUpdated);
    }
    converted
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::{Duration, Instant},
    };

    use chrono::DateTime;
    use festsync_proto::{AttachmentKind, Notification, NotificationFilter};

    use super::*;
    use crate::{attachment::UploadResult, scroll_anchor::ScrollCommand};

    const ME: UserId = 1;
    const FRIEND: UserId = 2;

    /// Clock that only moves when told to.
    #[derive(Clone)]
    struct ManualEnv {
        now: Arc<Mutex<Instant>>,
    }

    impl ManualEnv {
        fn new() -> Self {
            Self { now: Arc::new(Mutex::new(Instant::now())) }
        }

        fn advance(&self, by: Duration) -> Instant {
            let mut now = self.now.lock().unwrap();
            *now += by;
            *now
        }
    }

    impl Environment for ManualEnv {
        type Instant = Instant;

        fn now(&self) -> Instant {
            *self.now.lock().unwrap()
        }

        fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            self.advance(duration);
            std::future::ready(())
        }
    }

    fn client() -> (SyncClient<ManualEnv>, ManualEnv) {
        let env = ManualEnv::new();
        let client =
            SyncClient::login(env.clone(), Identity::new(ME, "Me"), &SyncConfig::default());
        (client, env)
    }

    fn live_client() -> (SyncClient<ManualEnv>, ManualEnv) {
        let (mut client, env) = client();
        client.handle(ClientEvent::Connect).unwrap();
        client.handle(ClientEvent::Inbound(Inbound::Connect)).unwrap();
        (client, env)
    }

    fn msg(id: u64, conversation_id: ConversationId, sender_id: UserId, content: &str) -> Message {
        Message {
            id,
            conversation_id,
            sender_id,
            sender_name: String::new(),
            content: content.to_string(),
            attachments: Vec::new(),
            created_at: DateTime::from_timestamp(1_700_000_000 + id as i64, 0).unwrap(),
        }
    }

    fn emitted(actions: &[ClientAction]) -> Vec<&Outbound> {
        actions
            .iter()
            .filter_map(|a| match a {
                ClientAction::Emit(event) => Some(event),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn connect_opens_as_session_identity() {
        let (mut client, _env) = client();
        let actions = client.handle(ClientEvent::Connect).unwrap();
        assert_eq!(actions, vec![ClientAction::Open { identity: Identity::new(ME, "Me") }]);
        assert_eq!(client.connection_state(), ConnectionState::Connecting);

        let actions = client.handle(ClientEvent::Inbound(Inbound::Connect)).unwrap();
        assert_eq!(actions, vec![ClientAction::LiveChanged(true)]);
        assert!(client.is_live());
    }

    #[test]
    fn reconnect_rejoins_and_refetches() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::JoinConversations { conversation_ids: vec![7, 3] }).unwrap();
        client.handle(ClientEvent::OpenConversation { conversation_id: 7 }).unwrap();

        client.handle(ClientEvent::TransportClosed { reason: "wifi".to_string() }).unwrap();
        assert!(!client.is_live());

        client.handle(ClientEvent::Connect).unwrap();
        let actions = client.handle(ClientEvent::Inbound(Inbound::Connect)).unwrap();

        assert_eq!(actions[0], ClientAction::LiveChanged(true));
        assert_eq!(emitted(&actions), vec![
            &Outbound::JoinConversations { conversation_ids: vec![3, 7] },
            &Outbound::RequestHistory { conversation_id: 7, page: 1, limit: 50 },
        ]);
        assert_eq!(client.session_epoch(), 2);
    }

    #[test]
    fn offline_open_is_fetched_when_live() {
        let (mut client, _env) = client();
        let actions = client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        assert!(emitted(&actions).is_empty());

        client.handle(ClientEvent::Connect).unwrap();
        let actions = client.handle(ClientEvent::Inbound(Inbound::Connect)).unwrap();
        assert_eq!(emitted(&actions), vec![&Outbound::RequestHistory {
            conversation_id: 4,
            page: 1,
            limit: 50
        }]);
    }

    #[test]
    fn send_while_offline_is_silent_noop() {
        let (mut client, _env) = client();
        let actions = client
            .handle(ClientEvent::SendMessage { conversation_id: 4, content: "hi".to_string() })
            .unwrap();
        assert!(actions.is_empty());
        assert_eq!(client.messages().pending_sends(), 0);
    }

    #[test]
    fn history_while_offline_is_connectivity_error() {
        let (mut client, _env) = client();
        let err =
            client.handle(ClientEvent::RequestHistory { conversation_id: 4, page: 2 }).unwrap_err();
        assert!(matches!(err, ClientError::Connectivity { .. }));
    }

    #[test]
    fn send_stops_typing_first() {
        let (mut client, _env) = live_client();
        let actions = client.handle(ClientEvent::Typing { conversation_id: 4 }).unwrap();
        assert_eq!(emitted(&actions), vec![&Outbound::TypingStart { conversation_id: 4 }]);

        let actions = client
            .handle(ClientEvent::SendMessage { conversation_id: 4, content: "hi".to_string() })
            .unwrap();
        let events = emitted(&actions);
        assert_eq!(events[0], &Outbound::TypingStop { conversation_id: 4 });
        assert!(matches!(events[1], Outbound::SendMessage { .. }));
    }

    #[test]
    fn typing_goes_idle_on_tick() {
        let (mut client, env) = live_client();
        client.handle(ClientEvent::Typing { conversation_id: 4 }).unwrap();

        let deadline = client.next_deadline().unwrap();
        let now = env.advance(Duration::from_secs(1));
        assert_eq!(deadline, now);

        let actions = client.handle(ClientEvent::Tick { now }).unwrap();
        assert_eq!(emitted(&actions), vec![&Outbound::TypingStop { conversation_id: 4 }]);
    }

    #[test]
    fn echo_and_history_merge_into_one_log() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();

        let actions = client
            .handle(ClientEvent::Inbound(Inbound::NewMessage(msg(2, 4, FRIEND, "b"))))
            .unwrap();
        assert!(actions.contains(&ClientAction::LogUpdated { conversation_id: 4, inserted: 1 }));
        assert!(actions.contains(&ClientAction::Scroll {
            conversation_id: 4,
            command: ScrollCommand::JumpToBottom
        }));

        client
            .handle(ClientEvent::Inbound(Inbound::MessageHistory {
                conversation_id: 4,
                messages: vec![msg(2, 4, FRIEND, "b"), msg(1, 4, FRIEND, "a")],
            }))
            .unwrap();

        let ids: Vec<_> = client.log(4).unwrap().messages().iter().map(|m| m.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }

    #[test]
    fn scrolled_up_reader_only_follows_own_messages() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        client.handle(ClientEvent::Inbound(Inbound::NewMessage(msg(1, 4, FRIEND, "a")))).unwrap();
        client.handle(ClientEvent::Scrolled { distance_from_bottom_px: 600 }).unwrap();

        let actions = client
            .handle(ClientEvent::Inbound(Inbound::NewMessage(msg(2, 4, FRIEND, "b"))))
            .unwrap();
        assert!(!actions.iter().any(|a| matches!(a, ClientAction::Scroll { .. })));

        let actions =
            client.handle(ClientEvent::Inbound(Inbound::NewMessage(msg(3, 4, ME, "c")))).unwrap();
        assert!(actions.contains(&ClientAction::Scroll {
            conversation_id: 4,
            command: ScrollCommand::AnimateToBottom
        }));
    }

    fn scrolls(actions: &[ClientAction]) -> usize {
        actions.iter().filter(|a| matches!(a, ClientAction::Scroll { .. })).count()
    }

    #[test]
    fn older_page_with_own_message_leaves_reader_scrolled_up() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        client
            .handle(ClientEvent::Inbound(Inbound::MessageHistory {
                conversation_id: 4,
                messages: vec![msg(50, 4, FRIEND, "x"), msg(51, 4, FRIEND, "y")],
            }))
            .unwrap();
        client.handle(ClientEvent::Scrolled { distance_from_bottom_px: 2000 }).unwrap();
        client.handle(ClientEvent::RequestHistory { conversation_id: 4, page: 2 }).unwrap();

        let actions = client
            .handle(ClientEvent::Inbound(Inbound::MessageHistory {
                conversation_id: 4,
                messages: vec![msg(10, 4, ME, "mine"), msg(11, 4, FRIEND, "z")],
            }))
            .unwrap();

        assert!(actions.contains(&ClientAction::LogUpdated { conversation_id: 4, inserted: 2 }));
        assert_eq!(scrolls(&actions), 0);
    }

    #[test]
    fn page_requested_before_close_is_ignored_after_reopen() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        client
            .handle(ClientEvent::Inbound(Inbound::MessageHistory { conversation_id: 4, messages: vec![] }))
            .unwrap();
        client.handle(ClientEvent::RequestHistory { conversation_id: 4, page: 7 }).unwrap();
        client.handle(ClientEvent::CloseConversation { conversation_id: 4 }).unwrap();

        let actions = client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        assert_eq!(emitted(&actions), vec![&Outbound::RequestHistory {
            conversation_id: 4,
            page: 1,
            limit: 50
        }]);

        let actions = client
            .handle(ClientEvent::Inbound(Inbound::MessageHistory {
                conversation_id: 4,
                messages: vec![msg(20, 4, FRIEND, "old"), msg(21, 4, FRIEND, "older")],
            }))
            .unwrap();
        assert!(actions.is_empty());
        assert!(client.log(4).unwrap().is_empty());

        let actions = client
            .handle(ClientEvent::Inbound(Inbound::MessageHistory {
                conversation_id: 4,
                messages: vec![msg(90, 4, FRIEND, "latest")],
            }))
            .unwrap();
        assert!(actions.contains(&ClientAction::Scroll {
            conversation_id: 4,
            command: ScrollCommand::JumpToBottom
        }));
    }

    #[test]
    fn disconnect_forgets_abandoned_pages() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        client.handle(ClientEvent::CloseConversation { conversation_id: 4 }).unwrap();
        client.handle(ClientEvent::TransportClosed { reason: "wifi".to_string() }).unwrap();

        client.handle(ClientEvent::Connect).unwrap();
        client.handle(ClientEvent::Inbound(Inbound::Connect)).unwrap();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();

        let actions = client
            .handle(ClientEvent::Inbound(Inbound::MessageHistory {
                conversation_id: 4,
                messages: vec![msg(1, 4, FRIEND, "a")],
            }))
            .unwrap();
        assert!(actions.contains(&ClientAction::LogUpdated { conversation_id: 4, inserted: 1 }));
    }

    #[test]
    fn stalled_send_is_surfaced() {
        let (mut client, env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        client
            .handle(ClientEvent::SendMessage { conversation_id: 4, content: "hello".to_string() })
            .unwrap();

        let now = env.advance(Duration::from_millis(2500));
        let actions = client.handle(ClientEvent::Tick { now }).unwrap();
        assert!(actions.iter().any(|a| matches!(
            a,
            ClientAction::SendStalled { conversation_id: 4, content, .. } if content == "hello"
        )));
    }

    #[test]
    fn unechoed_send_is_eventually_forgotten() {
        let (mut client, env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();
        client
            .handle(ClientEvent::SendMessage { conversation_id: 4, content: "hello".to_string() })
            .unwrap();

        let now = env.advance(Duration::from_secs(3));
        client.handle(ClientEvent::Tick { now }).unwrap();
        assert_eq!(client.messages.pending_sends(), 1);

        let now = env.advance(Duration::from_secs(30));
        let actions = client.handle(ClientEvent::Tick { now }).unwrap();
        assert!(!actions.iter().any(|a| matches!(a, ClientAction::SendStalled { .. })));
        assert_eq!(client.messages.pending_sends(), 0);
    }

    #[test]
    fn attachment_send_uses_summary() {
        let (mut client, _env) = live_client();
        let bound = client
            .binder()
            .bind(4, UploadResult {
                url: "https://cdn.example/p.png".to_string(),
                file_type: "image/png".to_string(),
                file_name: "p.png".to_string(),
                file_size: 10,
            })
            .unwrap();

        let actions = client.handle(ClientEvent::SendAttachment(bound)).unwrap();
        let events = emitted(&actions);
        assert!(matches!(
            events[0],
            Outbound::SendMessageWithAttachment { content, attachment, .. }
                if content == "shared an image: p.png" && attachment.kind == AttachmentKind::Image
        ));
    }

    #[test]
    fn remote_typing_cleared_by_their_message_and_by_disconnect() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();

        let typing = Inbound::UserTyping { conversation_id: 4, user_id: FRIEND };
        let actions = client.handle(ClientEvent::Inbound(typing.clone())).unwrap();
        assert_eq!(actions, vec![ClientAction::TypingChanged {
            conversation_id: 4,
            users: vec![FRIEND]
        }]);

        client.handle(ClientEvent::Inbound(Inbound::NewMessage(msg(1, 4, FRIEND, "a")))).unwrap();
        assert!(client.typing_users(4).is_empty());

        client.handle(ClientEvent::Inbound(typing)).unwrap();
        let actions = client.handle(ClientEvent::Disconnect).unwrap();
        assert!(actions.contains(&ClientAction::TypingChanged { conversation_id: 4, users: vec![] }));
        assert!(client.typing_users(4).is_empty());
    }

    #[test]
    fn backend_error_during_connect_fails_the_cycle() {
        let (mut client, _env) = client();
        client.handle(ClientEvent::Connect).unwrap();

        let actions = client
            .handle(ClientEvent::Inbound(Inbound::Error { reason: "unknown user".to_string() }))
            .unwrap();
        assert_eq!(client.connection_state(), ConnectionState::Disconnected);
        assert!(actions.contains(&ClientAction::BackendError { reason: "unknown user".to_string() }));
    }

    #[test]
    fn notification_push_updates_feed() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::BootstrapFeed { filter: NotificationFilter::All }).unwrap();

        let notification = Notification {
            id: 9,
            recipient_id: ME,
            content: "Stage B opens".to_string(),
            kind: "announcement".to_string(),
            payload: serde_json::Value::Null,
            created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            is_read: false,
        };
        let actions = client
            .handle(ClientEvent::Inbound(Inbound::Notification { recipient_id: ME, notification }))
            .unwrap();
        assert_eq!(actions, vec![ClientAction::FeedUpdated]);
        assert_eq!(client.feed().unread_count(), 1);
    }

    #[test]
    fn reconnect_rebootstraps_feed() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::BootstrapFeed { filter: NotificationFilter::UnreadOnly }).unwrap();

        client.handle(ClientEvent::TransportClosed { reason: "drop".to_string() }).unwrap();
        client.handle(ClientEvent::Connect).unwrap();
        let actions = client.handle(ClientEvent::Inbound(Inbound::Connect)).unwrap();

        let fetches = actions
            .iter()
            .filter(|a| matches!(a, ClientAction::Feed(FeedAction::FetchPage { .. })))
            .count();
        assert_eq!(fetches, 1);
        assert_eq!(client.feed().filter(), NotificationFilter::UnreadOnly);
    }

    #[test]
    fn logout_ends_session() {
        let (mut client, _env) = live_client();
        client.handle(ClientEvent::OpenConversation { conversation_id: 4 }).unwrap();

        let actions = client.logout();
        assert!(actions.iter().any(|a| matches!(a, ClientAction::Close { .. })));
        assert!(client.log(4).is_none());
        assert!(!client.session().is_active());

        assert_eq!(client.handle(ClientEvent::Connect), Err(ClientError::SessionEnded));
        assert!(client.logout().is_empty());
    }
}
