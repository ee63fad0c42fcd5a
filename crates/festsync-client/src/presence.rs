//! Typing presence.
//!
//! Tracks two things per conversation:
//!
//! - whether the local user is in a typing burst. The first keystroke of a
//!   burst emits `typing_start`; `typing_stop` follows after the idle window
//!   passes without a keystroke, or immediately when a message is sent.
//! - which remote users are typing. Entries are renewed by `user_typing`,
//!   removed by `user_stopped_typing`, and expire on their own after the
//!   staleness window, so a lost stop event never leaves a user "typing"
//!   forever.
//!
//! Presence is ephemeral: nothing survives a disconnect.

use std::{collections::BTreeMap, time::Duration};

use festsync_core::{MonotonicInstant, SyncConfig};
use festsync_proto::{ConversationId, Outbound, UserId};

/// Result of one maintenance pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PresenceTick {
    /// `typing_stop` events for bursts that went idle.
    pub outbound: Vec<Outbound>,
    /// Conversations whose remote typing set shrank.
    pub changed: Vec<ConversationId>,
}

/// Local and remote typing state.
#[derive(Debug, Clone)]
pub struct PresenceTracker<I: MonotonicInstant> {
    local_user: UserId,
    idle: Duration,
    staleness: Duration,
    /// Last keystroke per conversation with an open local burst.
    local: BTreeMap<ConversationId, I>,
    /// Last renewal per remote typer.
    remote: BTreeMap<ConversationId, BTreeMap<UserId, I>>,
}

impl<I: MonotonicInstant> PresenceTracker<I> {
    /// Create a tracker for the local user.
    pub fn new(local_user: UserId, config: &SyncConfig) -> Self {
        Self {
            local_user,
            idle: config.typing_idle,
            staleness: config.typing_staleness,
            local: BTreeMap::new(),
            remote: BTreeMap::new(),
        }
    }

    /// Local keystroke. Returns `typing_start` on the first keystroke of a
    /// burst.
    pub fn notify_typing(&mut self, conversation_id: ConversationId, now: I) -> Option<Outbound> {
        let first = self.local.insert(conversation_id, now).is_none();
        first.then_some(Outbound::TypingStart { conversation_id })
    }

    /// End a local burst early, e.g. because the message was sent.
    pub fn stop_typing(&mut self, conversation_id: ConversationId) -> Option<Outbound> {
        self.local
            .remove(&conversation_id)
            .map(|_| Outbound::TypingStop { conversation_id })
    }

    /// Check whether the local user is mid-burst.
    pub fn is_local_typing(&self, conversation_id: ConversationId) -> bool {
        self.local.contains_key(&conversation_id)
    }

    /// Remote `user_typing`. Returns true if the user was not already shown.
    pub fn handle_remote_typing(
        &mut self,
        conversation_id: ConversationId,
        user_id: UserId,
        now: I,
    ) -> bool {
        if user_id == self.local_user {
            return false;
        }
        self.remote.entry(conversation_id).or_default().insert(user_id, now).is_none()
    }

    /// Remote `user_stopped_typing`. Returns true if the user was shown.
    pub fn handle_remote_stopped(&mut self, conversation_id: ConversationId, user_id: UserId) -> bool {
        let Some(typers) = self.remote.get_mut(&conversation_id) else {
            return false;
        };
        let removed = typers.remove(&user_id).is_some();
        if typers.is_empty() {
            self.remote.remove(&conversation_id);
        }
        removed
    }

    /// Remote users currently typing in a conversation, ascending.
    pub fn typing_users(&self, conversation_id: ConversationId) -> Vec<UserId> {
        self.remote
            .get(&conversation_id)
            .map(|typers| typers.keys().copied().collect())
            .unwrap_or_default()
    }

    /// Check whether a remote user is shown as typing.
    pub fn is_typing(&self, conversation_id: ConversationId, user_id: UserId) -> bool {
        self.remote.get(&conversation_id).is_some_and(|typers| typers.contains_key(&user_id))
    }

    /// Close idle local bursts and expire stale remote entries.
    pub fn tick(&mut self, now: I) -> PresenceTick {
        let idle = self.idle;
        let idle_bursts: Vec<ConversationId> = self
            .local
            .iter()
            .filter(|&(_, &last)| now - last >= idle)
            .map(|(&conversation_id, _)| conversation_id)
            .collect();

        let mut outbound = Vec::with_capacity(idle_bursts.len());
        for conversation_id in idle_bursts {
            self.local.remove(&conversation_id);
            outbound.push(Outbound::TypingStop { conversation_id });
        }

        let staleness = self.staleness;
        let mut changed = Vec::new();
        self.remote.retain(|&conversation_id, typers| {
            let before = typers.len();
            typers.retain(|_, last| now - *last < staleness);
            if typers.len() != before {
                tracing::debug!(conversation_id, expired = before - typers.len(), "typing expired");
                changed.push(conversation_id);
            }
            !typers.is_empty()
        });

        PresenceTick { outbound, changed }
    }

    /// Next instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        let local = self.local.values().map(|&last| last + self.idle);
        let remote = self.remote.values().flat_map(|t| t.values()).map(|&last| last + self.staleness);
        local.chain(remote).min()
    }

    /// Forget one conversation. Returns `typing_stop` if a local burst was
    /// open.
    pub fn forget(&mut self, conversation_id: ConversationId) -> Option<Outbound> {
        self.remote.remove(&conversation_id);
        self.stop_typing(conversation_id)
    }

    /// Drop all state. Returns the conversations that had remote typers.
    pub fn clear(&mut self) -> Vec<ConversationId> {
        self.local.clear();
        let conversations = self.remote.keys().copied().collect();
        self.remote.clear();
        conversations
    }
}
