//! Per-conversation message logs.
//!
//! Two independent paths deliver messages: paged history answers and live
//! pushes. Either may arrive first, either may repeat, and both may carry the
//! same logical message as separately constructed values. Every delivery goes
//! through one merge so the log stays
//!
//! - deduplicated by message id, and
//! - sorted by `(created_at, id)`,
//!
//! no matter the interleaving.
//!
//! Logs exist only for mounted (open) conversations. Closing a conversation
//! drops its log; deliveries for conversations that are not mounted are
//! discarded as stale. History requests still unanswered at close are
//! abandoned: the channel answers in request order, so that many of the next
//! pages for the conversation are dropped even if it was reopened since.

use std::{
    collections::{BTreeMap, BTreeSet, HashSet},
    time::Duration,
};

use festsync_core::{MonotonicInstant, SyncConfig};
use festsync_proto::{Attachment, ConversationId, Message, MessageId, MessageType, Outbound, UserId};

use crate::error::ClientError;

/// Result of merging a batch into a log.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Messages that were not in the log before.
    pub inserted: usize,
    /// Already-known messages that gained a field they were missing.
    pub enriched: usize,
    /// The log had no messages before this merge.
    pub was_empty: bool,
    /// Authors of the inserted messages, in arrival order.
    pub inserted_senders: Vec<UserId>,
    /// Authors of the inserted messages that sort after the previous newest
    /// entry. An older history page leaves this empty.
    pub tail_senders: Vec<UserId>,
}

impl MergeOutcome {
    /// True if the merge changed what a reader would see.
    pub fn changed(&self) -> bool {
        self.inserted > 0 || self.enriched > 0
    }

    /// True if any inserted message was written by `user_id`.
    pub fn includes_sender(&self, user_id: UserId) -> bool {
        self.inserted_senders.contains(&user_id)
    }

    /// True if `user_id` wrote a message that is now newer than anything the
    /// log held before.
    pub fn tail_includes_sender(&self, user_id: UserId) -> bool {
        self.tail_senders.contains(&user_id)
    }
}

/// Sorted, deduplicated log for one conversation.
#[derive(Debug, Clone, Default)]
pub struct ConversationLog {
    messages: Vec<Message>,
    ids: HashSet<MessageId>,
}

impl ConversationLog {
    /// Messages in display order.
    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// Number of messages.
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// True if nothing has been merged yet.
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// Check whether a message id is present.
    pub fn contains(&self, id: MessageId) -> bool {
        self.ids.contains(&id)
    }

    /// Latest message by sort order.
    pub fn newest(&self) -> Option<&Message> {
        self.messages.last()
    }

    /// Merge a batch of messages.
    ///
    /// Unknown ids are inserted. A known id never creates a second entry,
    /// but may fill in a sender name or attachments the stored copy lacks.
    pub fn merge(&mut self, incoming: impl IntoIterator<Item = Message>) -> MergeOutcome {
        let mut outcome = MergeOutcome { was_empty: self.is_empty(), ..MergeOutcome::default() };
        let previous_newest = self.newest().map(Message::sort_key);

        for message in incoming {
            if self.ids.contains(&message.id) {
                if self.enrich(message) {
                    outcome.enriched += 1;
                }
                continue;
            }

            self.ids.insert(message.id);
            outcome.inserted += 1;
            outcome.inserted_senders.push(message.sender_id);
            if previous_newest.is_none_or(|newest| message.sort_key() > newest) {
                outcome.tail_senders.push(message.sender_id);
            }
            self.messages.push(message);
        }

        if outcome.inserted > 0 {
            self.messages.sort_by_key(Message::sort_key);
        }

        outcome
    }

    fn enrich(&mut self, incoming: Message) -> bool {
        let Some(existing) = self.messages.iter_mut().find(|m| m.id == incoming.id) else {
            return false;
        };

        let mut changed = false;
        if existing.sender_name.is_empty() && !incoming.sender_name.is_empty() {
            existing.sender_name = incoming.sender_name;
            changed = true;
        }
        if existing.attachments.is_empty() && !incoming.attachments.is_empty() {
            existing.attachments = incoming.attachments;
            changed = true;
        }
        changed
    }
}

/// An outgoing message whose echo has been overdue for the stall threshold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StalledSend {
    /// Conversation it was sent to.
    pub conversation_id: ConversationId,
    /// Body as sent.
    pub content: String,
    /// Time since the send.
    pub waited: Duration,
}

#[derive(Debug, Clone)]
struct PendingSend<I> {
    conversation_id: ConversationId,
    content: String,
    sent_at: I,
    reported: bool,
}

/// Message logs plus join and send bookkeeping.
#[derive(Debug, Clone)]
pub struct MessageStore<I: MonotonicInstant> {
    local_user: UserId,
    local_name: String,
    history_page_size: u32,
    stalled_after: Duration,
    pending_expiry: Duration,
    logs: BTreeMap<ConversationId, ConversationLog>,
    joined: BTreeSet<ConversationId>,
    pending: Vec<PendingSend<I>>,
    /// Unanswered history requests per conversation, current mount.
    history_in_flight: BTreeMap<ConversationId, u32>,
    /// Unanswered history requests issued before the last close.
    history_abandoned: BTreeMap<ConversationId, u32>,
}

impl<I: MonotonicInstant> MessageStore<I> {
    /// Create an empty store for the local user.
    pub fn new(local_user: UserId, local_name: impl Into<String>, config: &SyncConfig) -> Self {
        Self {
            local_user,
            local_name: local_name.into(),
            history_page_size: config.history_page_size,
            stalled_after: config.stalled_send_after,
            pending_expiry: config.pending_send_expiry,
            logs: BTreeMap::new(),
            joined: BTreeSet::new(),
            pending: Vec::new(),
            history_in_flight: BTreeMap::new(),
            history_abandoned: BTreeMap::new(),
        }
    }

    /// Mount a conversation. Returns false if it was already mounted.
    pub fn open(&mut self, conversation_id: ConversationId) -> bool {
        if self.logs.contains_key(&conversation_id) {
            return false;
        }
        tracing::debug!(conversation_id, "conversation mounted");
        self.logs.insert(conversation_id, ConversationLog::default());
        true
    }

    /// Unmount a conversation and drop its log and pending sends.
    ///
    /// History requests it still awaits are abandoned.
    pub fn close(&mut self, conversation_id: ConversationId) -> bool {
        self.pending.retain(|p| p.conversation_id != conversation_id);
        if let Some(outstanding) = self.history_in_flight.remove(&conversation_id) {
            *self.history_abandoned.entry(conversation_id).or_default() += outstanding;
        }
        let removed = self.logs.remove(&conversation_id).is_some();
        if removed {
            tracing::debug!(conversation_id, "conversation unmounted");
        }
        removed
    }

    /// Check whether a conversation is mounted.
    pub fn is_open(&self, conversation_id: ConversationId) -> bool {
        self.logs.contains_key(&conversation_id)
    }

    /// Mounted conversations, ascending.
    pub fn mounted(&self) -> impl Iterator<Item = ConversationId> + '_ {
        self.logs.keys().copied()
    }

    /// Log of a mounted conversation.
    pub fn log(&self, conversation_id: ConversationId) -> Option<&ConversationLog> {
        self.logs.get(&conversation_id)
    }

    /// Conversations the caller asked to join, ascending.
    pub fn joined(&self) -> &BTreeSet<ConversationId> {
        &self.joined
    }

    /// Record a join request.
    ///
    /// The set is remembered either way so it can be replayed after every
    /// reconnect. The event itself is only produced while `live`.
    pub fn join(&mut self, conversation_ids: &[ConversationId], live: bool) -> Option<Outbound> {
        self.joined.extend(conversation_ids.iter().copied());
        if !live {
            tracing::debug!(count = conversation_ids.len(), "join deferred until live");
            return None;
        }
        if conversation_ids.is_empty() {
            return None;
        }
        Some(Outbound::JoinConversations { conversation_ids: conversation_ids.to_vec() })
    }

    /// Join event for everything joined so far, for replay after reconnect.
    pub fn rejoin(&self) -> Option<Outbound> {
        if self.joined.is_empty() {
            return None;
        }
        Some(Outbound::JoinConversations { conversation_ids: self.joined.iter().copied().collect() })
    }

    /// Build a history request and mount the conversation if needed.
    ///
    /// `limit` falls back to the configured page size.
    ///
    /// # Errors
    ///
    /// - `ClientError::Connectivity` if the channel is not live
    pub fn request_history(
        &mut self,
        conversation_id: ConversationId,
        page: u32,
        limit: Option<u32>,
        live: bool,
    ) -> Result<Outbound, ClientError> {
        if !live {
            return Err(ClientError::Connectivity { operation: "request_history" });
        }
        self.open(conversation_id);
        *self.history_in_flight.entry(conversation_id).or_default() += 1;
        Ok(Outbound::RequestHistory {
            conversation_id,
            page: page.max(1),
            limit: limit.unwrap_or(self.history_page_size),
        })
    }

    /// Build a send event and start watching for its echo.
    ///
    /// The caller checks liveness first. The message does not enter the log
    /// here; it appears when the backend pushes it back.
    ///
    /// # Errors
    ///
    /// - `ClientError::EmptyMessage` if there is no text and no attachment
    pub fn send(
        &mut self,
        conversation_id: ConversationId,
        content: String,
        attachment: Option<Attachment>,
        now: I,
    ) -> Result<Outbound, ClientError> {
        if content.trim().is_empty() && attachment.is_none() {
            return Err(ClientError::EmptyMessage);
        }

        self.pending.push(PendingSend {
            conversation_id,
            content: content.clone(),
            sent_at: now,
            reported: false,
        });

        Ok(match attachment {
            Some(attachment) => Outbound::SendMessageWithAttachment {
                conversation_id,
                message_type: MessageType::from(attachment.kind),
                content,
                attachment,
            },
            None => Outbound::SendMessage { conversation_id, message_type: MessageType::Text, content },
        })
    }

    /// Merge a live push.
    ///
    /// Returns `None` if the conversation is not mounted.
    pub fn apply_push(&mut self, mut message: Message) -> Option<MergeOutcome> {
        let conversation_id = message.conversation_id;

        if message.sender_id == self.local_user {
            self.resolve_echo(&message);
        }

        let Some(log) = self.logs.get_mut(&conversation_id) else {
            tracing::trace!(conversation_id, message_id = message.id, "push for unmounted conversation");
            return None;
        };

        backfill_sender_name(&mut message, self.local_user, &self.local_name);
        Some(log.merge([message]))
    }

    /// Merge a history page.
    ///
    /// Returns `None` if the conversation is not mounted or the page answers
    /// a request made before the conversation was last closed. Messages
    /// tagged with another conversation are skipped.
    pub fn apply_history(
        &mut self,
        conversation_id: ConversationId,
        messages: Vec<Message>,
    ) -> Option<MergeOutcome> {
        if take_one(&mut self.history_abandoned, conversation_id) {
            tracing::debug!(conversation_id, count = messages.len(), "dropping abandoned history page");
            return None;
        }
        take_one(&mut self.history_in_flight, conversation_id);

        let Some(log) = self.logs.get_mut(&conversation_id) else {
            tracing::debug!(conversation_id, count = messages.len(), "dropping stale history page");
            return None;
        };

        let local_user = self.local_user;
        let local_name = &self.local_name;
        let batch = messages.into_iter().filter_map(|mut message| {
            if message.conversation_id != conversation_id {
                tracing::warn!(
                    conversation_id,
                    tagged = message.conversation_id,
                    message_id = message.id,
                    "history entry for another conversation"
                );
                return None;
            }
            backfill_sender_name(&mut message, local_user, local_name);
            Some(message)
        });

        Some(log.merge(batch))
    }

    /// Report sends whose echo is overdue. Each send is reported once, and
    /// forgotten once it reaches the expiry age.
    pub fn tick(&mut self, now: I) -> Vec<StalledSend> {
        let threshold = self.stalled_after;
        let stalled: Vec<StalledSend> = self
            .pending
            .iter_mut()
            .filter(|p| !p.reported && now - p.sent_at >= threshold)
            .map(|p| {
                p.reported = true;
                StalledSend {
                    conversation_id: p.conversation_id,
                    content: p.content.clone(),
                    waited: now - p.sent_at,
                }
            })
            .collect();

        let expiry = self.pending_expiry;
        self.pending.retain(|p| {
            let expired = p.reported && now - p.sent_at >= expiry;
            if expired {
                tracing::warn!(conversation_id = p.conversation_id, "giving up on unechoed send");
            }
            !expired
        });

        stalled
    }

    /// Next instant at which `tick` will report or expire something.
    pub fn next_deadline(&self) -> Option<I> {
        self.pending
            .iter()
            .map(|p| {
                let after = if p.reported { self.pending_expiry } else { self.stalled_after };
                p.sent_at + after
            })
            .min()
    }

    /// Number of sends still waiting for their echo.
    pub fn pending_sends(&self) -> usize {
        self.pending.len()
    }

    /// History requests sent for the current mount and not yet answered.
    pub fn history_in_flight(&self, conversation_id: ConversationId) -> u32 {
        self.history_in_flight.get(&conversation_id).copied().unwrap_or_default()
    }

    /// Forget outstanding history requests. Called when the channel goes
    /// away, since its answers will never arrive.
    pub fn forget_history_requests(&mut self) {
        self.history_in_flight.clear();
        self.history_abandoned.clear();
    }

    /// Drop every log, join and pending send.
    pub fn clear(&mut self) {
        self.logs.clear();
        self.joined.clear();
        self.pending.clear();
        self.forget_history_requests();
    }

    fn resolve_echo(&mut self, message: &Message) {
        let position = self
            .pending
            .iter()
            .position(|p| p.conversation_id == message.conversation_id && p.content == message.content);

        if let Some(index) = position {
            let pending = self.pending.remove(index);
            if pending.reported {
                tracing::info!(
                    conversation_id = message.conversation_id,
                    message_id = message.id,
                    "stalled send delivered"
                );
            }
        }
    }
}

/// Decrement a per-conversation counter. Returns false if it was zero.
fn take_one(counts: &mut BTreeMap<ConversationId, u32>, conversation_id: ConversationId) -> bool {
    let Some(count) = counts.get_mut(&conversation_id) else {
        return false;
    };
    *count -= 1;
    if *count == 0 {
        counts.remove(&conversation_id);
    }
    true
}

fn backfill_sender_name(message: &mut Message, local_user: UserId, local_name: &str) {
    if message.sender_name.is_empty() && message.sender_id == local_user {
        message.sender_name = local_name.to_string();
    }
}
