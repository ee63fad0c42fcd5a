//! Scroll anchoring for the active conversation view.
//!
//! Decides, each time the visible log grows, whether the view should follow
//! the newest message. The reader's position wins: if they scrolled up to
//! read older messages, new arrivals from others do not yank them down.

use festsync_proto::{ConversationId, UserId};

use crate::message_store::MergeOutcome;

/// How the view should move after the log grew.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollCommand {
    /// Jump without animation (first population of a view).
    JumpToBottom,
    /// Smoothly scroll to the newest message.
    AnimateToBottom,
}

/// "At bottom" tracking for one active conversation view.
#[derive(Debug, Clone)]
pub struct ScrollAnchor {
    threshold_px: u32,
    active: Option<ConversationId>,
    at_bottom: bool,
    populated: bool,
}

impl ScrollAnchor {
    /// Create an anchor with the given "at bottom" tolerance.
    pub fn new(threshold_px: u32) -> Self {
        Self { threshold_px, active: None, at_bottom: true, populated: false }
    }

    /// Conversation currently on screen.
    pub fn active(&self) -> Option<ConversationId> {
        self.active
    }

    /// Whether the reader is within the threshold of the newest message.
    pub fn is_at_bottom(&self) -> bool {
        self.at_bottom
    }

    /// Put a conversation on screen.
    ///
    /// A view that already has messages starts at the bottom.
    pub fn activate(
        &mut self,
        conversation_id: ConversationId,
        existing_messages: usize,
    ) -> Option<ScrollCommand> {
        self.active = Some(conversation_id);
        self.at_bottom = true;
        self.populated = existing_messages > 0;
        self.populated.then_some(ScrollCommand::JumpToBottom)
    }

    /// Take a conversation off screen. Ignored if it is not the active one.
    pub fn deactivate(&mut self, conversation_id: ConversationId) {
        if self.active == Some(conversation_id) {
            self.active = None;
            self.populated = false;
        }
    }

    /// Reader scrolled; `distance_px` is the gap to the bottom edge.
    pub fn on_scroll(&mut self, distance_px: u32) {
        self.at_bottom = distance_px <= self.threshold_px;
    }

    /// The log of `conversation_id` grew.
    ///
    /// - first population: jump without animation
    /// - own message newer than the previous tail: always follow
    /// - anyone else's: follow only if the reader is at the bottom
    pub fn on_log_grew(
        &mut self,
        conversation_id: ConversationId,
        outcome: &MergeOutcome,
        local_user: UserId,
    ) -> Option<ScrollCommand> {
        if self.active != Some(conversation_id) || outcome.inserted == 0 {
            return None;
        }

        if !self.populated {
            self.populated = true;
            self.at_bottom = true;
            return Some(ScrollCommand::JumpToBottom);
        }

        if self.at_bottom || outcome.tail_includes_sender(local_user) {
            self.at_bottom = true;
            return Some(ScrollCommand::AnimateToBottom);
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ME: UserId = 1;
    const FRIEND: UserId = 2;

    fn grew(senders: &[UserId]) -> MergeOutcome {
        MergeOutcome {
            inserted: senders.len(),
            enriched: 0,
            was_empty: false,
            inserted_senders: senders.to_vec(),
            tail_senders: senders.to_vec(),
        }
    }

    /// Growth that landed entirely above the previous newest message.
    fn older(senders: &[UserId]) -> MergeOutcome {
        MergeOutcome { tail_senders: Vec::new(), ..grew(senders) }
    }

    fn anchor_on(conversation_id: ConversationId) -> ScrollAnchor {
        let mut anchor = ScrollAnchor::new(48);
        anchor.activate(conversation_id, 0);
        anchor
    }

    #[test]
    fn first_population_jumps() {
        let mut anchor = anchor_on(3);
        assert_eq!(anchor.on_log_grew(3, &grew(&[FRIEND; 3]), ME), Some(ScrollCommand::JumpToBottom));
        assert_eq!(anchor.on_log_grew(3, &grew(&[FRIEND]), ME), Some(ScrollCommand::AnimateToBottom));
    }

    #[test]
    fn activating_populated_view_jumps() {
        let mut anchor = ScrollAnchor::new(48);
        assert_eq!(anchor.activate(3, 10), Some(ScrollCommand::JumpToBottom));
        assert_eq!(anchor.on_log_grew(3, &grew(&[FRIEND]), ME), Some(ScrollCommand::AnimateToBottom));
    }

    #[test]
    fn reader_scrolled_up_is_not_disturbed() {
        let mut anchor = anchor_on(3);
        anchor.on_log_grew(3, &grew(&[FRIEND]), ME);

        anchor.on_scroll(400);
        assert!(!anchor.is_at_bottom());
        assert_eq!(anchor.on_log_grew(3, &grew(&[FRIEND]), ME), None);
        assert!(!anchor.is_at_bottom());
    }

    #[test]
    fn own_message_always_follows() {
        let mut anchor = anchor_on(3);
        anchor.on_log_grew(3, &grew(&[FRIEND]), ME);
        anchor.on_scroll(400);

        assert_eq!(anchor.on_log_grew(3, &grew(&[ME]), ME), Some(ScrollCommand::AnimateToBottom));
        assert!(anchor.is_at_bottom());
    }

    #[test]
    fn older_page_with_own_message_keeps_reader_in_place() {
        let mut anchor = anchor_on(4);
        anchor.on_log_grew(4, &grew(&[FRIEND, FRIEND]), ME);
        anchor.on_scroll(2000);

        assert_eq!(anchor.on_log_grew(4, &older(&[ME, FRIEND]), ME), None);
        assert!(!anchor.is_at_bottom());
    }

    #[test]
    fn threshold_is_inclusive() {
        let mut anchor = anchor_on(3);
        anchor.on_scroll(48);
        assert!(anchor.is_at_bottom());
        anchor.on_scroll(49);
        assert!(!anchor.is_at_bottom());
    }

    #[test]
    fn inactive_or_unchanged_logs_are_ignored() {
        let mut anchor = anchor_on(3);
        assert_eq!(anchor.on_log_grew(4, &grew(&[FRIEND]), ME), None);
        assert_eq!(anchor.on_log_grew(3, &grew(&[]), ME), None);

        anchor.deactivate(3);
        assert_eq!(anchor.on_log_grew(3, &grew(&[FRIEND]), ME), None);
        assert!(anchor.active().is_none());
    }
}
