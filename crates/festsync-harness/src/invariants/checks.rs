//! Checks over a [`SystemSnapshot`].
//!
//! Each check reports the first offending client and conversation.

use std::collections::HashSet;

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// Every conversation log is strictly ordered by `(created_at, id)`.
pub struct LogsSorted;

impl Invariant for LogsSorted {
    fn name(&self) -> &'static str {
        "logs_sorted"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (conversation_id, keys) in &client.logs {
                if let Some(pair) = keys.windows(2).find(|w| w[0] >= w[1]) {
                    return Err(Violation::new(
                        self.name(),
                        format!(
                            "user {} conversation {}: {:?} not before {:?}",
                            client.user_id, conversation_id, pair[0], pair[1]
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A message id appears at most once per log.
pub struct UniqueMessageIds;

impl Invariant for UniqueMessageIds {
    fn name(&self) -> &'static str {
        "unique_message_ids"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (conversation_id, keys) in &client.logs {
                let mut seen = HashSet::new();
                if let Some((_, id)) = keys.iter().find(|(_, id)| !seen.insert(*id)) {
                    return Err(Violation::new(
                        self.name(),
                        format!(
                            "user {} conversation {}: message {} shown twice",
                            client.user_id, conversation_id, id
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Clients only show messages the backend stored.
///
/// Skipped when the snapshot carries no server view.
pub struct NoPhantomMessages;

impl Invariant for NoPhantomMessages {
    fn name(&self) -> &'static str {
        "no_phantom_messages"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        if state.server_history.is_empty() {
            return Ok(());
        }

        for client in &state.clients {
            for (conversation_id, keys) in &client.logs {
                let stored: HashSet<_> = state
                    .server_history
                    .get(conversation_id)
                    .map(|ids| ids.iter().copied().collect())
                    .unwrap_or_default();
                if let Some((_, id)) = keys.iter().find(|(_, id)| !stored.contains(id)) {
                    return Err(Violation::new(
                        self.name(),
                        format!(
                            "user {} conversation {}: message {} unknown to backend",
                            client.user_id, conversation_id, id
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// A notification id appears at most once per feed.
pub struct UniqueNotifications;

impl Invariant for UniqueNotifications {
    fn name(&self) -> &'static str {
        "unique_notifications"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            let mut seen = HashSet::new();
            if let Some(id) = client.feed.ids.iter().find(|id| !seen.insert(**id)) {
                return Err(Violation::new(
                    self.name(),
                    format!("user {}: notification {} shown twice", client.user_id, id),
                ));
            }
        }
        Ok(())
    }
}

/// The badge agrees with the feed.
///
/// Under the `all` filter with no page in flight the badge equals the
/// unread items shown. Under `unread_only` no read item is shown.
pub struct UnreadBadgeMatches;

impl Invariant for UnreadBadgeMatches {
    fn name(&self) -> &'static str {
        "unread_badge_matches"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        use festsync_proto::NotificationFilter;

        for client in &state.clients {
            let feed = &client.feed;
            match feed.filter {
                NotificationFilter::All if !feed.loading => {
                    if feed.unread_count != feed.shown_unread() {
                        return Err(Violation::new(
                            self.name(),
                            format!(
                                "user {}: badge {} but {} unread shown",
                                client.user_id,
                                feed.unread_count,
                                feed.shown_unread()
                            ),
                        ));
                    }
                },
                NotificationFilter::UnreadOnly if feed.read > 0 => {
                    return Err(Violation::new(
                        self.name(),
                        format!(
                            "user {}: {} read notifications in unread-only view",
                            client.user_id, feed.read
                        ),
                    ));
                },
                NotificationFilter::All | NotificationFilter::UnreadOnly => {},
            }
        }
        Ok(())
    }
}

/// The local user never shows up as a remote typer.
pub struct LocalUserNeverTyping;

impl Invariant for LocalUserNeverTyping {
    fn name(&self) -> &'static str {
        "local_user_never_typing"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for (conversation_id, users) in &client.typing {
                if users.contains(&client.user_id) {
                    return Err(Violation::new(
                        self.name(),
                        format!(
                            "user {} sees themselves typing in conversation {}",
                            client.user_id, conversation_id
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}

/// Once traffic has settled, every live client holds the newest page of
/// each conversation it both joined and mounted.
///
/// Only meaningful at quiescent points; see
/// [`super::InvariantRegistry::quiescent`].
pub struct LogConvergence;

impl Invariant for LogConvergence {
    fn name(&self) -> &'static str {
        "log_convergence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in state.clients.iter().filter(|c| c.live) {
            for (conversation_id, keys) in &client.logs {
                if !client.joined.contains(conversation_id) {
                    continue;
                }
                let Some(stored) = state.server_history.get(conversation_id) else {
                    continue;
                };

                let held: HashSet<_> = keys.iter().map(|(_, id)| *id).collect();
                let window = stored.len().saturating_sub(state.history_page_size);
                if let Some(missing) = stored[window..].iter().find(|id| !held.contains(id)) {
                    return Err(Violation::new(
                        self.name(),
                        format!(
                            "user {} conversation {}: missing recent message {}",
                            client.user_id, conversation_id, missing
                        ),
                    ));
                }
            }
        }
        Ok(())
    }
}
