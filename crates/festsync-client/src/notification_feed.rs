//! Paginated notification feed.
//!
//! The feed is fed from two places: pages fetched from the REST service and
//! live pushes on the channel. Fetches are expressed as [`FeedAction`]s with
//! a request id; completions come back through [`NotificationFeed::handle_page`]
//! and [`NotificationFeed::handle_unread_count`]. A completion whose id is not
//! the one currently awaited is stale (the filter changed, or the feed was
//! re-bootstrapped, cleared or marked read) and is discarded.
//!
//! # Unread count
//!
//! Under [`NotificationFilter::All`] the unread count is derived from the
//! fetched items. Under [`NotificationFilter::UnreadOnly`] it comes from a
//! separate count query, because the visible items are only the first page
//! of unread ones. Pushes and read operations adjust it locally in both
//! modes. It never goes below zero.
//!
//! Read operations are optimistic: local state changes first and the server
//! call is fire-and-forget. A failed call is logged, not rolled back.

use festsync_proto::{Notification, NotificationFilter, NotificationId, NotificationQuery, UserId};

/// Correlates a fetch with its completion.
pub type RequestId = u64;

/// Work the feed asks the caller to perform against the notification
/// service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedAction {
    /// Fetch one page; answer with `handle_page`.
    FetchPage {
        /// Completion correlation
        request_id: RequestId,
        /// Query to send
        query: NotificationQuery,
    },

    /// Count all unread notifications; answer with `handle_unread_count`.
    CountUnread {
        /// Completion correlation
        request_id: RequestId,
        /// Whose notifications
        user_id: UserId,
    },

    /// Mark one notification read on the server.
    MarkRead {
        /// Owner
        user_id: UserId,
        /// Notification to mark
        notification_id: NotificationId,
    },

    /// Mark every notification read on the server.
    MarkAllRead {
        /// Owner
        user_id: UserId,
    },

    /// Delete every notification on the server.
    ClearAll {
        /// Owner
        user_id: UserId,
    },
}

/// What an awaited page fetch was for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FetchKind {
    Bootstrap,
    LoadMore,
}

#[derive(Debug, Clone, Copy)]
struct InFlight {
    request_id: RequestId,
    kind: FetchKind,
    page: u32,
}

/// In-memory notification feed for one user.
#[derive(Debug, Clone)]
pub struct NotificationFeed {
    user_id: UserId,
    page_size: u32,
    filter: NotificationFilter,
    items: Vec<Notification>,
    /// Highest page merged so far. 0 before the first page lands.
    page: u32,
    has_more: bool,
    unread_count: u64,
    bootstrapped: bool,
    page_in_flight: Option<InFlight>,
    count_in_flight: Option<RequestId>,
    next_request_id: RequestId,
}

impl NotificationFeed {
    /// Create an empty feed. Nothing is fetched until `bootstrap`.
    pub fn new(user_id: UserId, page_size: u32) -> Self {
        Self {
            user_id,
            page_size: page_size.max(1),
            filter: NotificationFilter::All,
            items: Vec::new(),
            page: 0,
            has_more: false,
            unread_count: 0,
            bootstrapped: false,
            page_in_flight: None,
            count_in_flight: None,
            next_request_id: 1,
        }
    }

    /// Items in display order (newest first).
    pub fn items(&self) -> &[Notification] {
        &self.items
    }

    /// Active filter.
    pub fn filter(&self) -> NotificationFilter {
        self.filter
    }

    /// Highest page loaded.
    pub fn page(&self) -> u32 {
        self.page
    }

    /// Whether `load_more` can fetch another page.
    pub fn has_more(&self) -> bool {
        self.has_more
    }

    /// Badge count.
    pub fn unread_count(&self) -> u64 {
        self.unread_count
    }

    /// True while a page fetch is awaited.
    pub fn is_loading(&self) -> bool {
        self.page_in_flight.is_some()
    }

    /// True once `bootstrap` has been called.
    pub fn is_bootstrapped(&self) -> bool {
        self.bootstrapped
    }

    /// Load page 1 under `filter`, replacing the feed.
    ///
    /// Any fetch still in flight becomes stale.
    pub fn bootstrap(&mut self, filter: NotificationFilter) -> Vec<FeedAction> {
        if filter != self.filter {
            tracing::debug!(from = ?self.filter, to = ?filter, "notification filter changed");
        }

        self.filter = filter;
        self.bootstrapped = true;
        self.items.clear();
        self.page = 0;
        self.has_more = false;

        let request_id = self.allocate_request_id();
        self.page_in_flight = Some(InFlight { request_id, kind: FetchKind::Bootstrap, page: 1 });

        let mut actions = vec![FeedAction::FetchPage {
            request_id,
            query: NotificationQuery::new(self.user_id, filter, 1, self.page_size),
        }];

        self.count_in_flight = None;
        if filter == NotificationFilter::UnreadOnly {
            let request_id = self.allocate_request_id();
            self.count_in_flight = Some(request_id);
            actions.push(FeedAction::CountUnread { request_id, user_id: self.user_id });
        }

        actions
    }

    /// Fetch the next page.
    ///
    /// A no-op while a fetch is awaited or once the last page was reached.
    pub fn load_more(&mut self) -> Vec<FeedAction> {
        if let Some(in_flight) = self.page_in_flight {
            tracing::debug!(request_id = in_flight.request_id, "load_more ignored, fetch in flight");
            return vec![];
        }
        if !self.has_more {
            return vec![];
        }

        let page = self.page + 1;
        let request_id = self.allocate_request_id();
        self.page_in_flight = Some(InFlight { request_id, kind: FetchKind::LoadMore, page });

        vec![FeedAction::FetchPage {
            request_id,
            query: NotificationQuery::new(self.user_id, self.filter, page, self.page_size),
        }]
    }

    /// Page fetch finished. Returns true if the feed changed.
    ///
    /// A failure resets the feed to empty with no further pages.
    pub fn handle_page(
        &mut self,
        request_id: RequestId,
        result: Result<Vec<Notification>, String>,
    ) -> bool {
        let Some(in_flight) = self.page_in_flight.filter(|f| f.request_id == request_id) else {
            tracing::debug!(request_id, "discarding stale notification page");
            return false;
        };
        self.page_in_flight = None;

        let fetched = match result {
            Ok(fetched) => fetched,
            Err(reason) => {
                tracing::warn!(request_id, page = in_flight.page, %reason, "notification fetch failed");
                self.items.clear();
                self.page = 0;
                self.has_more = false;
                self.unread_count = 0;
                self.count_in_flight = None;
                return true;
            },
        };

        self.has_more = fetched.len() >= self.page_size as usize;
        self.page = in_flight.page;

        match in_flight.kind {
            FetchKind::Bootstrap => {
                // Anything pushed while page 1 was loading is newer than the
                // page; keep what the page does not already contain.
                self.items.retain(|n| !fetched.iter().any(|f| f.id == n.id));
                self.append(fetched);
                if self.filter == NotificationFilter::All {
                    self.unread_count = self.items.iter().filter(|n| !n.is_read).count() as u64;
                }
            },
            FetchKind::LoadMore => {
                let added_unread = self.append(fetched);
                if self.filter == NotificationFilter::All {
                    self.unread_count += added_unread;
                }
            },
        }

        true
    }

    /// Unread count query finished. Returns true if the count changed.
    pub fn handle_unread_count(&mut self, request_id: RequestId, result: Result<u64, String>) -> bool {
        if self.count_in_flight != Some(request_id) {
            tracing::debug!(request_id, "discarding stale unread count");
            return false;
        }
        self.count_in_flight = None;

        match result {
            Ok(count) => {
                let changed = count != self.unread_count;
                self.unread_count = count;
                changed
            },
            Err(reason) => {
                tracing::warn!(request_id, %reason, "unread count fetch failed");
                false
            },
        }
    }

    /// Live push. Returns true if the feed changed.
    ///
    /// Prepends the notification if the active filter admits it and it is
    /// not already present. Increments the unread count if it is unread.
    pub fn handle_push(&mut self, notification: Notification) -> bool {
        if notification.recipient_id != self.user_id {
            tracing::debug!(
                notification_id = notification.id,
                recipient_id = notification.recipient_id,
                "push for another user"
            );
            return false;
        }
        if self.contains(notification.id) {
            return false;
        }
        if !self.filter.admits(&notification) {
            return false;
        }

        if !notification.is_read {
            self.unread_count += 1;
        }
        self.items.insert(0, notification);
        true
    }

    /// Mark one notification read.
    ///
    /// A no-op without a server call if the item is unknown or already read.
    pub fn mark_one_read(&mut self, notification_id: NotificationId) -> Vec<FeedAction> {
        let Some(index) = self.items.iter().position(|n| n.id == notification_id) else {
            tracing::debug!(notification_id, "mark_one_read on unknown notification");
            return vec![];
        };
        if self.items[index].is_read {
            return vec![];
        }

        self.items[index].is_read = true;
        self.unread_count = self.unread_count.saturating_sub(1);
        if self.filter == NotificationFilter::UnreadOnly {
            self.items.remove(index);
        }

        vec![FeedAction::MarkRead { user_id: self.user_id, notification_id }]
    }

    /// Mark everything read.
    ///
    /// Under the unread-only filter the feed empties and pagination stops
    /// until the next bootstrap.
    pub fn mark_all_read(&mut self) -> Vec<FeedAction> {
        for notification in &mut self.items {
            notification.is_read = true;
        }
        self.unread_count = 0;
        self.count_in_flight = None;

        if self.filter == NotificationFilter::UnreadOnly {
            self.items.clear();
            self.has_more = false;
            self.page_in_flight = None;
        }

        vec![FeedAction::MarkAllRead { user_id: self.user_id }]
    }

    /// Delete everything.
    pub fn clear_all(&mut self) -> Vec<FeedAction> {
        self.items.clear();
        self.page = 0;
        self.has_more = false;
        self.unread_count = 0;
        self.page_in_flight = None;
        self.count_in_flight = None;

        vec![FeedAction::ClearAll { user_id: self.user_id }]
    }

    /// Forget everything, including the bootstrap flag. Used on logout.
    pub fn reset(&mut self) {
        *self = Self::new(self.user_id, self.page_size);
    }

    fn contains(&self, id: NotificationId) -> bool {
        self.items.iter().any(|n| n.id == id)
    }

    /// Append fetched items not already present. Returns how many of the
    /// appended items are unread.
    fn append(&mut self, fetched: Vec<Notification>) -> u64 {
        let mut unread = 0;
        for notification in fetched {
            if !self.filter.admits(&notification) || self.contains(notification.id) {
                continue;
            }
            if !notification.is_read {
                unread += 1;
            }
            self.items.push(notification);
        }
        unread
    }

    fn allocate_request_id(&mut self) -> RequestId {
        let id = self.next_request_id;
        self.next_request_id += 1;
        id
    }
}

#[cfg(test)]
mod tests {
    use chrono::DateTime;

    use super::*;

    const ME: UserId = 1;

    fn notification(id: NotificationId, is_read: bool) -> Notification {
        Notification {
            id,
            recipient_id: ME,
            content: format!("notice {id}"),
            kind: "announcement".to_string(),
            payload: serde_json::Value::Null,
            created_at: DateTime::from_timestamp(1_700_000_000 - id as i64, 0).unwrap(),
            is_read,
        }
    }

    fn page(ids: std::ops::Range<u64>, is_read: bool) -> Vec<Notification> {
        ids.map(|id| notification(id, is_read)).collect()
    }

    fn fetch_id(actions: &[FeedAction]) -> RequestId {
        actions
            .iter()
            .find_map(|a| match a {
                FeedAction::FetchPage { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .unwrap()
    }

    fn count_id(actions: &[FeedAction]) -> RequestId {
        actions
            .iter()
            .find_map(|a| match a {
                FeedAction::CountUnread { request_id, .. } => Some(*request_id),
                _ => None,
            })
            .unwrap()
    }

    fn feed() -> NotificationFeed {
        NotificationFeed::new(ME, 20)
    }

    #[test]
    fn bootstrap_all_counts_unread_from_items() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        assert_eq!(actions.len(), 1);
        assert!(feed.is_loading());

        let mut items = page(1..21, false);
        items[0].is_read = true;
        assert!(feed.handle_page(fetch_id(&actions), Ok(items)));

        assert_eq!(feed.items().len(), 20);
        assert_eq!(feed.unread_count(), 19);
        assert!(feed.has_more());
        assert_eq!(feed.page(), 1);
    }

    #[test]
    fn bootstrap_unread_only_uses_count_query() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::UnreadOnly);
        assert_eq!(actions.len(), 2);
        assert!(matches!(&actions[0], FeedAction::FetchPage { query, .. } if query.is_read == Some(false)));

        feed.handle_page(fetch_id(&actions), Ok(page(1..4, false)));
        assert!(feed.handle_unread_count(count_id(&actions), Ok(42)));

        assert_eq!(feed.items().len(), 3);
        assert!(!feed.has_more());
        assert_eq!(feed.unread_count(), 42);
    }

    #[test]
    fn filter_switch_discards_old_completion() {
        let mut feed = feed();
        let first = feed.bootstrap(NotificationFilter::All);
        let second = feed.bootstrap(NotificationFilter::UnreadOnly);

        assert!(!feed.handle_page(fetch_id(&first), Ok(page(1..21, true))));
        assert!(feed.items().is_empty());
        assert!(feed.is_loading());

        assert!(feed.handle_page(fetch_id(&second), Ok(page(30..32, false))));
        assert_eq!(feed.items().len(), 2);
        assert!(feed.items().iter().all(|n| !n.is_read));
    }

    #[test]
    fn load_more_appends_and_stops_on_short_page() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        feed.handle_page(fetch_id(&actions), Ok(page(1..21, true)));

        let more = feed.load_more();
        assert!(matches!(&more[..], [FeedAction::FetchPage { query, .. }] if query.page == 2));
        assert!(feed.load_more().is_empty(), "second load_more while in flight");

        feed.handle_page(fetch_id(&more), Ok(page(21..26, false)));
        assert_eq!(feed.items().len(), 25);
        assert_eq!(feed.unread_count(), 5);
        assert!(!feed.has_more());
        assert!(feed.load_more().is_empty());
    }

    #[test]
    fn load_more_skips_items_already_present() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        feed.handle_page(fetch_id(&actions), Ok(page(1..21, false)));

        // A push shifted server-side pagination by one
        let more = feed.load_more();
        feed.handle_page(fetch_id(&more), Ok(page(20..22, false)));
        assert_eq!(feed.items().len(), 21);
        assert_eq!(feed.unread_count(), 21);
    }

    #[test]
    fn fetch_failure_resets_feed() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        feed.handle_page(fetch_id(&actions), Ok(page(1..21, false)));

        let more = feed.load_more();
        assert!(feed.handle_page(fetch_id(&more), Err("503".to_string())));
        assert!(feed.items().is_empty());
        assert!(!feed.has_more());
        assert_eq!(feed.unread_count(), 0);
    }

    #[test]
    fn push_prepends_and_counts() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        feed.handle_page(fetch_id(&actions), Ok(page(1..3, true)));

        assert!(feed.handle_push(notification(99, false)));
        assert_eq!(feed.items()[0].id, 99);
        assert_eq!(feed.unread_count(), 1);

        // Repeated delivery is ignored
        assert!(!feed.handle_push(notification(99, false)));
        assert_eq!(feed.unread_count(), 1);

        // Already-read push is shown but not counted
        assert!(feed.handle_push(notification(100, true)));
        assert_eq!(feed.unread_count(), 1);
    }

    #[test]
    fn push_during_bootstrap_survives_page_load() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        feed.handle_push(notification(50, false));

        feed.handle_page(fetch_id(&actions), Ok(page(1..3, false)));
        let ids: Vec<_> = feed.items().iter().map(|n| n.id).collect();
        assert_eq!(ids, vec![50, 1, 2]);
        assert_eq!(feed.unread_count(), 3);
    }

    #[test]
    fn push_for_someone_else_is_ignored() {
        let mut feed = feed();
        let mut other = notification(7, false);
        other.recipient_id = 2;
        assert!(!feed.handle_push(other));
        assert_eq!(feed.unread_count(), 0);
    }

    #[test]
    fn unread_only_rejects_read_push() {
        let mut feed = feed();
        feed.bootstrap(NotificationFilter::UnreadOnly);
        assert!(!feed.handle_push(notification(7, true)));
        assert!(feed.items().is_empty());
    }

    #[test]
    fn mark_one_read_is_monotonic() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        feed.handle_page(fetch_id(&actions), Ok(page(1..3, false)));

        assert_eq!(feed.mark_one_read(1), vec![FeedAction::MarkRead {
            user_id: ME,
            notification_id: 1
        }]);
        assert_eq!(feed.unread_count(), 1);
        assert!(feed.items()[0].is_read);

        assert!(feed.mark_one_read(1).is_empty());
        assert!(feed.mark_one_read(404).is_empty());
        assert_eq!(feed.unread_count(), 1);
    }

    #[test]
    fn mark_one_read_removes_from_unread_view() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::UnreadOnly);
        feed.handle_page(fetch_id(&actions), Ok(page(1..3, false)));
        feed.handle_unread_count(count_id(&actions), Ok(2));

        feed.mark_one_read(2);
        assert_eq!(feed.items().len(), 1);
        assert_eq!(feed.unread_count(), 1);
    }

    #[test]
    fn unread_count_never_underflows() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::UnreadOnly);
        feed.handle_page(fetch_id(&actions), Ok(page(1..3, false)));
        feed.handle_unread_count(count_id(&actions), Ok(0));

        feed.mark_one_read(1);
        assert_eq!(feed.unread_count(), 0);
    }

    #[test]
    fn mark_all_read_under_unread_only_stops_pagination() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::UnreadOnly);
        feed.handle_page(fetch_id(&actions), Ok(page(1..21, false)));
        assert!(feed.has_more());

        let more = feed.load_more();
        assert_eq!(feed.mark_all_read(), vec![FeedAction::MarkAllRead { user_id: ME }]);

        assert!(feed.items().is_empty());
        assert!(!feed.has_more());
        assert_eq!(feed.unread_count(), 0);

        // The page that was in flight is stale now
        assert!(!feed.handle_page(fetch_id(&more), Ok(page(21..41, false))));
        assert!(!feed.handle_unread_count(count_id(&actions), Ok(20)));
        assert_eq!(feed.unread_count(), 0);
    }

    #[test]
    fn mark_all_read_under_all_keeps_items() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        feed.handle_page(fetch_id(&actions), Ok(page(1..4, false)));

        feed.mark_all_read();
        assert_eq!(feed.items().len(), 3);
        assert!(feed.items().iter().all(|n| n.is_read));
        assert_eq!(feed.unread_count(), 0);
    }

    #[test]
    fn clear_all_empties_and_cancels() {
        let mut feed = feed();
        let actions = feed.bootstrap(NotificationFilter::All);
        assert_eq!(feed.clear_all(), vec![FeedAction::ClearAll { user_id: ME }]);
        assert!(!feed.handle_page(fetch_id(&actions), Ok(page(1..3, false))));
        assert!(feed.items().is_empty());
        assert!(!feed.is_loading());
    }

    #[test]
    fn reset_forgets_bootstrap() {
        let mut feed = feed();
        feed.bootstrap(NotificationFilter::UnreadOnly);
        feed.reset();
        assert!(!feed.is_bootstrapped());
        assert_eq!(feed.filter(), NotificationFilter::All);
    }
}
