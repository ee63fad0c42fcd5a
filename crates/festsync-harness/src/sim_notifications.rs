//! In-memory notification service for simulation.
//!
//! Stores notifications per recipient and answers the REST calls the feed
//! issues. [`SimNotificationService::publish`] creates a notification and
//! returns the matching channel push so the test can route it through the
//! simulated backend. Failures can be injected per call.

use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta};
use festsync_client::{NotificationService, ServiceError};
use festsync_proto::{
    Inbound, Notification, NotificationId, NotificationPage, NotificationQuery, UserId,
};

#[derive(Debug, Default)]
struct Store {
    notifications: Vec<Notification>,
    next_id: NotificationId,
    failures: u32,
}

impl Store {
    fn take_failure(&mut self) -> Result<(), ServiceError> {
        if self.failures > 0 {
            self.failures -= 1;
            return Err(ServiceError::Status { status: 503, body: "injected failure".into() });
        }
        Ok(())
    }
}

/// Notification REST service backed by memory.
///
/// Clones share the same store.
#[derive(Debug, Clone, Default)]
pub struct SimNotificationService {
    store: Arc<Mutex<Store>>,
}

impl SimNotificationService {
    /// Create an empty service.
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `count` calls fail with a 503.
    pub fn fail_next(&self, count: u32) {
        self.lock().failures = count;
    }

    /// Create a notification for `recipient_id`.
    ///
    /// Returns the push event the backend would send on the recipient's
    /// personal topic.
    pub fn publish(&self, recipient_id: UserId, kind: &str, content: &str) -> Inbound {
        let mut store = self.lock();
        store.next_id += 1;
        let id = store.next_id;
        let created_at = DateTime::from_timestamp(1_760_000_000, 0).unwrap_or_default()
            + TimeDelta::seconds(id as i64);

        let notification = Notification {
            id,
            recipient_id,
            content: content.to_string(),
            kind: kind.to_string(),
            payload: serde_json::json!({ "source": "sim" }),
            created_at,
            is_read: false,
        };
        store.notifications.push(notification.clone());
        Inbound::Notification { recipient_id, notification }
    }

    /// Every stored notification for `user_id`, newest first.
    pub fn notifications(&self, user_id: UserId) -> Vec<Notification> {
        let store = self.lock();
        let mut mine: Vec<_> =
            store.notifications.iter().filter(|n| n.recipient_id == user_id).cloned().collect();
        mine.sort_by(|a, b| (b.created_at, b.id).cmp(&(a.created_at, a.id)));
        mine
    }

    /// Unread notifications stored for `user_id`.
    pub fn unread(&self, user_id: UserId) -> u64 {
        self.lock().notifications.iter().filter(|n| n.recipient_id == user_id && !n.is_read).count()
            as u64
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Store> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[async_trait]
impl NotificationService for SimNotificationService {
    async fn fetch_page(&self, query: NotificationQuery) -> Result<NotificationPage, ServiceError> {
        self.lock().take_failure()?;

        let skip = (query.page.max(1) as usize - 1) * query.limit as usize;
        let data = self
            .notifications(query.user_id)
            .into_iter()
            .filter(|n| query.is_read.is_none_or(|is_read| n.is_read == is_read))
            .skip(skip)
            .take(query.limit as usize)
            .collect();
        Ok(NotificationPage { data })
    }

    async fn mark_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<(), ServiceError> {
        let mut store = self.lock();
        store.take_failure()?;
        match store
            .notifications
            .iter_mut()
            .find(|n| n.id == notification_id && n.recipient_id == user_id)
        {
            Some(notification) => {
                notification.is_read = true;
                Ok(())
            },
            None => Err(ServiceError::Status { status: 404, body: "not found".into() }),
        }
    }

    async fn mark_all_read(&self, user_id: UserId) -> Result<(), ServiceError> {
        let mut store = self.lock();
        store.take_failure()?;
        for notification in store.notifications.iter_mut().filter(|n| n.recipient_id == user_id) {
            notification.is_read = true;
        }
        Ok(())
    }

    async fn clear_all(&self, user_id: UserId) -> Result<(), ServiceError> {
        let mut store = self.lock();
        store.take_failure()?;
        store.notifications.retain(|n| n.recipient_id != user_id);
        Ok(())
    }

    async fn count_unread(&self, user_id: UserId) -> Result<u64, ServiceError> {
        self.lock().take_failure()?;
        Ok(self.unread(user_id))
    }
}
