//! Notification REST service seam.
//!
//! The feed never calls the service itself; it returns [`FeedAction`]s and
//! [`execute_feed_action`] runs them against whatever implementation the
//! caller supplies. Fetch completions are turned back into [`ClientEvent`]s.
//! Mutations are fire-and-forget: their failures are logged and dropped.

use async_trait::async_trait;
use festsync_proto::{NotificationFilter, NotificationId, NotificationPage, NotificationQuery, UserId};
use thiserror::Error;

use crate::{event::ClientEvent, notification_feed::FeedAction};

/// Page size used when counting unread notifications by paging.
const COUNT_PAGE_SIZE: u32 = 100;

/// Errors from the notification service.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ServiceError {
    /// Request never got an answer (DNS, connect, timeout, ...).
    #[error("request failed: {0}")]
    Http(String),

    /// Server answered with a non-success status.
    #[error("unexpected status {status}: {body}")]
    Status {
        /// HTTP status code
        status: u16,
        /// Response body, possibly truncated
        body: String,
    },

    /// Response body did not match the expected shape.
    #[error("malformed response: {0}")]
    Decode(String),
}

/// The notification REST endpoints.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// `GET notifications?user_id&page&limit[&is_read]`
    async fn fetch_page(&self, query: NotificationQuery) -> Result<NotificationPage, ServiceError>;

    /// `PATCH notification/{id}/read`
    async fn mark_read(
        &self,
        user_id: UserId,
        notification_id: NotificationId,
    ) -> Result<(), ServiceError>;

    /// `PATCH notifications/read-all`
    async fn mark_all_read(&self, user_id: UserId) -> Result<(), ServiceError>;

    /// `DELETE notifications/clear`
    async fn clear_all(&self, user_id: UserId) -> Result<(), ServiceError>;

    /// Total unread notifications.
    ///
    /// The default pages through the unread filter until a short page.
    /// Implementations with a dedicated count endpoint should override it.
    async fn count_unread(&self, user_id: UserId) -> Result<u64, ServiceError> {
        let mut total = 0;
        let mut page = 1;
        loop {
            let query =
                NotificationQuery::new(user_id, NotificationFilter::UnreadOnly, page, COUNT_PAGE_SIZE);
            let fetched = self.fetch_page(query).await?.data.len() as u64;
            total += fetched;
            if fetched < u64::from(COUNT_PAGE_SIZE) {
                return Ok(total);
            }
            page += 1;
        }
    }
}

/// Run one feed action.
///
/// Returns the completion event for fetches. Mutations return `None`; a
/// failed mutation is logged and local state is left as it is.
pub async fn execute_feed_action<S, I>(service: &S, action: FeedAction) -> Option<ClientEvent<I>>
where
    S: NotificationService + ?Sized,
{
    match action {
        FeedAction::FetchPage { request_id, query } => {
            let result = service.fetch_page(query).await.map(|page| page.data).map_err(|e| e.to_string());
            Some(ClientEvent::FeedPageLoaded { request_id, result })
        },
        FeedAction::CountUnread { request_id, user_id } => {
            let result = service.count_unread(user_id).await.map_err(|e| e.to_string());
            Some(ClientEvent::UnreadCountLoaded { request_id, result })
        },
        FeedAction::MarkRead { user_id, notification_id } => {
            if let Err(error) = service.mark_read(user_id, notification_id).await {
                tracing::warn!(%error, notification_id, "mark read failed, keeping local state");
            }
            None
        },
        FeedAction::MarkAllRead { user_id } => {
            if let Err(error) = service.mark_all_read(user_id).await {
                tracing::warn!(%error, user_id, "mark all read failed, keeping local state");
            }
            None
        },
        FeedAction::ClearAll { user_id } => {
            if let Err(error) = service.clear_all(user_id).await {
                tracing::warn!(%error, user_id, "clear failed, keeping local state");
            }
            None
        },
    }
}
