//! Notification feed payload types and REST bodies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{NotificationId, UserId};

/// A notification addressed to one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    /// Server-assigned id.
    pub id: NotificationId,
    /// User the notification is addressed to.
    #[serde(rename = "user_id")]
    pub recipient_id: UserId,
    /// Human-readable text.
    pub content: String,
    /// Category tag (e.g. `order_created`, `festival_approved`).
    #[serde(rename = "type")]
    pub kind: String,
    /// Free-form data attached by the producer.
    #[serde(default)]
    pub payload: serde_json::Value,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Read state. The only field the client mutates.
    #[serde(default)]
    pub is_read: bool,
}

/// Which notifications the feed is showing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationFilter {
    /// Every notification.
    #[default]
    All,
    /// Only notifications with `is_read == false`.
    UnreadOnly,
}

impl NotificationFilter {
    /// Check whether a notification belongs in a feed under this filter.
    pub fn admits(self, notification: &Notification) -> bool {
        match self {
            Self::All => true,
            Self::UnreadOnly => !notification.is_read,
        }
    }

    /// Value of the `is_read` query parameter for this filter.
    pub fn is_read_param(self) -> Option<bool> {
        match self {
            Self::All => None,
            Self::UnreadOnly => Some(false),
        }
    }
}

/// `GET notifications` query string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct NotificationQuery {
    /// Feed owner.
    pub user_id: UserId,
    /// 1-based page number.
    pub page: u32,
    /// Page size.
    pub limit: u32,
    /// Read-state filter. Omitted for the `all` filter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_read: Option<bool>,
}

impl NotificationQuery {
    /// Build the query for `page` of a feed under `filter`.
    pub fn new(user_id: UserId, filter: NotificationFilter, page: u32, limit: u32) -> Self {
        Self { user_id, page, limit, is_read: filter.is_read_param() }
    }
}

/// `GET notifications` response body.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NotificationPage {
    /// Notifications on this page, most recent first.
    #[serde(default)]
    pub data: Vec<Notification>,
}

/// Body of the mark-read, mark-all-read and clear calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRef {
    /// Acting user.
    pub user_id: UserId,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(is_read: bool) -> Notification {
        Notification {
            id: 1,
            recipient_id: 9,
            content: "Order #12 ready".into(),
            kind: "order_ready".into(),
            payload: serde_json::Value::Null,
            created_at: DateTime::from_timestamp(0, 0).unwrap(),
            is_read,
        }
    }

    #[test]
    fn filter_admission() {
        assert!(NotificationFilter::All.admits(&sample(true)));
        assert!(NotificationFilter::All.admits(&sample(false)));
        assert!(!NotificationFilter::UnreadOnly.admits(&sample(true)));
        assert!(NotificationFilter::UnreadOnly.admits(&sample(false)));
    }

    #[test]
    fn query_omits_read_flag_for_all() {
        let all = NotificationQuery::new(9, NotificationFilter::All, 1, 20);
        assert_eq!(all.is_read, None);
        let json = serde_json::to_value(all).unwrap();
        assert!(json.get("is_read").is_none());

        let unread = NotificationQuery::new(9, NotificationFilter::UnreadOnly, 2, 20);
        assert_eq!(unread.is_read, Some(false));
    }

    #[test]
    fn wire_names_match_rest_api() {
        let json = serde_json::to_value(sample(false)).unwrap();
        assert_eq!(json["user_id"], 9);
        assert_eq!(json["type"], "order_ready");
        assert_eq!(json["is_read"], false);
    }
}
