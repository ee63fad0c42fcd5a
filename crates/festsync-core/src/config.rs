//! Sync engine configuration.

use std::time::Duration;

/// Time allowed between opening the transport and the handshake ack.
pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Echo delay after which an outgoing message is reported as stalled.
pub const DEFAULT_STALLED_SEND_AFTER: Duration = Duration::from_secs(2);

/// Age at which a stalled send that never echoed is forgotten.
pub const DEFAULT_PENDING_SEND_EXPIRY: Duration = Duration::from_secs(30);

/// Local keystroke inactivity after which `typing_stop` is emitted.
pub const DEFAULT_TYPING_IDLE: Duration = Duration::from_secs(1);

/// Lifetime of a remote typing entry that is not renewed.
pub const DEFAULT_TYPING_STALENESS: Duration = Duration::from_secs(3);

/// Default `limit` for history requests.
pub const DEFAULT_HISTORY_PAGE_SIZE: u32 = 50;

/// Fixed page size of the notification feed.
pub const DEFAULT_NOTIFICATION_PAGE_SIZE: u32 = 20;

/// Distance from the bottom (in pixels) still treated as "at bottom".
pub const DEFAULT_SCROLL_THRESHOLD_PX: u32 = 48;

/// Largest upload accepted as a message attachment (10 MiB).
pub const DEFAULT_MAX_ATTACHMENT_BYTES: u64 = 10 * 1024 * 1024;

/// Tunables for every sync component.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    /// Timeout for the transport handshake
    pub handshake_timeout: Duration,
    /// Stalled-send threshold (advisory, surfaced to the caller)
    pub stalled_send_after: Duration,
    /// Pending sends older than this are dropped after being reported
    pub pending_send_expiry: Duration,
    /// Local typing inactivity window
    pub typing_idle: Duration,
    /// Remote typing staleness window (should be >= `typing_idle`)
    pub typing_staleness: Duration,
    /// History page size
    pub history_page_size: u32,
    /// Notification page size
    pub notification_page_size: u32,
    /// "At bottom" tolerance in pixels
    pub scroll_threshold_px: u32,
    /// Attachment size limit in bytes
    pub max_attachment_bytes: u64,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            handshake_timeout: DEFAULT_HANDSHAKE_TIMEOUT,
            stalled_send_after: DEFAULT_STALLED_SEND_AFTER,
            pending_send_expiry: DEFAULT_PENDING_SEND_EXPIRY,
            typing_idle: DEFAULT_TYPING_IDLE,
            typing_staleness: DEFAULT_TYPING_STALENESS,
            history_page_size: DEFAULT_HISTORY_PAGE_SIZE,
            notification_page_size: DEFAULT_NOTIFICATION_PAGE_SIZE,
            scroll_threshold_px: DEFAULT_SCROLL_THRESHOLD_PX,
            max_attachment_bytes: DEFAULT_MAX_ATTACHMENT_BYTES,
        }
    }
}
