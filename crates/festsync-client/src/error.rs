//! Client error types.

use festsync_core::ConnectionError;
use thiserror::Error;

/// Errors surfaced by the sync client.
///
/// Most failures in this system are absorbed and logged rather than returned.
/// The variants here are the ones a caller can act on.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ClientError {
    /// Operation needs a live channel and there is none.
    #[error("{operation} requires a live connection")]
    Connectivity {
        /// Operation that was attempted
        operation: &'static str,
    },

    /// The session was ended by `logout`.
    #[error("session has ended")]
    SessionEnded,

    /// Message has neither text nor an attachment.
    #[error("message is empty")]
    EmptyMessage,

    /// Uploaded file carries no name.
    #[error("attachment has no file name")]
    MissingFileName,

    /// Uploaded file exceeds the size limit.
    #[error("attachment {file_name} is {size} bytes, limit is {limit}")]
    AttachmentTooLarge {
        /// File that was rejected
        file_name: String,
        /// Its size in bytes
        size: u64,
        /// Configured limit in bytes
        limit: u64,
    },

    /// The upload collaborator failed.
    #[error("upload failed: {0}")]
    Upload(String),

    /// Connection state machine rejected a transition.
    #[error(transparent)]
    Connection(#[from] ConnectionError),
}

impl ClientError {
    /// Returns true if retrying later (for example after a reconnect) may
    /// succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Connectivity { .. } | Self::Upload(_) => true,
            Self::Connection(e) => e.is_transient(),
            Self::SessionEnded
            | Self::EmptyMessage
            | Self::MissingFileName
            | Self::AttachmentTooLarge { .. } => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn connectivity_errors_are_retryable() {
        assert!(ClientError::Connectivity { operation: "request_history" }.is_transient());
        assert!(!ClientError::EmptyMessage.is_transient());
        assert!(
            ClientError::Connection(ConnectionError::Transport("reset".to_string())).is_transient()
        );
    }

    #[test]
    fn error_messages_name_the_operation() {
        let err = ClientError::Connectivity { operation: "request_history" };
        assert_eq!(err.to_string(), "request_history requires a live connection");
    }
}
