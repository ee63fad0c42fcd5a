//! Connection failures.
//!
//! Every variant leaves the connection in `Disconnected`. The host decides
//! whether and when to issue another connect.

use std::time::Duration;

use thiserror::Error;

use crate::connection::ConnectionState;

/// Why a connection operation failed.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConnectionError {
    /// The call does not apply in the current state (e.g. a handshake ack
    /// with no connect in progress).
    #[error("cannot {operation} while {state:?}")]
    InvalidState {
        /// State at the time of the call
        state: ConnectionState,
        /// Name of the rejected operation
        operation: String,
    },

    /// No handshake ack arrived in time.
    #[error("no handshake ack after {elapsed:?}")]
    HandshakeTimeout {
        /// Time spent in `Connecting`
        elapsed: Duration,
    },

    /// The channel went away underneath us.
    #[error("channel lost: {0}")]
    Transport(String),
}

impl ConnectionError {
    /// True if a fresh connect cycle may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::HandshakeTimeout { .. } | Self::Transport(_) => true,
            Self::InvalidState { .. } => false,
        }
    }
}
