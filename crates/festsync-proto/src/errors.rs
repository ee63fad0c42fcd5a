//! Protocol error types.

use thiserror::Error;

/// Result alias for protocol operations.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors raised while encoding or decoding wire data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProtocolError {
    /// JSON serialization failed
    #[error("json encode failed: {0}")]
    Encode(String),

    /// Input was not a well-formed event envelope
    #[error("json decode failed: {0}")]
    Decode(String),
}
