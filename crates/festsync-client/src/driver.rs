//! Driver trait for abstracting channel I/O.
//!
//! The [`Driver`] trait decouples the sync runtime from a concrete
//! transport. Production uses a WebSocket (see the `transport` feature);
//! the simulation harness routes events through an in-memory backend. The
//! generic [`crate::Runtime`] handles all orchestration either way.

use std::future::Future;

use festsync_core::Identity;
use festsync_proto::{Inbound, Outbound};

/// Abstracts the persistent channel.
///
/// # Implementations
///
/// - **WebSocket**: tokio-tungstenite, JSON text frames
/// - **Simulation**: in-memory delivery through a simulated backend
pub trait Driver: Send {
    /// Platform-specific error type.
    type Error: std::error::Error + Send + 'static;

    /// Establish the channel authenticated as `identity`.
    ///
    /// A successful open is acknowledged later by an [`Inbound::Connect`]
    /// from `recv`.
    ///
    /// # Errors
    ///
    /// Returns an error if the transport cannot be established.
    fn open(&mut self, identity: &Identity) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Tear the channel down and release its resources. Idempotent.
    fn close(&mut self, reason: &str);

    /// Send one event.
    ///
    /// # Errors
    ///
    /// Returns an error if the channel is closed or the send fails.
    fn send(&mut self, event: Outbound) -> impl Future<Output = Result<(), Self::Error>> + Send;

    /// Receive the next event.
    ///
    /// Returns `None` if nothing is ready. A transport that went away is
    /// reported as [`Inbound::Disconnect`].
    fn recv(&mut self) -> impl Future<Output = Option<Inbound>> + Send;

    /// Check whether a transport is currently open.
    fn is_open(&self) -> bool;
}
