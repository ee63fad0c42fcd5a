//! Simulation driver implementing the Driver trait.
//!
//! `SimDriver` provides the same interface as the WebSocket driver but
//! routes everything through a [`SharedBackend`]. It implements [`Driver`]
//! so the same [`festsync_client::Runtime`] orchestration code runs in both
//! production and simulation.

use festsync_client::Driver;
use festsync_core::Identity;
use festsync_proto::{Inbound, Outbound, UserId};
use thiserror::Error;

use crate::sim_server::{SharedBackend, lock_backend};

/// Error type for simulation driver.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SimDriverError {
    /// The backend refused the transport.
    #[error("backend unreachable")]
    Unreachable,

    /// Send attempted without an open transport.
    #[error("transport not open")]
    NotOpen,
}

/// Simulation driver for deterministic testing.
pub struct SimDriver {
    backend: SharedBackend,
    user_id: Option<UserId>,
    open: bool,
    sent: usize,
}

impl SimDriver {
    /// Create a driver on top of a shared backend.
    pub fn new(backend: SharedBackend) -> Self {
        Self { backend, user_id: None, open: false, sent: 0 }
    }

    /// Backend this driver talks to.
    pub fn backend(&self) -> &SharedBackend {
        &self.backend
    }

    /// Events sent through this driver so far.
    pub fn sent(&self) -> usize {
        self.sent
    }

    /// Sever the transport from the server side. The client observes a
    /// disconnect on its next poll.
    pub fn drop_connection(&self, reason: &str) {
        if let Some(user_id) = self.user_id {
            lock_backend(&self.backend).drop_connection(user_id, reason);
        }
    }
}

impl Driver for SimDriver {
    type Error = SimDriverError;

    async fn open(&mut self, identity: &Identity) -> Result<(), Self::Error> {
        let accepted = lock_backend(&self.backend).connect(identity);
        if !accepted {
            self.open = false;
            return Err(SimDriverError::Unreachable);
        }
        self.user_id = Some(identity.user_id);
        self.open = true;
        Ok(())
    }

    fn close(&mut self, reason: &str) {
        if let Some(user_id) = self.user_id.filter(|_| self.open) {
            tracing::debug!(user_id, reason, "sim driver closing transport");
            lock_backend(&self.backend).disconnect(user_id);
        }
        self.open = false;
    }

    async fn send(&mut self, event: Outbound) -> Result<(), Self::Error> {
        let Some(user_id) = self.user_id.filter(|_| self.open) else {
            return Err(SimDriverError::NotOpen);
        };
        lock_backend(&self.backend).handle(user_id, event);
        self.sent += 1;
        Ok(())
    }

    async fn recv(&mut self) -> Option<Inbound> {
        let user_id = self.user_id.filter(|_| self.open)?;
        let inbound = lock_backend(&self.backend).take_inbound(user_id)?;
        if matches!(inbound, Inbound::Disconnect { .. }) {
            self.open = false;
        }
        Some(inbound)
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
