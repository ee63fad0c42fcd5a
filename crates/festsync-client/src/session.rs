//! Session context.
//!
//! One session per signed-in user. Every component that needs "who am I"
//! reads it from here instead of from ambient global state, and `logout`
//! tears all of them down together.

use festsync_core::Identity;
use festsync_proto::UserId;

/// Explicitly owned login context.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    identity: Identity,
    active: bool,
}

impl Session {
    /// Begin a session for `identity`.
    pub fn login(identity: Identity) -> Self {
        tracing::info!(user_id = identity.user_id, "session started");
        Self { identity, active: true }
    }

    /// Signed-in identity.
    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    /// Signed-in user id.
    pub fn user_id(&self) -> UserId {
        self.identity.user_id
    }

    /// Signed-in display name.
    pub fn display_name(&self) -> &str {
        &self.identity.display_name
    }

    /// False once `logout` has run.
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// End the session. Idempotent.
    pub fn logout(&mut self) {
        if self.active {
            tracing::info!(user_id = self.identity.user_id, "session ended");
            self.active = false;
        }
    }
}
