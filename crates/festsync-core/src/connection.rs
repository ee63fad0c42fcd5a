//! Connection manager state machine.
//!
//! Owns the lifecycle of the one persistent channel per session. Uses the
//! action pattern: methods take time as input and return actions for the
//! driver to execute, so the machine itself never touches a socket.
//!
//! # State Machine
//!
//! ```text
//!                 connect()              handshake ack
//! ┌──────────────┐ ───────> ┌────────────┐ ───────────> ┌───────────┐
//! │ Disconnected │          │ Connecting │              │ Connected │
//! └──────────────┘ <─────── └────────────┘              └───────────┘
//!        ^       timeout/close/disconnect()                   │
//!        └────────────────────────────────────────────────────┘
//!                 transport close / auth loss / disconnect()
//! ```
//!
//! There is no separate reconnecting state: calling `connect()` while a
//! channel exists tears the old one down completely (a `Close` action, and a
//! `LiveChanged(false)` if it was live) before opening the new one.
//!
//! The connection does not replay server-side state. Each transition to
//! `Connected` bumps [`Connection::session_epoch`]; components use that and
//! the `LiveChanged(true)` action to re-join conversations and re-fetch.

use std::time::Duration;

use festsync_proto::{Outbound, UserId};

use crate::{config::SyncConfig, env::MonotonicInstant, error::ConnectionError};

/// Who the channel is authenticated as. Bound at connect time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Local user's id.
    pub user_id: UserId,
    /// Local user's display name, used to label our own messages.
    pub display_name: String,
}

impl Identity {
    /// Create an identity.
    pub fn new(user_id: UserId, display_name: impl Into<String>) -> Self {
        Self { user_id, display_name: display_name.into() }
    }
}

/// Actions returned by the connection state machine.
///
/// The driver executes these:
/// - `Open`: establish a transport authenticated as `identity`
/// - `Close`: tear the transport down and release its resources
/// - `Emit`: send one event over the live transport
/// - `LiveChanged`: publish the is-live signal to every component
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionAction {
    /// Open a transport
    Open {
        /// Identity to authenticate as
        identity: Identity,
    },

    /// Close the transport with this reason
    Close {
        /// Reason for closing the connection
        reason: String,
    },

    /// Send this event to the backend
    Emit(Outbound),

    /// The is-live signal flipped
    LiveChanged(bool),
}

/// Connection state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport
    Disconnected,
    /// Transport opening, waiting for the handshake ack
    Connecting,
    /// Handshake acknowledged, channel live
    Connected,
}

/// Connection state machine.
///
/// This is a pure state machine - no I/O, no Environment storage. Time is
/// passed as parameters to methods that need it.
#[derive(Debug, Clone)]
pub struct Connection<I: MonotonicInstant> {
    /// Current state
    state: ConnectionState,
    /// Timeout for completing the handshake
    handshake_timeout: Duration,
    /// When the current connect cycle started. `None` unless Connecting.
    connecting_since: Option<I>,
    /// Identity of the current (or last requested) channel
    identity: Option<Identity>,
    /// Number of transitions into Connected so far
    session_epoch: u64,
}

impl<I: MonotonicInstant> Connection<I> {
    /// Create a new connection in [`ConnectionState::Disconnected`].
    pub fn new(config: &SyncConfig) -> Self {
        Self {
            state: ConnectionState::Disconnected,
            handshake_timeout: config.handshake_timeout,
            connecting_since: None,
            identity: None,
            session_epoch: 0,
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// The is-live signal. Only true while Connected.
    pub fn is_live(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Identity bound by the last `connect`. `None` after `disconnect`.
    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    /// How many times the channel has become live.
    ///
    /// A component that cached something tied to one live period can compare
    /// epochs to notice it crossed a reconnect.
    pub fn session_epoch(&self) -> u64 {
        self.session_epoch
    }

    /// Start a connect cycle.
    ///
    /// Any existing channel is torn down first, so there is never more than
    /// one live transport.
    pub fn connect(&mut self, identity: Identity, now: I) -> Vec<ConnectionAction> {
        let mut actions = Vec::new();

        if self.state != ConnectionState::Disconnected {
            actions.extend(self.teardown("reconnect"));
        }

        tracing::info!(user_id = identity.user_id, "connecting");

        self.state = ConnectionState::Connecting;
        self.connecting_since = Some(now);
        self.identity = Some(identity.clone());
        actions.push(ConnectionAction::Open { identity });
        actions
    }

    /// Transport handshake acknowledged.
    ///
    /// A duplicate ack while already Connected is ignored.
    ///
    /// # Errors
    ///
    /// - `ConnectionError::InvalidState` if no connect cycle is in progress
    pub fn handle_connected(&mut self) -> Result<Vec<ConnectionAction>, ConnectionError> {
        match self.state {
            ConnectionState::Connecting => {
                self.state = ConnectionState::Connected;
                self.connecting_since = None;
                self.session_epoch += 1;
                tracing::info!(epoch = self.session_epoch, "channel live");
                Ok(vec![ConnectionAction::LiveChanged(true)])
            },
            ConnectionState::Connected => Ok(vec![]),
            ConnectionState::Disconnected => Err(ConnectionError::InvalidState {
                state: self.state,
                operation: "handle_connected".to_string(),
            }),
        }
    }

    /// Transport closed underneath us (backend close, network drop, auth
    /// loss).
    pub fn handle_closed(&mut self, reason: &str) -> Vec<ConnectionAction> {
        if self.state == ConnectionState::Disconnected {
            return vec![];
        }

        tracing::info!(%reason, "channel closed");

        let was_live = self.is_live();
        self.state = ConnectionState::Disconnected;
        self.connecting_since = None;

        if was_live { vec![ConnectionAction::LiveChanged(false)] } else { vec![] }
    }

    /// Close the channel on request and release the identity.
    pub fn disconnect(&mut self) -> Vec<ConnectionAction> {
        let actions = if self.state == ConnectionState::Disconnected {
            vec![]
        } else {
            self.teardown("client disconnect")
        };
        self.identity = None;
        actions
    }

    /// Wrap an outbound event for the driver.
    ///
    /// Returns `None` while not Connected. Send-type operations are no-ops
    /// when the channel is down: nothing is queued and nothing fails.
    pub fn emit(&self, event: Outbound) -> Option<ConnectionAction> {
        if self.is_live() {
            Some(ConnectionAction::Emit(event))
        } else {
            tracing::debug!(event = event.name(), state = ?self.state, "dropping emit while not live");
            None
        }
    }

    /// Elapsed time in the current connect cycle, if the handshake timed out.
    pub fn check_timeout(&self, now: I) -> Option<Duration> {
        let since = self.connecting_since?;
        let elapsed = now - since;
        if elapsed > self.handshake_timeout { Some(elapsed) } else { None }
    }

    /// Process periodic maintenance (handshake timeout).
    pub fn tick(&mut self, now: I) -> Vec<ConnectionAction> {
        let Some(elapsed) = self.check_timeout(now) else {
            return vec![];
        };

        let error = ConnectionError::HandshakeTimeout { elapsed };
        tracing::warn!(%error, "connect cycle abandoned");

        self.state = ConnectionState::Disconnected;
        self.connecting_since = None;
        vec![ConnectionAction::Close { reason: error.to_string() }]
    }

    /// Next instant at which `tick` has work to do.
    pub fn next_deadline(&self) -> Option<I> {
        self.connecting_since.map(|since| since + self.handshake_timeout)
    }

    fn teardown(&mut self, reason: &str) -> Vec<ConnectionAction> {
        let was_live = self.is_live();
        self.state = ConnectionState::Disconnected;
        self.connecting_since = None;

        let mut actions = vec![ConnectionAction::Close { reason: reason.to_string() }];
        if was_live {
            actions.push(ConnectionAction::LiveChanged(false));
        }
        actions
    }
}
