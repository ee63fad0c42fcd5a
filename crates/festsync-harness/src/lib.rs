//! Deterministic simulation harness for the festsync sync engine.
//!
//! Virtual-time implementations of the environment, the channel driver and
//! the notification service, so whole deployments of clients can be run
//! reproducibly from a seed.
//!
//! # Simulation
//!
//! [`SimWorld`] owns several clients, each a full [`festsync_client::Runtime`]
//! over a [`SimDriver`], plus one [`SimBackend`] that plays the server. It
//! applies random or scripted [`SimOp`]s and lets traffic settle between
//! them.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution paths, not
//! specific scenarios. Use [`InvariantRegistry::standard()`] after every step
//! and [`InvariantRegistry::quiescent()`] once traffic has settled.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod invariants;
pub mod operation;
pub mod sim_driver;
pub mod sim_env;
pub mod sim_notifications;
pub mod sim_server;
pub mod sim_upload;
pub mod world;

pub use invariants::{
    ClientSnapshot, FeedSnapshot, Invariant, InvariantRegistry, InvariantResult,
    LocalUserNeverTyping, LogConvergence, LogsSorted, NoPhantomMessages, SystemSnapshot,
    UniqueMessageIds, UniqueNotifications, UnreadBadgeMatches, Violation,
};
pub use operation::{CONVERSATIONS, SimOp};
pub use sim_driver::{SimDriver, SimDriverError};
pub use sim_env::{SimEnv, SimInstant};
pub use sim_notifications::SimNotificationService;
pub use sim_server::{SharedBackend, SimBackend, create_shared_backend, lock_backend};
pub use sim_upload::SimUploader;
pub use world::{SimFailure, SimRuntime, SimStats, SimWorld};
