//! Festsync core.
//!
//! Building blocks shared by every sync component:
//!
//! - [`env::Environment`]: time abstraction so state machines can run against
//!   the wall clock in production and a virtual clock in simulation.
//! - [`connection::Connection`]: the connection manager. Owns the lifecycle of
//!   the single persistent channel and publishes the "is live" signal every
//!   other component gates on.
//! - [`config::SyncConfig`]: tunables for timers, page sizes and limits.
//!
//! Everything here is Sans-IO: methods take the current instant as input and
//! return actions for a driver to execute.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod config;
pub mod connection;
pub mod env;
pub mod error;
pub mod system_env;

pub use config::SyncConfig;
pub use connection::{Connection, ConnectionAction, ConnectionState, Identity};
pub use env::{Environment, MonotonicInstant};
pub use error::ConnectionError;
pub use system_env::SystemEnv;
