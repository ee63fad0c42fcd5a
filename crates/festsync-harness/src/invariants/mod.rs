//! Whole-deployment invariants.
//!
//! After each simulated step the world is flattened into a
//! [`SystemSnapshot`]: every client's logs, typing sets and feed, plus the
//! backend's stored history. Each [`Invariant`] inspects that snapshot and
//! either passes or names the first thing it found wrong.
//!
//! Two registries are provided. [`InvariantRegistry::standard`] holds
//! properties that must survive any interleaving of drops, retries and time
//! jumps. [`InvariantRegistry::quiescent`] adds convergence, which is only
//! expected once every client is live and the backend has gone quiet.
//!
//! ```ignore
//! world.apply(&op).await;
//! InvariantRegistry::standard().check_all(&world.snapshot())?;
//! ```

mod checks;
mod snapshot;

use std::fmt;

pub use checks::{
    LocalUserNeverTyping, LogConvergence, LogsSorted, NoPhantomMessages, UniqueMessageIds,
    UniqueNotifications, UnreadBadgeMatches,
};
pub use snapshot::{ClientSnapshot, FeedSnapshot, SystemSnapshot};

/// Outcome of a single check.
pub type InvariantResult = Result<(), Violation>;

/// A broken invariant and what the check saw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Violation {
    /// Which check failed.
    pub invariant: &'static str,
    /// Observed state, phrased for a test failure message.
    pub message: String,
}

impl Violation {
    /// Violation of `invariant` described by `message`.
    pub fn new(invariant: &'static str, message: impl Into<String>) -> Self {
        Self { invariant, message: message.into() }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// A property of the snapshot.
pub trait Invariant: Send + Sync {
    /// Stable identifier used in reports.
    fn name(&self) -> &'static str;

    /// Inspect the snapshot. Stops at the first offending client.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Ordered set of checks run together.
#[derive(Default)]
pub struct InvariantRegistry {
    checks: Vec<Box<dyn Invariant>>,
}

impl InvariantRegistry {
    /// Registry with no checks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Checks that hold after every step, online or not.
    pub fn standard() -> Self {
        Self::new()
            .with(LogsSorted)
            .with(UniqueMessageIds)
            .with(NoPhantomMessages)
            .with(UniqueNotifications)
            .with(UnreadBadgeMatches)
            .with(LocalUserNeverTyping)
    }

    /// [`Self::standard`] plus [`LogConvergence`].
    pub fn quiescent() -> Self {
        Self::standard().with(LogConvergence)
    }

    /// Builder form of [`Self::add`].
    #[must_use]
    pub fn with(mut self, invariant: impl Invariant + 'static) -> Self {
        self.add(invariant);
        self
    }

    /// Register another check. Checks run in registration order.
    pub fn add(&mut self, invariant: impl Invariant + 'static) {
        self.checks.push(Box::new(invariant));
    }

    /// Names of the registered checks, in run order.
    pub fn names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.checks.iter().map(|check| check.name())
    }

    /// Run every check, collecting one violation per failing check.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<Violation> =
            self.checks.iter().filter_map(|check| check.check(state).err()).collect();

        if violations.is_empty() {
            return Ok(());
        }
        Err(violations)
    }

    /// Number of registered checks.
    pub fn len(&self) -> usize {
        self.checks.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysFails;

    impl Invariant for AlwaysFails {
        fn name(&self) -> &'static str {
            "always_fails"
        }

        fn check(&self, _: &SystemSnapshot) -> InvariantResult {
            Err(Violation::new(self.name(), "as configured"))
        }
    }

    #[test]
    fn quiescent_extends_standard() {
        let standard: Vec<_> = InvariantRegistry::standard().names().collect();
        let quiescent: Vec<_> = InvariantRegistry::quiescent().names().collect();

        assert_eq!(standard.len(), 6);
        assert_eq!(&quiescent[..6], &standard[..]);
        assert_eq!(quiescent[6], "log_convergence");
    }

    #[test]
    fn empty_deployment_is_consistent() {
        assert!(InvariantRegistry::quiescent().check_all(&SystemSnapshot::empty()).is_ok());
    }

    #[test]
    fn every_failing_check_is_reported() {
        let registry = InvariantRegistry::standard().with(AlwaysFails).with(AlwaysFails);
        let violations = registry.check_all(&SystemSnapshot::empty()).unwrap_err();

        assert_eq!(violations.len(), 2);
        assert_eq!(violations[0].to_string(), "[always_fails] as configured");
    }
}
