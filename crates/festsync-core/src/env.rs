//! Environment abstraction for deterministic testing.
//!
//! Decouples sync logic from the system clock. Production uses real time;
//! the simulation harness uses a virtual clock it advances explicitly, so
//! typing expiry and stalled-send detection can be tested without sleeping.

use std::{
    fmt::Debug,
    future::Future,
    ops::{Add, Sub},
    time::Duration,
};

/// Instant type usable by the state machines.
///
/// Blanket-implemented for anything monotonic that supports duration
/// arithmetic, e.g. `std::time::Instant`.
pub trait MonotonicInstant:
    Copy + Ord + Send + Sync + Debug + Sub<Output = Duration> + Add<Duration, Output = Self>
{
}

impl<T> MonotonicInstant for T where
    T: Copy + Ord + Send + Sync + Debug + Sub<Output = Duration> + Add<Duration, Output = T>
{
}

/// Abstract environment providing time and async sleeping.
///
/// # Invariants
///
/// - `now()` never goes backwards within one execution context
pub trait Environment: Clone + Send + Sync + 'static {
    /// The instant type used by this environment.
    ///
    /// Production uses `std::time::Instant`, simulation a virtual instant.
    type Instant: MonotonicInstant;

    /// Current time (monotonic).
    fn now(&self) -> Self::Instant;

    /// Sleeps for the specified duration.
    ///
    /// Only driver code calls this. State machines never sleep; they expose
    /// deadlines instead.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}
