//! Wall-clock environment for the production runtime.

use std::time::{Duration, Instant};

use crate::env::Environment;

/// Reads `std::time::Instant` and sleeps on the tokio timer.
///
/// `sleep` must be awaited inside a tokio runtime with the time driver
/// enabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// The system clock.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}
