//! Virtual-time environment for deterministic simulation.
//!
//! [`SimEnv`] implements [`Environment`] with a clock that only moves when
//! the harness advances it, plus a seeded RNG shared by every clone. Two runs
//! with the same seed make the same choices at the same virtual instants.

use std::{
    ops::{Add, Sub},
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use festsync_core::Environment;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// A point on the virtual clock, measured from simulation start.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SimInstant(Duration);

impl SimInstant {
    /// Time elapsed since the simulation started.
    pub fn since_start(self) -> Duration {
        self.0
    }
}

impl Add<Duration> for SimInstant {
    type Output = Self;

    fn add(self, rhs: Duration) -> Self {
        Self(self.0 + rhs)
    }
}

impl Sub for SimInstant {
    type Output = Duration;

    fn sub(self, rhs: Self) -> Duration {
        self.0.saturating_sub(rhs.0)
    }
}

struct SimState {
    now: SimInstant,
    rng: ChaCha8Rng,
}

/// Deterministic environment shared by every simulated component.
///
/// Cloning is cheap and every clone observes the same clock and draws from
/// the same RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    seed: u64,
    state: Arc<Mutex<SimState>>,
}

impl std::fmt::Debug for SimEnv {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimEnv").field("seed", &self.seed).field("now", &self.now()).finish()
    }
}

impl SimEnv {
    /// Create an environment at virtual time zero.
    pub fn with_seed(seed: u64) -> Self {
        let state = SimState { now: SimInstant::default(), rng: ChaCha8Rng::seed_from_u64(seed) };
        Self { seed, state: Arc::new(Mutex::new(state)) }
    }

    /// Seed this environment was created with.
    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Move the virtual clock forward.
    pub fn advance(&self, by: Duration) -> SimInstant {
        let mut state = self.lock();
        state.now = state.now + by;
        state.now
    }

    /// Uniform draw from `0..upper`. Returns 0 when `upper` is 0.
    pub fn below(&self, upper: u64) -> u64 {
        if upper == 0 {
            return 0;
        }
        self.lock().rng.gen_range(0..upper)
    }

    /// Bernoulli draw.
    pub fn chance(&self, probability: f64) -> bool {
        self.lock().rng.gen_bool(probability.clamp(0.0, 1.0))
    }

    /// Pick one element of a slice.
    pub fn pick<'a, T>(&self, items: &'a [T]) -> Option<&'a T> {
        items.get(self.below(items.len() as u64) as usize)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Environment for SimEnv {
    type Instant = SimInstant;

    fn now(&self) -> SimInstant {
        self.lock().now
    }

    /// Sleeping in simulation is advancing the clock.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        self.advance(duration);
        std::future::ready(())
    }
}
