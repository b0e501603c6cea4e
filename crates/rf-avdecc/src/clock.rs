//! Monotonic time source
//!
//! All engine timeouts are absolute deadlines computed from a
//! [`Clock`]. The trait exists so tests can drive the scheduler
//! deterministically; production uses [`MonotonicClock`].

use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Strictly monotonic time source
pub trait Clock {
    fn now(&self) -> Instant;
}

/// The process monotonic clock
#[derive(Debug, Clone, Copy, Default)]
pub struct MonotonicClock;

impl Clock for MonotonicClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Manually advanced clock for deterministic tests. Never retreats:
/// the only mutation is [`advance`](Self::advance).
#[derive(Debug, Clone)]
pub struct ManualClock {
    base: Instant,
    offset: Arc<Mutex<Duration>>,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            base: Instant::now(),
            offset: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn advance(&self, delta: Duration) {
        *self.offset.lock() += delta;
    }

    /// Current instant; identical to the [`Clock`] impl, usable
    /// without the trait in scope.
    pub fn now(&self) -> Instant {
        self.base + *self.offset.lock()
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        ManualClock::now(self)
    }
}
