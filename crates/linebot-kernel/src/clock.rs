//! [`Clock`] – the time source behind every wait in the control core.
//!
//! Behaviours never call `std::thread::sleep` directly.  They sleep through a
//! `Clock` so tests can swap in [`SimClock`], whose virtual time advances by
//! exactly the amount slept.  A fifteen-second recovery then runs in
//! microseconds and its timeout is hit deterministically.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Monotonic time source.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's epoch.
    fn now(&self) -> Duration;

    /// Block the calling thread for `duration`.
    fn sleep(&self, duration: Duration);
}

/// Wall-clock implementation backed by [`Instant`].
#[derive(Debug, Clone)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }

    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

/// Virtual clock for tests.  Clones share the same timeline.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use linebot_kernel::clock::{Clock, SimClock};
///
/// let clock = SimClock::new();
/// clock.sleep(Duration::from_secs(15));
/// assert_eq!(clock.now(), Duration::from_secs(15));
/// ```
#[derive(Debug, Clone, Default)]
pub struct SimClock {
    now: Arc<Mutex<Duration>>,
}

impl SimClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Move virtual time forward without sleeping.
    pub fn advance(&self, duration: Duration) {
        let mut now = self.now.lock().unwrap_or_else(|e| e.into_inner());
        *now += duration;
    }
}

impl Clock for SimClock {
    fn now(&self) -> Duration {
        *self.now.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn sleep(&self, duration: Duration) {
        self.advance(duration);
        // Lets a test thread observe a behaviour thread that only sleeps.
        std::thread::yield_now();
    }
}

/// Shared handle to any clock.
pub type SharedClock = Arc<dyn Clock>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sim_clock_advances_on_sleep() {
        let clock = SimClock::new();
        assert_eq!(clock.now(), Duration::ZERO);
        clock.sleep(Duration::from_millis(250));
        clock.sleep(Duration::from_millis(250));
        assert_eq!(clock.now(), Duration::from_millis(500));
    }

    #[test]
    fn sim_clock_clones_share_time() {
        let a = SimClock::new();
        let b = a.clone();
        a.advance(Duration::from_secs(3));
        assert_eq!(b.now(), Duration::from_secs(3));
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let t0 = clock.now();
        clock.sleep(Duration::from_millis(2));
        assert!(clock.now() >= t0 + Duration::from_millis(2));
    }
}
