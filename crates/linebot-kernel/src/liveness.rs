//! Cooperative cancellation: [`StopToken`], [`Pacer`] and [`Deadline`].
//!
//! A running behaviour checks its `StopToken` between every blocking step.
//! Every wait goes through [`Pacer::hold`], which sleeps in short slices and
//! re-checks the token between slices, so an external stop interrupts even a
//! multi-second reverse within one slice.
//!
//! | Call | Returns once stopped |
//! |---|---|
//! | [`Pacer::check`] | `Err(BotError::Interrupted)` |
//! | [`Pacer::hold`]  | `Err(BotError::Interrupted)` within one slice |

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use linebot_types::BotError;
use tracing::debug;

use crate::clock::SharedClock;

/// Default granularity of [`Pacer::hold`].
pub const DEFAULT_SLICE: Duration = Duration::from_millis(20);

/// Shared liveness flag.  Clones observe the same flag.
#[derive(Debug, Clone, Default)]
pub struct StopToken {
    stopped: Arc<AtomicBool>,
}

impl StopToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request a stop.  Idempotent.
    pub fn stop(&self) {
        if !self.stopped.swap(true, Ordering::SeqCst) {
            debug!("stop requested");
        }
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }
}

/// Clock plus stop token: the only way behaviour code waits.
#[derive(Clone)]
pub struct Pacer {
    clock: SharedClock,
    token: StopToken,
    slice: Duration,
}

impl Pacer {
    pub fn new(clock: SharedClock, token: StopToken) -> Self {
        Self {
            clock,
            token,
            slice: DEFAULT_SLICE,
        }
    }

    /// Override the wait granularity.  A zero slice is replaced by the
    /// default.
    pub fn with_slice(mut self, slice: Duration) -> Self {
        if !slice.is_zero() {
            self.slice = slice;
        }
        self
    }

    pub fn token(&self) -> &StopToken {
        &self.token
    }

    pub fn clock(&self) -> &SharedClock {
        &self.clock
    }

    /// Current clock reading.
    pub fn now(&self) -> Duration {
        self.clock.now()
    }

    /// # Errors
    ///
    /// Returns [`BotError::Interrupted`] once a stop has been requested.
    pub fn check(&self) -> Result<(), BotError> {
        if self.token.is_stopped() {
            Err(BotError::Interrupted)
        } else {
            Ok(())
        }
    }

    /// Wait for `duration`, checking the stop token before and after every
    /// slice.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Interrupted`] as soon as a stop is observed.
    pub fn hold(&self, duration: Duration) -> Result<(), BotError> {
        self.check()?;
        let mut remaining = duration;
        while !remaining.is_zero() {
            let step = remaining.min(self.slice);
            self.clock.sleep(step);
            remaining -= step;
            self.check()?;
        }
        Ok(())
    }

    /// Start a wall-clock budget of `timeout` from now.
    pub fn deadline(&self, timeout: Duration) -> Deadline {
        Deadline {
            clock: Arc::clone(&self.clock),
            started: self.clock.now(),
            timeout,
        }
    }
}

/// A timeout measured on the pacer's clock.
pub struct Deadline {
    clock: SharedClock,
    started: Duration,
    timeout: Duration,
}

impl Deadline {
    pub fn elapsed(&self) -> Duration {
        self.clock.now().saturating_sub(self.started)
    }

    pub fn expired(&self) -> bool {
        self.elapsed() >= self.timeout
    }

    pub fn remaining(&self) -> Duration {
        self.timeout.saturating_sub(self.elapsed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::{Clock, SimClock};

    /// Clock that raises the stop token after a fixed number of sleeps.
    struct StoppingClock {
        inner: SimClock,
        token: StopToken,
        stop_after: usize,
        sleeps: std::sync::Mutex<usize>,
    }

    impl Clock for StoppingClock {
        fn now(&self) -> Duration {
            self.inner.now()
        }

        fn sleep(&self, duration: Duration) {
            self.inner.sleep(duration);
            let mut sleeps = self.sleeps.lock().unwrap();
            *sleeps += 1;
            if *sleeps == self.stop_after {
                self.token.stop();
            }
        }
    }

    fn sim_pacer() -> (Pacer, SimClock) {
        let clock = SimClock::new();
        (Pacer::new(Arc::new(clock.clone()), StopToken::new()), clock)
    }

    #[test]
    fn hold_advances_virtual_time() {
        let (pacer, clock) = sim_pacer();
        pacer.hold(Duration::from_millis(2_000)).unwrap();
        assert_eq!(clock.now(), Duration::from_millis(2_000));
    }

    #[test]
    fn hold_zero_only_checks() {
        let (pacer, clock) = sim_pacer();
        pacer.hold(Duration::ZERO).unwrap();
        assert_eq!(clock.now(), Duration::ZERO);
        pacer.token().stop();
        assert_eq!(pacer.hold(Duration::ZERO), Err(BotError::Interrupted));
    }

    #[test]
    fn stop_interrupts_hold_within_one_slice() {
        let token = StopToken::new();
        let clock = StoppingClock {
            inner: SimClock::new(),
            token: token.clone(),
            stop_after: 3,
            sleeps: std::sync::Mutex::new(0),
        };
        let sim = clock.inner.clone();
        let pacer = Pacer::new(Arc::new(clock), token);
        let result = pacer.hold(Duration::from_secs(2));
        assert_eq!(result, Err(BotError::Interrupted));
        assert_eq!(sim.now(), DEFAULT_SLICE * 3);
    }

    #[test]
    fn check_after_stop_is_interrupted() {
        let (pacer, _) = sim_pacer();
        assert!(pacer.check().is_ok());
        let other = pacer.token().clone();
        other.stop();
        assert!(pacer.check().unwrap_err().is_interrupted());
    }

    #[test]
    fn deadline_expires_on_virtual_time() {
        let (pacer, clock) = sim_pacer();
        let deadline = pacer.deadline(Duration::from_secs(15));
        assert!(!deadline.expired());
        clock.advance(Duration::from_secs(14));
        assert_eq!(deadline.remaining(), Duration::from_secs(1));
        clock.advance(Duration::from_secs(1));
        assert!(deadline.expired());
    }

    #[test]
    fn custom_slice_is_used() {
        let (pacer, clock) = sim_pacer();
        let pacer = pacer.with_slice(Duration::from_millis(500));
        pacer.hold(Duration::from_millis(1_200)).unwrap();
        assert_eq!(clock.now(), Duration::from_millis(1_200));
    }
}
