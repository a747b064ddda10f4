//! Timing and cancellation primitives shared by every behaviour.
//!
//! * [`clock`] – [`Clock`] trait, [`SystemClock`] and the virtual [`SimClock`].
//! * [`liveness`] – [`StopToken`], [`Pacer`] and [`Deadline`].

pub mod clock;
pub mod liveness;

pub use clock::{Clock, SharedClock, SimClock, SystemClock};
pub use liveness::{DEFAULT_SLICE, Deadline, Pacer, StopToken};
