//! `linebot-runtime` – the control core of the line-following robot.
//!
//! # Modules
//!
//! - [`config`] – [`RobotConfig`][config::RobotConfig]: every tunable
//!   (steering table, speeds, head positions, limits, timings, escalation
//!   policy) as a serde-friendly struct with [`validate`][config::RobotConfig::validate].
//! - [`classifier`] – [`classify`][classifier::classify]: pure reflectance
//!   pattern → [`Action`][linebot_types::Action] table.
//! - [`steering`] – named [`Steer`][steering::Steer] positions, the tracker's
//!   [`SteeringState`][steering::SteeringState] and the camera-angle
//!   [`Bucket`][steering::Bucket] mapping.
//! - [`maneuver`] – [`Maneuver`][maneuver::Maneuver]: fault-tolerant
//!   actuation helpers shared by every behaviour.
//! - [`tracker`] – [`LineTracker`][tracker::LineTracker]: the
//!   Tracking/Recovering state machine.
//! - [`recovery`] – [`RecoveryProcedure`][recovery::RecoveryProcedure]:
//!   bounded camera-assisted search after the line is lost.
//! - [`extreme`] – [`ExtremeRecovery`][extreme::ExtremeRecovery]: wider
//!   search used when the escalation policy asks for it.
//! - [`obstacle`] – [`ObstacleAvoidance`][obstacle::ObstacleAvoidance]:
//!   range threshold check and scripted detour.
//! - [`navigator`] – [`ArrowNavigator`][navigator::ArrowNavigator]: maze
//!   mode, turning on arrow markers at each wall.
//! - [`status`] – shared [`StatusBoard`][status::StatusBoard] and
//!   [`ObstacleThreshold`][status::ObstacleThreshold].
//! - [`supervisor`] – [`Supervisor`][supervisor::Supervisor]: owns the
//!   hardware, runs one behaviour thread at a time, exposes
//!   `start/stop/is_running/status/set_obstacle_threshold`.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: log
//!   formatting and optional OTLP span export.

pub mod classifier;
pub mod config;
pub mod extreme;
pub mod maneuver;
pub mod navigator;
pub mod obstacle;
pub mod recovery;
pub mod status;
pub mod steering;
pub mod supervisor;
pub mod telemetry;
pub mod tracker;

#[cfg(test)]
mod testkit;

pub use classifier::classify;
pub use config::{EscalationPolicy, RobotConfig};
pub use extreme::ExtremeRecovery;
pub use navigator::ArrowNavigator;
pub use obstacle::{DetourReport, ObstacleAvoidance};
pub use recovery::{RecoveryProcedure, RecoveryReport};
pub use status::{ObstacleThreshold, StatusBoard};
pub use supervisor::{Hardware, Supervisor};
pub use telemetry::{TracerProviderGuard, init_tracing};
pub use tracker::{LineTracker, TickOutcome, TrackerState};
