//! [`RecoveryProcedure`] – bounded camera-assisted search for a lost line.
//!
//! # Sequence
//!
//! 1. Stop, tilt the camera fully down and let it settle.
//! 2. Reverse at search speed, steered away from the side the robot was
//!    turning towards when the line was lost.
//! 3. Up to `max_attempts` attempts, while the `timeout` has not expired:
//!    * scan the candidate pan angles;
//!    * found: steer by angle bucket, creep forward, verify on the
//!      reflectance sensors (middle sensor or two sensors = reacquired);
//!      a single outer sensor gets a slight correction and one re-check;
//!      nothing at all backs off a little;
//!    * not found (or the camera failed): creep forward steered alternately
//!      left and right to change the vantage point.
//! 4. Restore the head and centre the steering.
//!
//! A stop request aborts at the next step boundary and forces propulsion to
//! stop before [`BotError::Interrupted`] is returned.

use std::time::Duration;

use linebot_perception::LineScanner;
use linebot_types::{BotError, Direction, ScanResult};
use serde::Serialize;
use tracing::{debug, info, info_span, warn};

use crate::config::ms;
use crate::maneuver::Maneuver;
use crate::steering::{Bucket, Steer};

/// How one attempt ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum AttemptOutcome {
    /// Middle sensor, or two sensors, on the line after the approach.
    Reacquired,
    /// A single sensor after the approach, confirmed after a correction.
    PartialReacquired,
    /// A single sensor after the approach, lost again after the correction.
    ApproachMissed,
    /// Line seen by the camera but no sensor touched it; backed off.
    NoContact,
    NotFound,
    /// The camera could not deliver a usable frame; handled as not found.
    VisionFault,
}

impl AttemptOutcome {
    pub fn reacquired(self) -> bool {
        matches!(self, AttemptOutcome::Reacquired | AttemptOutcome::PartialReacquired)
    }
}

/// One attempt inside a single recovery call.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RecoveryAttempt {
    /// 1-based.
    pub index: u32,
    /// Time since the recovery started, taken when the attempt ended.
    pub elapsed: Duration,
    pub outcome: AttemptOutcome,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RecoveryReport {
    pub reacquired: bool,
    pub attempts: Vec<RecoveryAttempt>,
    pub elapsed: Duration,
}

pub struct RecoveryProcedure<'m, 'a> {
    ops: &'m mut Maneuver<'a>,
    scanner: &'m mut dyn LineScanner,
}

impl<'m, 'a> RecoveryProcedure<'m, 'a> {
    pub fn new(ops: &'m mut Maneuver<'a>, scanner: &'m mut dyn LineScanner) -> Self {
        Self { ops, scanner }
    }

    /// Try to bring the line back under the reflectance sensors.
    ///
    /// # Errors
    ///
    /// Only [`BotError::Interrupted`]; every hardware fault is absorbed.
    pub fn recover(&mut self, last_steering_angle: f32) -> Result<RecoveryReport, BotError> {
        let span = info_span!("recovery", last_steering_angle);
        let _enter = span.enter();

        self.ops.steering.set_recovery(true);
        let result = self.run(last_steering_angle);
        self.ops.steering.set_recovery(false);

        match result {
            Ok(report) => {
                info!(
                    reacquired = report.reacquired,
                    attempts = report.attempts.len(),
                    elapsed_ms = report.elapsed.as_millis() as u64,
                    "recovery finished"
                );
                Ok(report)
            }
            Err(e) => {
                self.ops.stop();
                info!(error = %e, "recovery aborted");
                Err(e)
            }
        }
    }

    fn run(&mut self, last_steering_angle: f32) -> Result<RecoveryReport, BotError> {
        let config = self.ops.config;
        let cfg = &config.recovery;
        let deadline = self.ops.pacer.deadline(ms(cfg.timeout_ms));

        // 1. Stop and look down.
        self.ops.stop();
        self.ops.tilt(config.head.tilt_very_down);
        self.ops.hold_ms(cfg.tilt_settle_ms)?;

        // 2. Reverse, un-crossing the turn that lost the line.
        let bias = if last_steering_angle > config.steering.center {
            Steer::SharpRight
        } else {
            Steer::SharpLeft
        };
        debug!(?bias, "reversing away from the last turn");
        self.ops.pacer.check()?;
        self.ops
            .steered_creep(bias, Direction::Reverse, config.speeds.search, cfg.reverse_ms)?;
        self.ops.hold_ms(cfg.stabilise_ms)?;

        // 3. Bounded scan / approach loop.
        let mut attempts = Vec::new();
        let mut reacquired = false;
        for index in 1..=cfg.max_attempts {
            if deadline.expired() {
                warn!(attempt = index, "recovery timeout reached");
                break;
            }
            if index > 1 {
                self.ops.hold_ms(cfg.between_attempts_ms)?;
            }
            let outcome = self.attempt(index)?;
            debug!(attempt = index, ?outcome, "recovery attempt done");
            attempts.push(RecoveryAttempt {
                index,
                elapsed: deadline.elapsed(),
                outcome,
            });
            if outcome.reacquired() {
                reacquired = true;
                break;
            }
        }

        // 4. Neutral head, centred wheels.
        self.ops.pacer.check()?;
        self.ops.restore_pose();

        Ok(RecoveryReport {
            reacquired,
            attempts,
            elapsed: deadline.elapsed(),
        })
    }

    fn attempt(&mut self, index: u32) -> Result<AttemptOutcome, BotError> {
        let config = self.ops.config;
        let cfg = &config.recovery;
        let speeds = &config.speeds;

        let (scan, faulted) =
            match self
                .scanner
                .scan_for_line(self.ops.rig.pan_mut(), &cfg.scan_angles, self.ops.pacer)
            {
                Ok(scan) => (scan, false),
                Err(e) if e.is_interrupted() => return Err(e),
                Err(e) => {
                    warn!(attempt = index, error = %e, "scan failed, treating as not found");
                    (ScanResult::not_found(), true)
                }
            };
        self.ops.pacer.check()?;

        let Some(angle) = scan.angle.filter(|_| scan.found) else {
            let reposition = if index % 2 == 1 {
                Steer::TurnLeft
            } else {
                Steer::TurnRight
            };
            self.ops
                .steered_creep(reposition, Direction::Forward, speeds.search, cfg.reposition_ms)?;
            return Ok(if faulted {
                AttemptOutcome::VisionFault
            } else {
                AttemptOutcome::NotFound
            });
        };

        let bucket = Bucket::of(angle, config.head.pan_center, cfg.near_offset, cfg.far_offset);
        let steer = bucket.steer();
        info!(attempt = index, angle, ?bucket, ?steer, "line spotted by camera");

        self.ops.steer(steer);
        self.ops.hold_ms(cfg.steer_settle_ms)?;
        self.ops
            .creep(Direction::Forward, speeds.recovery, cfg.approach_ms)?;
        self.ops.hold_ms(cfg.verify_pause_ms)?;

        let pattern = self.ops.read_pattern();
        if pattern.is_centered() {
            return Ok(AttemptOutcome::Reacquired);
        }
        if pattern.any() {
            // Same sense as the tracking table: left sensor steers right.
            let correction = if pattern.left {
                Steer::SlightRight
            } else {
                Steer::SlightLeft
            };
            debug!(%pattern, ?correction, "partial detection, correcting");
            self.ops.pacer.check()?;
            self.ops.steered_creep(
                correction,
                Direction::Forward,
                speeds.search,
                cfg.partial_creep_ms,
            )?;
            return Ok(if self.ops.read_pattern().any() {
                AttemptOutcome::PartialReacquired
            } else {
                AttemptOutcome::ApproachMissed
            });
        }

        self.ops
            .creep(Direction::Reverse, speeds.search, cfg.backoff_ms)?;
        Ok(AttemptOutcome::NoContact)
    }
}
