//! [`ExtremeRecovery`] – the deeper fallback after a failed recovery.
//!
//! Same scan and verify discipline as
//! [`RecoveryProcedure`][crate::recovery::RecoveryProcedure], with a wider
//! search:
//!
//! * a longer reverse, steered fully to the side of the last turn;
//! * a forward sweep steered fully to the opposite side, swinging the camera
//!   through a much larger arc;
//! * angle buckets mapped to the extreme steering positions;
//! * strict verification (middle sensor or two sensors) both after the
//!   approach and after a partial correction;
//! * between attempts, a reverse steered to alternating extremes.
//!
//! Bounded by both `max_attempts` and `timeout`.

use linebot_perception::LineScanner;
use linebot_types::{BotError, Direction, ScanResult};
use tracing::{debug, info, info_span, warn};

use crate::config::ms;
use crate::maneuver::Maneuver;
use crate::recovery::{AttemptOutcome, RecoveryAttempt, RecoveryReport};
use crate::steering::{Bucket, Steer};

pub struct ExtremeRecovery<'m, 'a> {
    ops: &'m mut Maneuver<'a>,
    scanner: &'m mut dyn LineScanner,
}

impl<'m, 'a> ExtremeRecovery<'m, 'a> {
    pub fn new(ops: &'m mut Maneuver<'a>, scanner: &'m mut dyn LineScanner) -> Self {
        Self { ops, scanner }
    }

    /// # Errors
    ///
    /// Only [`BotError::Interrupted`].
    pub fn recover(&mut self, last_steering_angle: f32) -> Result<RecoveryReport, BotError> {
        let span = info_span!("extreme_recovery", last_steering_angle);
        let _enter = span.enter();

        self.ops.steering.set_recovery(true);
        let result = self.run(last_steering_angle);
        self.ops.steering.set_recovery(false);

        if result.is_err() {
            self.ops.stop();
        }
        if let Ok(report) = &result {
            info!(
                reacquired = report.reacquired,
                attempts = report.attempts.len(),
                "extreme recovery finished"
            );
        }
        result
    }

    fn run(&mut self, last_steering_angle: f32) -> Result<RecoveryReport, BotError> {
        let config = self.ops.config;
        let cfg = &config.extreme;
        let search = config.speeds.search;
        let deadline = self.ops.pacer.deadline(ms(cfg.timeout_ms));

        let (back, sweep) = if last_steering_angle > config.steering.center {
            (Steer::ExtremeLeft, Steer::ExtremeRight)
        } else {
            (Steer::ExtremeRight, Steer::ExtremeLeft)
        };

        self.ops.stop();
        self.ops.tilt(config.head.tilt_very_down);
        self.ops.hold_ms(cfg.settle_ms)?;
        self.ops
            .steered_creep(back, Direction::Reverse, search, cfg.reverse_ms)?;
        self.ops.pacer.check()?;
        self.ops
            .steered_creep(sweep, Direction::Forward, search, cfg.sweep_ms)?;

        let mut attempts = Vec::new();
        let mut reacquired = false;
        for index in 1..=cfg.max_attempts {
            if deadline.expired() {
                warn!(attempt = index, "extreme recovery timeout reached");
                break;
            }
            if index > 1 {
                // Alternate the reverse direction to move the vantage point.
                let backoff = if index % 2 == 0 {
                    Steer::ExtremeLeft
                } else {
                    Steer::ExtremeRight
                };
                self.ops.pacer.check()?;
                self.ops
                    .steered_creep(backoff, Direction::Reverse, search, cfg.backoff_ms)?;
                self.ops.hold_ms(cfg.between_attempts_ms)?;
            }

            let outcome = self.attempt(index)?;
            debug!(attempt = index, ?outcome, "extreme attempt done");
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
        let cfg = &config.extreme;
        let search = config.speeds.search;

        self.ops.hold_ms(cfg.settle_ms)?;
        let (scan, faulted) = match self.scanner.scan_for_line(
            self.ops.rig.pan_mut(),
            &config.recovery.scan_angles,
            self.ops.pacer,
        ) {
            Ok(scan) => (scan, false),
            Err(e) if e.is_interrupted() => return Err(e),
            Err(e) => {
                warn!(attempt = index, error = %e, "scan failed, treating as not found");
                (ScanResult::not_found(), true)
            }
        };
        self.ops.pacer.check()?;

        let Some(angle) = scan.angle.filter(|_| scan.found) else {
            return Ok(if faulted {
                AttemptOutcome::VisionFault
            } else {
                AttemptOutcome::NotFound
            });
        };

        let bucket = Bucket::of(
            angle,
            config.head.pan_center,
            config.recovery.near_offset,
            config.recovery.far_offset,
        );
        let steer = bucket.extreme_steer();
        info!(attempt = index, angle, ?bucket, ?steer, "line spotted by camera");
        self.ops
            .steered_creep(steer, Direction::Forward, search, cfg.approach_ms)?;

        let pattern = self.ops.read_pattern();
        if pattern.is_centered() {
            return Ok(AttemptOutcome::Reacquired);
        }
        if pattern.any() {
            let correction = if pattern.left {
                Steer::SlightRight
            } else {
                Steer::SlightLeft
            };
            self.ops.pacer.check()?;
            self.ops
                .steered_creep(correction, Direction::Forward, search, cfg.partial_creep_ms)?;
            return Ok(if self.ops.read_pattern().is_centered() {
                AttemptOutcome::PartialReacquired
            } else {
                AttemptOutcome::ApproachMissed
            });
        }
        Ok(AttemptOutcome::NoContact)
    }
}
