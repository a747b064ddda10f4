//! [`ObstacleAvoidance`] – threshold check on the range sensor and the
//! scripted detour around whatever tripped it.
//!
//! The check is level-triggered: every call reads the range sensor once and
//! compares with the shared [`ObstacleThreshold`] using a strict `<`.  A
//! missing echo or a failed read never triggers.
//!
//! # Detour
//!
//! | Step | Action |
//! |---|---|
//! | 1 | stop propulsion (the only stop before any steering) |
//! | 2 | pan left, read; pan right, read; recentre the pan |
//! | 3 | open side = greater clearance (no echo = unlimited, ties go left) |
//! | 4 | reverse, steered toward the closer side |
//! | 5 | advance, steered toward the open side |
//! | 6 | advance with the mirrored steer to come back |
//! | 7 | centre the steering |
//!
//! Nothing persists between calls except the threshold.

use linebot_types::{BotError, Direction, Distance};
use serde::Serialize;
use tracing::{debug, info, info_span};

use crate::maneuver::Maneuver;
use crate::status::ObstacleThreshold;
use crate::steering::Steer;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Side {
    Left,
    Right,
}

/// What a detour saw and which way it went.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct DetourReport {
    /// Reading that triggered the detour.
    pub distance: Distance,
    pub left_clearance: Distance,
    pub right_clearance: Distance,
    pub open_side: Side,
}

#[derive(Debug, Clone)]
pub struct ObstacleAvoidance {
    threshold: ObstacleThreshold,
}

impl ObstacleAvoidance {
    pub fn new(threshold: ObstacleThreshold) -> Self {
        Self { threshold }
    }

    pub fn threshold(&self) -> &ObstacleThreshold {
        &self.threshold
    }

    /// Read the range sensor once; detour when something is closer than the
    /// threshold.
    ///
    /// # Errors
    ///
    /// Only [`BotError::Interrupted`], in which case propulsion has been
    /// stopped.
    pub fn check(&self, ops: &mut Maneuver<'_>) -> Result<Option<DetourReport>, BotError> {
        if !ops.rig.has_range_sensor() {
            return Ok(None);
        }
        let distance = ops.read_distance();
        let threshold = self.threshold.get();
        if !distance.is_within(threshold) {
            return Ok(None);
        }
        info!(?distance, ?threshold, "obstacle ahead");
        let result = self.detour(ops, distance);
        if result.is_err() {
            ops.stop();
        }
        result.map(Some)
    }

    fn detour(&self, ops: &mut Maneuver<'_>, distance: Distance) -> Result<DetourReport, BotError> {
        let span = info_span!("detour", ?distance);
        let _enter = span.enter();

        let config = ops.config;
        let cfg = &config.obstacle;
        let center = config.head.pan_center;
        let search = config.speeds.search;

        ops.stop();

        ops.pan(center + cfg.probe_offset);
        ops.hold_ms(cfg.probe_settle_ms)?;
        let left_clearance = ops.read_distance();
        ops.pan(center - cfg.probe_offset);
        ops.hold_ms(cfg.probe_settle_ms)?;
        let right_clearance = ops.read_distance();
        ops.pan(center);

        let open_side = if clearance(left_clearance) >= clearance(right_clearance) {
            Side::Left
        } else {
            Side::Right
        };
        let toward_open = match open_side {
            Side::Left => Steer::SharpLeft,
            Side::Right => Steer::SharpRight,
        };
        debug!(?left_clearance, ?right_clearance, ?open_side, "clearances probed");

        ops.pacer.check()?;
        ops.steered_creep(toward_open.mirrored(), Direction::Reverse, search, cfg.reverse_ms)?;
        ops.pacer.check()?;
        ops.steered_creep(toward_open, Direction::Forward, search, cfg.advance_ms)?;
        ops.pacer.check()?;
        ops.steered_creep(toward_open.mirrored(), Direction::Forward, search, cfg.return_ms)?;
        ops.steer(Steer::Center);

        Ok(DetourReport {
            distance,
            left_clearance,
            right_clearance,
            open_side,
        })
    }

    /// One cycle of the stand-alone avoidance behaviour: detour if blocked,
    /// otherwise cruise straight ahead.
    ///
    /// # Errors
    ///
    /// Only [`BotError::Interrupted`].
    pub fn cruise(&self, ops: &mut Maneuver<'_>) -> Result<Option<DetourReport>, BotError> {
        ops.pacer.check()?;
        if let Some(report) = self.check(ops)? {
            return Ok(Some(report));
        }
        let speed = ops.config.speeds.normal;
        ops.steer(Steer::Center);
        ops.drive(Direction::Forward, speed);
        Ok(None)
    }
}

fn clearance(distance: Distance) -> f32 {
    distance.millimetres().unwrap_or(f32::INFINITY)
}
