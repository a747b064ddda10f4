//! Named steers, the tracker's [`SteeringState`], and the bucketed mapping
//! from a camera pan angle to a steer.

use linebot_types::AngleLimits;
use serde::{Deserialize, Serialize};

use crate::config::SteeringTable;

/// A named steering position, resolved to degrees through a
/// [`SteeringTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Steer {
    Center,
    SlightLeft,
    SlightRight,
    TurnLeft,
    TurnRight,
    SharpLeft,
    SharpRight,
    ExtremeLeft,
    ExtremeRight,
}

impl Steer {
    pub fn angle(self, table: &SteeringTable) -> f32 {
        match self {
            Steer::Center => table.center,
            Steer::SlightLeft => table.slight_left,
            Steer::SlightRight => table.slight_right,
            Steer::TurnLeft => table.turn_left,
            Steer::TurnRight => table.turn_right,
            Steer::SharpLeft => table.sharp_left,
            Steer::SharpRight => table.sharp_right,
            Steer::ExtremeLeft => table.extreme_left,
            Steer::ExtremeRight => table.extreme_right,
        }
    }

    /// The same magnitude on the other side.
    pub fn mirrored(self) -> Steer {
        match self {
            Steer::Center => Steer::Center,
            Steer::SlightLeft => Steer::SlightRight,
            Steer::SlightRight => Steer::SlightLeft,
            Steer::TurnLeft => Steer::TurnRight,
            Steer::TurnRight => Steer::TurnLeft,
            Steer::SharpLeft => Steer::SharpRight,
            Steer::SharpRight => Steer::SharpLeft,
            Steer::ExtremeLeft => Steer::ExtremeRight,
            Steer::ExtremeRight => Steer::ExtremeLeft,
        }
    }
}

/// Last commanded steering angle and whether a recovery is running.
///
/// Owned by the line tracker; only ever updated with an angle that the
/// steering channel actually commanded, so it always lies within the
/// steering limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SteeringState {
    angle: f32,
    in_recovery: bool,
}

impl SteeringState {
    /// Start centred.  `center` is clamped into `limits`.
    pub fn new(center: f32, limits: AngleLimits) -> Self {
        Self {
            angle: limits.clamp(center),
            in_recovery: false,
        }
    }

    pub fn angle(&self) -> f32 {
        self.angle
    }

    pub fn in_recovery(&self) -> bool {
        self.in_recovery
    }

    /// Record the angle returned by a successful steering command.
    pub(crate) fn record(&mut self, commanded: f32) {
        self.angle = commanded;
    }

    pub(crate) fn set_recovery(&mut self, active: bool) {
        self.in_recovery = active;
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Bucketed angle mapping
// ─────────────────────────────────────────────────────────────────────────────

/// Where a scan angle lies relative to the pan centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Bucket {
    FarLeft,
    NearLeft,
    Center,
    NearRight,
    FarRight,
}

impl Bucket {
    /// Classify `angle` by its offset from `pan_center` (positive = left).
    ///
    /// | offset | bucket |
    /// |---|---|
    /// | `>= far` | `FarLeft` |
    /// | `>= near` | `NearLeft` |
    /// | `> -near` | `Center` |
    /// | `> -far` | `NearRight` |
    /// | otherwise | `FarRight` |
    pub fn of(angle: f32, pan_center: f32, near: f32, far: f32) -> Bucket {
        let offset = angle - pan_center;
        if offset >= far {
            Bucket::FarLeft
        } else if offset >= near {
            Bucket::NearLeft
        } else if offset > -near {
            Bucket::Center
        } else if offset > -far {
            Bucket::NearRight
        } else {
            Bucket::FarRight
        }
    }

    /// Steer used by the normal recovery.
    pub fn steer(self) -> Steer {
        match self {
            Bucket::FarLeft => Steer::SharpLeft,
            Bucket::NearLeft => Steer::TurnLeft,
            Bucket::Center => Steer::Center,
            Bucket::NearRight => Steer::TurnRight,
            Bucket::FarRight => Steer::SharpRight,
        }
    }

    /// Steer used by the extreme recovery, reaching the actuator extremes.
    pub fn extreme_steer(self) -> Steer {
        match self {
            Bucket::FarLeft => Steer::ExtremeLeft,
            Bucket::NearLeft => Steer::SharpLeft,
            Bucket::Center => Steer::Center,
            Bucket::NearRight => Steer::SharpRight,
            Bucket::FarRight => Steer::ExtremeRight,
        }
    }
}
