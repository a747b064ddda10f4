//! [`RobotConfig`] – every tunable of the control core in one place.
//!
//! Angle tables, speeds, ceilings, timeouts and detour timings are named
//! fields rather than constants, so the behavioural variants of different
//! robots collapse into configuration differences.  Every table carries
//! `#[serde(default)]`, so a partial TOML file only needs the keys it
//! changes.
//!
//! Durations are stored as integer milliseconds (`*_ms`) to keep the file
//! format human-editable.
//!
//! Steering angles follow the servo convention of the chassis: larger angles
//! turn left, smaller angles turn right.

use std::time::Duration;

use linebot_types::{AngleLimits, BotError, Distance};
use serde::{Deserialize, Serialize};

/// Convert a `*_ms` field to a [`Duration`].
pub fn ms(millis: u64) -> Duration {
    Duration::from_millis(millis)
}

/// What the line tracker does when a normal recovery fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EscalationPolicy {
    /// Resume sensor-driven tracking and let the next lost streak retry.
    #[default]
    Resume,
    /// Run [`ExtremeRecovery`][crate::extreme::ExtremeRecovery] first.
    Extreme,
}

impl std::fmt::Display for EscalationPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EscalationPolicy::Resume => write!(f, "resume"),
            EscalationPolicy::Extreme => write!(f, "extreme"),
        }
    }
}

impl std::str::FromStr for EscalationPolicy {
    type Err = BotError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "resume" => Ok(EscalationPolicy::Resume),
            "extreme" => Ok(EscalationPolicy::Extreme),
            other => Err(BotError::Config(format!(
                "unknown escalation policy {other:?} (expected \"resume\" or \"extreme\")"
            ))),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tables
// ─────────────────────────────────────────────────────────────────────────────

/// Steering servo angle for every named steer, in degrees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SteeringTable {
    pub center: f32,
    pub slight_left: f32,
    pub slight_right: f32,
    pub turn_left: f32,
    pub turn_right: f32,
    pub sharp_left: f32,
    pub sharp_right: f32,
    pub extreme_left: f32,
    pub extreme_right: f32,
}

impl Default for SteeringTable {
    fn default() -> Self {
        Self {
            center: 90.0,
            slight_left: 100.0,
            slight_right: 80.0,
            turn_left: 110.0,
            turn_right: 70.0,
            sharp_left: 125.0,
            sharp_right: 55.0,
            extreme_left: 135.0,
            extreme_right: 45.0,
        }
    }
}

/// Propulsion speeds, percent of full throttle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpeedTable {
    pub normal: u8,
    pub turn: u8,
    pub search: u8,
    pub recovery: u8,
}

impl Default for SpeedTable {
    fn default() -> Self {
        Self {
            normal: 20,
            turn: 18,
            search: 8,
            recovery: 10,
        }
    }
}

/// Camera head poses.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HeadPositions {
    pub pan_center: f32,
    pub tilt_normal: f32,
    pub tilt_down: f32,
    /// Maximum downward tilt used while searching for the line.
    pub tilt_very_down: f32,
}

impl Default for HeadPositions {
    fn default() -> Self {
        Self {
            pan_center: 90.0,
            tilt_normal: 90.0,
            tilt_down: 60.0,
            tilt_very_down: 55.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServoLimits {
    pub steering: AngleLimits,
    pub pan: AngleLimits,
    pub tilt: AngleLimits,
}

impl Default for ServoLimits {
    fn default() -> Self {
        Self {
            steering: AngleLimits::new(45.0, 135.0),
            pan: AngleLimits::new(30.0, 150.0),
            tilt: AngleLimits::new(30.0, 150.0),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Control-loop period.
    pub period_ms: u64,
    /// Lost cycles answered with a wiggle.  The next Lost cycle starts a
    /// recovery.
    pub lost_ceiling: u32,
    pub wiggle_creep_ms: u64,
    pub wiggle_pause_ms: u64,
    pub escalation: EscalationPolicy,
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            period_ms: 20,
            lost_ceiling: 5,
            wiggle_creep_ms: 300,
            wiggle_pause_ms: 100,
            escalation: EscalationPolicy::Resume,
        }
    }
}

fn default_scan_angles() -> Vec<f32> {
    vec![130.0, 120.0, 110.0, 100.0, 90.0, 80.0, 70.0, 60.0, 50.0]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    pub max_attempts: u32,
    pub timeout_ms: u64,
    /// Candidate pan angles, swept in order.
    #[serde(default = "default_scan_angles")]
    pub scan_angles: Vec<f32>,
    /// Offsets (degrees from pan centre) separating centre, near and far
    /// buckets.
    pub near_offset: f32,
    pub far_offset: f32,
    pub tilt_settle_ms: u64,
    pub reverse_ms: u64,
    pub stabilise_ms: u64,
    pub steer_settle_ms: u64,
    pub approach_ms: u64,
    pub verify_pause_ms: u64,
    pub partial_creep_ms: u64,
    pub backoff_ms: u64,
    pub reposition_ms: u64,
    pub between_attempts_ms: u64,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 15_000,
            scan_angles: default_scan_angles(),
            near_offset: 10.0,
            far_offset: 25.0,
            tilt_settle_ms: 400,
            reverse_ms: 2_000,
            stabilise_ms: 250,
            steer_settle_ms: 200,
            approach_ms: 500,
            verify_pause_ms: 100,
            partial_creep_ms: 200,
            backoff_ms: 300,
            reposition_ms: 400,
            between_attempts_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtremeConfig {
    pub max_attempts: u32,
    pub timeout_ms: u64,
    pub reverse_ms: u64,
    /// Forward drive steered to the opposite extreme, sweeping a wide arc.
    pub sweep_ms: u64,
    pub settle_ms: u64,
    pub approach_ms: u64,
    pub partial_creep_ms: u64,
    pub backoff_ms: u64,
    pub between_attempts_ms: u64,
}

impl Default for ExtremeConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            timeout_ms: 20_000,
            reverse_ms: 2_500,
            sweep_ms: 1_200,
            settle_ms: 400,
            approach_ms: 1_000,
            partial_creep_ms: 300,
            backoff_ms: 800,
            between_attempts_ms: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObstacleConfig {
    pub threshold_mm: f32,
    /// Pan offset from centre used to probe left and right clearance.
    pub probe_offset: f32,
    pub probe_settle_ms: u64,
    pub reverse_ms: u64,
    pub advance_ms: u64,
    pub return_ms: u64,
}

impl Default for ObstacleConfig {
    fn default() -> Self {
        Self {
            threshold_mm: 300.0,
            probe_offset: 40.0,
            probe_settle_ms: 300,
            reverse_ms: 500,
            advance_ms: 1_000,
            return_ms: 1_000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NavigationConfig {
    /// Arrow readings taken per decision.
    pub samples: u32,
    pub sample_interval_ms: u64,
    /// Reverse time when no arrow is recognised.
    pub reverse_ms: u64,
    /// Back-up time before a turn.
    pub backup_ms: u64,
    pub turn_ms: u64,
}

impl Default for NavigationConfig {
    fn default() -> Self {
        Self {
            samples: 5,
            sample_interval_ms: 1_000,
            reverse_ms: 2_000,
            backup_ms: 500,
            turn_ms: 4_000,
        }
    }
}

/// Camera line-scan tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VisionConfig {
    pub roi_height_ratio: f32,
    pub dark_threshold: u8,
    pub min_area: usize,
    pub settle_ms: u64,
    pub between_angles_ms: u64,
}

impl Default for VisionConfig {
    fn default() -> Self {
        Self {
            roi_height_ratio: 0.6,
            dark_threshold: 50,
            min_area: 1_500,
            settle_ms: 300,
            between_angles_ms: 100,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// RobotConfig
// ─────────────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RobotConfig {
    pub steering: SteeringTable,
    pub speeds: SpeedTable,
    pub head: HeadPositions,
    pub limits: ServoLimits,
    pub tracking: TrackingConfig,
    pub recovery: RecoveryConfig,
    pub extreme: ExtremeConfig,
    pub obstacle: ObstacleConfig,
    pub navigation: NavigationConfig,
    pub vision: VisionConfig,
}

impl RobotConfig {
    /// Obstacle threshold as a [`Distance`].
    pub fn obstacle_threshold(&self) -> Distance {
        Distance::from_mm(self.obstacle.threshold_mm)
    }

    /// Reject values the behaviours cannot run with.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Config`] naming the first offending field.
    pub fn validate(&self) -> Result<(), BotError> {
        fn fail(msg: impl Into<String>) -> Result<(), BotError> {
            Err(BotError::Config(msg.into()))
        }

        for (name, limits) in [
            ("limits.steering", self.limits.steering),
            ("limits.pan", self.limits.pan),
            ("limits.tilt", self.limits.tilt),
        ] {
            if !(limits.min.is_finite() && limits.max.is_finite()) || limits.min >= limits.max {
                return fail(format!("{name}: min must be below max"));
            }
        }
        for (name, speed) in [
            ("speeds.normal", self.speeds.normal),
            ("speeds.turn", self.speeds.turn),
            ("speeds.search", self.speeds.search),
            ("speeds.recovery", self.speeds.recovery),
        ] {
            if speed > linebot_hal::MAX_SPEED {
                return fail(format!("{name}: {speed} exceeds 100"));
            }
        }
        if self.tracking.period_ms == 0 {
            return fail("tracking.period_ms must be positive");
        }
        if self.recovery.max_attempts == 0 || self.extreme.max_attempts == 0 {
            return fail("recovery attempts must be at least 1");
        }
        if self.recovery.timeout_ms == 0 || self.extreme.timeout_ms == 0 {
            return fail("recovery timeouts must be positive");
        }
        if self.recovery.scan_angles.is_empty() {
            return fail("recovery.scan_angles must not be empty");
        }
        if self.recovery.scan_angles.iter().any(|a| !a.is_finite()) {
            return fail("recovery.scan_angles must be finite");
        }
        if !(self.recovery.near_offset > 0.0 && self.recovery.near_offset < self.recovery.far_offset) {
            return fail("recovery: need 0 < near_offset < far_offset");
        }
        if !(self.obstacle.threshold_mm.is_finite() && self.obstacle.threshold_mm > 0.0) {
            return fail("obstacle.threshold_mm must be a positive distance");
        }
        if self.navigation.samples == 0 {
            return fail("navigation.samples must be at least 1");
        }
        if !(self.vision.roi_height_ratio > 0.0 && self.vision.roi_height_ratio <= 1.0) {
            return fail("vision.roi_height_ratio must be in (0, 1]");
        }
        Ok(())
    }
}
