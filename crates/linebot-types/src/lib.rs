use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Snapshot of the three reflectance sensors, ordered left, middle, right.
///
/// Each flag is `true` when that sensor currently sees the line.  A pattern is
/// read fresh every control cycle and never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct SensorPattern {
    pub left: bool,
    pub middle: bool,
    pub right: bool,
}

impl SensorPattern {
    /// No sensor sees the line.  Also the fallback for a failed read.
    pub const LOST: SensorPattern = SensorPattern {
        left: false,
        middle: false,
        right: false,
    };

    pub const fn new(left: bool, middle: bool, right: bool) -> Self {
        Self {
            left,
            middle,
            right,
        }
    }

    /// `true` if at least one sensor sees the line.
    pub fn any(&self) -> bool {
        self.left || self.middle || self.right
    }

    /// Number of sensors that currently see the line.
    pub fn count(&self) -> usize {
        [self.left, self.middle, self.right]
            .iter()
            .filter(|s| **s)
            .count()
    }

    /// `true` when the middle sensor sees the line or at least two sensors do.
    ///
    /// This is the confidence bar a recovery maneuver must clear before the
    /// line is considered reacquired.
    pub fn is_centered(&self) -> bool {
        self.middle || self.count() >= 2
    }
}

impl fmt::Display for SensorPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{}{}",
            u8::from(self.left),
            u8::from(self.middle),
            u8::from(self.right)
        )
    }
}

/// Steering decision derived from a [`SensorPattern`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    Forward,
    SlightLeft,
    SlightRight,
    TurnLeft,
    TurnRight,
    Lost,
}

/// Propulsion direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Direction {
    Forward,
    Reverse,
}

/// Distance reported by the ranging sensor, in millimetres.
///
/// [`Distance::NO_ECHO`] stands for a reading where no echo came back; it is
/// never considered closer than any threshold.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Distance(Option<f32>);

impl Distance {
    pub const NO_ECHO: Distance = Distance(None);

    pub fn from_mm(millimetres: f32) -> Self {
        if millimetres.is_finite() && millimetres >= 0.0 {
            Distance(Some(millimetres))
        } else {
            Distance::NO_ECHO
        }
    }

    pub fn millimetres(&self) -> Option<f32> {
        self.0
    }

    pub fn is_echo(&self) -> bool {
        self.0.is_some()
    }

    /// `true` when this reading is an echo strictly closer than `threshold`.
    pub fn is_within(&self, threshold: Distance) -> bool {
        match (self.0, threshold.0) {
            (Some(d), Some(t)) => d < t,
            _ => false,
        }
    }
}

impl fmt::Display for Distance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(mm) => write!(f, "{mm:.0} mm"),
            None => write!(f, "no echo"),
        }
    }
}

/// Outcome of a camera scan for the line.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScanResult {
    pub found: bool,
    /// Pan angle (degrees) at which the line was seen.
    pub angle: Option<f32>,
}

impl ScanResult {
    pub fn found(angle: f32) -> Self {
        Self {
            found: true,
            angle: Some(angle),
        }
    }

    pub fn not_found() -> Self {
        Self {
            found: false,
            angle: None,
        }
    }
}

/// Inclusive angular range accepted by a servo, in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AngleLimits {
    pub min: f32,
    pub max: f32,
}

impl AngleLimits {
    pub const fn new(min: f32, max: f32) -> Self {
        Self { min, max }
    }

    /// Bounds in ascending order; an inverted pair is read as its mirror.
    fn ordered(&self) -> (f32, f32) {
        (self.min.min(self.max), self.min.max(self.max))
    }

    /// Clamp `degrees` to the nearest bound.  NaN maps to the range midpoint.
    /// Never panics, even for an inverted or NaN pair.
    pub fn clamp(&self, degrees: f32) -> f32 {
        let (lo, hi) = self.ordered();
        if degrees.is_nan() {
            return (lo + hi) / 2.0;
        }
        degrees.max(lo).min(hi)
    }

    pub fn contains(&self, degrees: f32) -> bool {
        let (lo, hi) = self.ordered();
        degrees >= lo && degrees <= hi
    }
}

/// Observability counters for the line tracker.  Reset only when a behaviour
/// (re)starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct RecoveryStats {
    pub ir_detections: u64,
    pub recoveries_attempted: u64,
    pub recoveries_succeeded: u64,
    pub recoveries_failed: u64,
    pub extreme_attempted: u64,
    pub obstacles_avoided: u64,
}

/// Direction read from an arrow marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ArrowDirection {
    Left,
    Right,
    None,
}

/// Counters for arrow-marker navigation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NavigationStats {
    pub arrows_detected: u64,
    pub left_turns: u64,
    pub right_turns: u64,
    pub obstacles_reached: u64,
    pub reversals: u64,
}

/// Which behaviour currently owns the drive hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BehaviorKind {
    #[default]
    Idle,
    LineTracking,
    ObstacleAvoidance,
    ArrowNavigation,
}

impl fmt::Display for BehaviorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BehaviorKind::Idle => write!(f, "idle"),
            BehaviorKind::LineTracking => write!(f, "line-tracking"),
            BehaviorKind::ObstacleAvoidance => write!(f, "obstacle-avoidance"),
            BehaviorKind::ArrowNavigation => write!(f, "arrow-navigation"),
        }
    }
}

/// Status snapshot returned to dashboard and voice collaborators.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RobotStatus {
    pub behavior: BehaviorKind,
    pub running: bool,
    pub current_sensors: SensorPattern,
    pub recovery_in_progress: bool,
    pub lost_streak: u32,
    pub last_steering_angle: f32,
    pub obstacle_threshold: Distance,
    pub stats: RecoveryStats,
    pub navigation: NavigationStats,
    /// `false` once a behaviour failed to hand the hardware back on stop.
    pub hardware_available: bool,
    pub updated_at: DateTime<Utc>,
}

impl Default for RobotStatus {
    fn default() -> Self {
        Self {
            behavior: BehaviorKind::Idle,
            running: false,
            current_sensors: SensorPattern::LOST,
            recovery_in_progress: false,
            lost_streak: 0,
            last_steering_angle: 90.0,
            obstacle_threshold: Distance::from_mm(300.0),
            stats: RecoveryStats::default(),
            navigation: NavigationStats::default(),
            hardware_available: true,
            updated_at: Utc::now(),
        }
    }
}

/// Unified event wrapper for the behaviour event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Event {
    pub id: Uuid,
    pub timestamp: DateTime<Utc>,
    /// e.g., "linebot-runtime::tracker"
    pub source: String,
    pub payload: EventPayload,
}

impl Event {
    pub fn new(source: impl Into<String>, payload: EventPayload) -> Self {
        Self {
            id: Uuid::new_v4(),
            timestamp: Utc::now(),
            source: source.into(),
            payload,
        }
    }
}

/// Variants of data that can be routed over the event bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum EventPayload {
    LineLost {
        streak: u32,
    },
    RecoveryStarted {
        last_steering_angle: f32,
        extreme: bool,
    },
    RecoveryFinished {
        reacquired: bool,
        attempts: u32,
        extreme: bool,
    },
    ObstacleDetected {
        distance: Distance,
    },
    ArrowDecision(ArrowDirection),
    BehaviorChanged(BehaviorKind),
    Fault {
        component: String,
        message: String,
    },
}

/// Error type shared by drivers, perception and the control core.
#[derive(Error, Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum BotError {
    #[error("Hardware Fault on {component}: {details}")]
    HardwareFault { component: String, details: String },

    #[error("Sensor Fault on {sensor}: {details}")]
    SensorFault { sensor: String, details: String },

    #[error("Vision Fault: {0}")]
    VisionFault(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Invalid Configuration: {0}")]
    Config(String),

    /// A stop was requested while a behaviour was running.
    #[error("Interrupted by stop request")]
    Interrupted,
}

impl BotError {
    pub fn hardware(component: impl Into<String>, details: impl Into<String>) -> Self {
        BotError::HardwareFault {
            component: component.into(),
            details: details.into(),
        }
    }

    pub fn sensor(sensor: impl Into<String>, details: impl Into<String>) -> Self {
        BotError::SensorFault {
            sensor: sensor.into(),
            details: details.into(),
        }
    }

    pub fn is_interrupted(&self) -> bool {
        matches!(self, BotError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_helpers() {
        assert!(!SensorPattern::LOST.any());
        assert_eq!(SensorPattern::new(true, false, true).count(), 2);
        assert!(SensorPattern::new(false, true, false).is_centered());
        assert!(SensorPattern::new(true, false, true).is_centered());
        assert!(!SensorPattern::new(true, false, false).is_centered());
    }

    #[test]
    fn pattern_display_is_bits() {
        assert_eq!(SensorPattern::new(true, false, true).to_string(), "101");
        assert_eq!(SensorPattern::LOST.to_string(), "000");
    }

    #[test]
    fn distance_within_threshold() {
        let threshold = Distance::from_mm(300.0);
        assert!(Distance::from_mm(250.0).is_within(threshold));
        assert!(!Distance::from_mm(300.0).is_within(threshold));
        assert!(!Distance::from_mm(500.0).is_within(threshold));
        assert!(!Distance::NO_ECHO.is_within(threshold));
    }

    #[test]
    fn distance_rejects_non_finite() {
        assert_eq!(Distance::from_mm(f32::NAN), Distance::NO_ECHO);
        assert_eq!(Distance::from_mm(-1.0), Distance::NO_ECHO);
        assert_eq!(Distance::NO_ECHO.to_string(), "no echo");
    }

    #[test]
    fn angle_limits_clamp() {
        let limits = AngleLimits::new(45.0, 135.0);
        assert_eq!(limits.clamp(200.0), 135.0);
        assert_eq!(limits.clamp(-10.0), 45.0);
        assert_eq!(limits.clamp(90.0), 90.0);
        assert_eq!(limits.clamp(f32::NAN), 90.0);
    }

    #[test]
    fn inverted_limits_clamp_without_panicking() {
        let limits = AngleLimits::new(135.0, 45.0);
        assert_eq!(limits.clamp(200.0), 135.0);
        assert_eq!(limits.clamp(-10.0), 45.0);
        assert_eq!(limits.clamp(f32::NAN), 90.0);
        assert!(limits.contains(90.0));
        assert!(!limits.contains(20.0));
    }

    #[test]
    fn status_serializes_to_json() {
        let status = RobotStatus {
            running: true,
            current_sensors: SensorPattern::new(false, true, false),
            ..RobotStatus::default()
        };
        let json = serde_json::to_string(&status).unwrap();
        let back: RobotStatus = serde_json::from_str(&json).unwrap();
        assert!(back.running);
        assert_eq!(back.current_sensors, status.current_sensors);
        assert_eq!(back.obstacle_threshold, Distance::from_mm(300.0));
    }

    #[test]
    fn no_echo_survives_json() {
        let json = serde_json::to_string(&Distance::NO_ECHO).unwrap();
        let back: Distance = serde_json::from_str(&json).unwrap();
        assert!(!back.is_echo());
    }

    #[test]
    fn event_roundtrip() {
        let event = Event::new(
            "linebot-runtime::tracker",
            EventPayload::RecoveryFinished {
                reacquired: true,
                attempts: 2,
                extreme: false,
            },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: Event = serde_json::from_str(&json).unwrap();
        assert_eq!(event.id, back.id);
        assert_eq!(event.source, back.source);
    }

    #[test]
    fn bot_error_display() {
        let err = BotError::hardware("steering", "i2c nack");
        assert!(err.to_string().contains("steering"));
        assert!(BotError::Interrupted.is_interrupted());
        assert!(!BotError::VisionFault("no frame".into()).is_interrupted());
    }
}
