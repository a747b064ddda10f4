//! Angular actuators (steering servo, camera pan and tilt) and the
//! [`ServoChannel`] wrapper that enforces their declared limits.
//!
//! Drivers implement [`Servo`].  The rest of the stack only ever talks to a
//! [`ServoChannel`], which clamps every target to the channel's
//! [`AngleLimits`] *before* the command reaches the driver, so an
//! out-of-range angle is never issued.

use linebot_types::{AngleLimits, BotError};
use tracing::debug;

/// A position-controlled angular actuator.
///
/// Every servo has a stable string identifier used in logs and fault
/// messages.
pub trait Servo: Send {
    /// Stable identifier for this servo, e.g. `"steering"` or `"camera_pan"`.
    fn id(&self) -> &str;

    /// Command the servo to `degrees`.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::HardwareFault`] if the command cannot be applied
    /// (e.g. the PWM controller did not acknowledge the write).
    fn set_angle(&mut self, degrees: f32) -> Result<(), BotError>;

    /// Return the most recently commanded angle in degrees.
    fn angle(&self) -> f32;
}

/// A [`Servo`] bound to its physical limits and neutral position.
pub struct ServoChannel {
    servo: Box<dyn Servo>,
    limits: AngleLimits,
    neutral: f32,
}

impl ServoChannel {
    /// Wrap `servo`.  `neutral` is clamped into `limits`.
    pub fn new(servo: Box<dyn Servo>, limits: AngleLimits, neutral: f32) -> Self {
        Self {
            servo,
            neutral: limits.clamp(neutral),
            limits,
        }
    }

    pub fn id(&self) -> &str {
        self.servo.id()
    }

    pub fn limits(&self) -> AngleLimits {
        self.limits
    }

    pub fn neutral(&self) -> f32 {
        self.neutral
    }

    /// Last angle reported by the driver.
    pub fn angle(&self) -> f32 {
        self.servo.angle()
    }

    /// Move to `degrees`, clamped to the channel limits.
    ///
    /// Returns the angle actually commanded.  Repeating the same request
    /// always issues the same clamped command.
    pub fn move_to(&mut self, degrees: f32) -> Result<f32, BotError> {
        let target = self.limits.clamp(degrees);
        if target != degrees {
            debug!(
                servo = self.servo.id(),
                requested = degrees,
                clamped = target,
                "servo target clamped to limits"
            );
        }
        self.servo.set_angle(target)?;
        Ok(target)
    }

    /// Return to the neutral position.
    pub fn center(&mut self) -> Result<f32, BotError> {
        self.move_to(self.neutral)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Minimal in-process servo used only for tests.
    struct MockServo {
        id: String,
        angle: f32,
        commands: Vec<f32>,
    }

    impl MockServo {
        fn new(id: &str) -> Self {
            Self {
                id: id.to_string(),
                angle: 90.0,
                commands: Vec::new(),
            }
        }
    }

    impl Servo for MockServo {
        fn id(&self) -> &str {
            &self.id
        }

        fn set_angle(&mut self, degrees: f32) -> Result<(), BotError> {
            self.angle = degrees;
            self.commands.push(degrees);
            Ok(())
        }

        fn angle(&self) -> f32 {
            self.angle
        }
    }

    fn steering() -> ServoChannel {
        ServoChannel::new(
            Box::new(MockServo::new("steering")),
            AngleLimits::new(45.0, 135.0),
            90.0,
        )
    }

    #[test]
    fn out_of_range_targets_are_clamped() {
        let mut ch = steering();
        assert_eq!(ch.move_to(170.0).unwrap(), 135.0);
        assert_eq!(ch.angle(), 135.0);
        assert_eq!(ch.move_to(-20.0).unwrap(), 45.0);
        assert_eq!(ch.angle(), 45.0);
    }

    #[test]
    fn in_range_targets_pass_through() {
        let mut ch = steering();
        assert_eq!(ch.move_to(100.0).unwrap(), 100.0);
        assert_eq!(ch.angle(), 100.0);
    }

    #[test]
    fn repeated_command_is_idempotent() {
        let mut ch = steering();
        let first = ch.move_to(150.0).unwrap();
        let second = ch.move_to(150.0).unwrap();
        assert_eq!(first, second);
        assert_eq!(ch.angle(), 135.0);
    }

    #[test]
    fn neutral_is_clamped_into_limits() {
        let ch = ServoChannel::new(
            Box::new(MockServo::new("tilt")),
            AngleLimits::new(30.0, 150.0),
            10.0,
        );
        assert_eq!(ch.neutral(), 30.0);
    }

    #[test]
    fn inverted_limits_still_build_a_channel() {
        let mut channel = ServoChannel::new(
            Box::new(MockServo::new("pan")),
            AngleLimits::new(150.0, 30.0),
            200.0,
        );
        assert_eq!(channel.neutral(), 150.0);
        assert_eq!(channel.move_to(10.0).unwrap(), 30.0);
    }

    #[test]
    fn center_returns_to_neutral() {
        let mut ch = steering();
        ch.move_to(120.0).unwrap();
        assert_eq!(ch.center().unwrap(), 90.0);
        assert_eq!(ch.angle(), 90.0);
    }
}
