//! Generic `Propulsion` trait for the drive motor.

use linebot_types::{BotError, Direction};

/// Highest accepted propulsion speed (percent of full throttle).
pub const MAX_SPEED: u8 = 100;

/// The robot's drive motor.
///
/// Drivers receive speeds already clamped to `0..=MAX_SPEED` by the
/// [`Rig`][crate::rig::Rig].
pub trait Propulsion: Send {
    /// Stable identifier, e.g. `"drive_motor"`.
    fn id(&self) -> &str;

    /// Spin the motor in `direction` at `speed` percent.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::HardwareFault`] if the command cannot be applied.
    fn drive(&mut self, direction: Direction, speed: u8) -> Result<(), BotError>;

    /// Cut throttle to zero.
    fn stop(&mut self) -> Result<(), BotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockMotor {
        throttle: f32,
    }

    impl Propulsion for MockMotor {
        fn id(&self) -> &str {
            "mock_motor"
        }

        fn drive(&mut self, direction: Direction, speed: u8) -> Result<(), BotError> {
            let magnitude = f32::from(speed) / f32::from(MAX_SPEED);
            self.throttle = match direction {
                Direction::Forward => magnitude,
                Direction::Reverse => -magnitude,
            };
            Ok(())
        }

        fn stop(&mut self) -> Result<(), BotError> {
            self.throttle = 0.0;
            Ok(())
        }
    }

    #[test]
    fn mock_motor_drive_and_stop() {
        let mut motor = MockMotor { throttle: 0.0 };
        motor.drive(Direction::Reverse, 50).unwrap();
        assert!((motor.throttle + 0.5).abs() < f32::EPSILON);
        motor.stop().unwrap();
        assert_eq!(motor.throttle, 0.0);
    }
}
