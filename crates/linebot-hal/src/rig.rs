//! [`Rig`] – the single owned bundle of drive hardware.
//!
//! A `Rig` holds exactly one handle per physical resource: the drive motor,
//! the steering servo, the camera pan and tilt servos, the reflectance array,
//! and optionally the ranging sensor.  Behaviours receive the rig by value
//! (or `&mut`) and never share it, so two behaviours can not race on the same
//! actuator.
//!
//! Every angle command passes through a [`ServoChannel`] and is clamped to
//! the servo's declared limits before it is issued.

use linebot_types::{BotError, Direction, Distance, SensorPattern};
use tracing::debug;

use crate::actuator::ServoChannel;
use crate::propulsion::{MAX_SPEED, Propulsion};
use crate::sensors::{RangeSensor, ReflectanceArray};

/// Owned hardware bundle for one robot.
pub struct Rig {
    propulsion: Box<dyn Propulsion>,
    steering: ServoChannel,
    pan: ServoChannel,
    tilt: ServoChannel,
    reflectance: Box<dyn ReflectanceArray>,
    range: Option<Box<dyn RangeSensor>>,
}

impl Rig {
    /// Assemble a rig without a ranging sensor.
    pub fn new(
        propulsion: Box<dyn Propulsion>,
        steering: ServoChannel,
        pan: ServoChannel,
        tilt: ServoChannel,
        reflectance: Box<dyn ReflectanceArray>,
    ) -> Self {
        Self {
            propulsion,
            steering,
            pan,
            tilt,
            reflectance,
            range: None,
        }
    }

    /// Attach the forward ranging sensor.
    pub fn with_range_sensor(mut self, range: Box<dyn RangeSensor>) -> Self {
        self.range = Some(range);
        self
    }

    pub fn has_range_sensor(&self) -> bool {
        self.range.is_some()
    }

    // -------------------------------------------------------------------------
    // Sensors
    // -------------------------------------------------------------------------

    /// Read the reflectance array (left, middle, right).
    pub fn read_sensors(&mut self) -> Result<SensorPattern, BotError> {
        self.reflectance.read()
    }

    /// Read the ranging sensor.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::Unavailable`] when no ranging sensor is attached.
    pub fn read_distance(&mut self) -> Result<Distance, BotError> {
        match self.range.as_mut() {
            Some(range) => range.distance(),
            None => Err(BotError::Unavailable(
                "no ranging sensor attached".to_string(),
            )),
        }
    }

    // -------------------------------------------------------------------------
    // Actuators
    // -------------------------------------------------------------------------

    /// Steer to `degrees` (clamped).  Returns the commanded angle.
    pub fn set_steering_angle(&mut self, degrees: f32) -> Result<f32, BotError> {
        self.steering.move_to(degrees)
    }

    /// Aim the camera horizontally (clamped).  Returns the commanded angle.
    pub fn set_pan_angle(&mut self, degrees: f32) -> Result<f32, BotError> {
        self.pan.move_to(degrees)
    }

    /// Aim the camera vertically (clamped).  Returns the commanded angle.
    pub fn set_tilt_angle(&mut self, degrees: f32) -> Result<f32, BotError> {
        self.tilt.move_to(degrees)
    }

    /// Drive the motor.  `speed` is clamped to `0..=100`.
    pub fn set_propulsion(&mut self, direction: Direction, speed: u8) -> Result<(), BotError> {
        let speed = speed.min(MAX_SPEED);
        debug!(?direction, speed, "propulsion command");
        self.propulsion.drive(direction, speed)
    }

    pub fn stop_propulsion(&mut self) -> Result<(), BotError> {
        self.propulsion.stop()
    }

    pub fn steering(&self) -> &ServoChannel {
        &self.steering
    }

    pub fn pan(&self) -> &ServoChannel {
        &self.pan
    }

    /// Mutable access to the pan channel, used by camera scanners.
    pub fn pan_mut(&mut self) -> &mut ServoChannel {
        &mut self.pan
    }

    pub fn tilt(&self) -> &ServoChannel {
        &self.tilt
    }

    /// Stop the motor and return every servo to neutral.
    ///
    /// Every step is attempted even if an earlier one fails; the first error
    /// is returned.
    pub fn neutral_pose(&mut self) -> Result<(), BotError> {
        let results = [
            self.propulsion.stop(),
            self.steering.center().map(|_| ()),
            self.pan.center().map(|_| ()),
            self.tilt.center().map(|_| ()),
        ];
        results.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::actuator::Servo;
    use linebot_types::AngleLimits;

    // ------------------------------------------------------------------
    // Test doubles
    // ------------------------------------------------------------------

    struct MockServo {
        id: String,
        angle: f32,
        fail: bool,
    }
    impl MockServo {
        fn new(id: &str) -> Box<Self> {
            Box::new(Self {
                id: id.to_string(),
                angle: 0.0,
                fail: false,
            })
        }
        fn failing(id: &str) -> Box<Self> {
            Box::new(Self {
                id: id.to_string(),
                angle: 0.0,
                fail: true,
            })
        }
    }
    impl Servo for MockServo {
        fn id(&self) -> &str {
            &self.id
        }
        fn set_angle(&mut self, degrees: f32) -> Result<(), BotError> {
            if self.fail {
                return Err(BotError::hardware(self.id.clone(), "nack"));
            }
            self.angle = degrees;
            Ok(())
        }
        fn angle(&self) -> f32 {
            self.angle
        }
    }

    struct MockMotor {
        last: Option<(Direction, u8)>,
    }
    impl Propulsion for MockMotor {
        fn id(&self) -> &str {
            "motor"
        }
        fn drive(&mut self, direction: Direction, speed: u8) -> Result<(), BotError> {
            self.last = Some((direction, speed));
            Ok(())
        }
        fn stop(&mut self) -> Result<(), BotError> {
            self.last = None;
            Ok(())
        }
    }

    struct FixedArray(SensorPattern);
    impl ReflectanceArray for FixedArray {
        fn read(&mut self) -> Result<SensorPattern, BotError> {
            Ok(self.0)
        }
    }

    struct FixedRange(Distance);
    impl RangeSensor for FixedRange {
        fn distance(&mut self) -> Result<Distance, BotError> {
            Ok(self.0)
        }
    }

    fn channel(servo: Box<MockServo>) -> ServoChannel {
        ServoChannel::new(servo, AngleLimits::new(30.0, 150.0), 90.0)
    }

    fn rig_with_steering(steering: Box<MockServo>) -> Rig {
        Rig::new(
            Box::new(MockMotor { last: None }),
            channel(steering),
            channel(MockServo::new("pan")),
            channel(MockServo::new("tilt")),
            Box::new(FixedArray(SensorPattern::new(false, true, false))),
        )
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    #[test]
    fn steering_is_clamped() {
        let mut rig = rig_with_steering(MockServo::new("steering"));
        assert_eq!(rig.set_steering_angle(170.0).unwrap(), 150.0);
        assert_eq!(rig.steering().angle(), 150.0);
    }

    #[test]
    fn read_sensors_passes_through() {
        let mut rig = rig_with_steering(MockServo::new("steering"));
        assert_eq!(
            rig.read_sensors().unwrap(),
            SensorPattern::new(false, true, false)
        );
    }

    #[test]
    fn missing_range_sensor_is_unavailable() {
        let mut rig = rig_with_steering(MockServo::new("steering"));
        assert!(!rig.has_range_sensor());
        assert!(matches!(rig.read_distance(), Err(BotError::Unavailable(_))));
    }

    #[test]
    fn attached_range_sensor_reports_distance() {
        let mut rig = rig_with_steering(MockServo::new("steering"))
            .with_range_sensor(Box::new(FixedRange(Distance::from_mm(420.0))));
        assert_eq!(rig.read_distance().unwrap(), Distance::from_mm(420.0));
    }

    #[test]
    fn neutral_pose_centres_all_servos() {
        let mut rig = rig_with_steering(MockServo::new("steering"));
        rig.set_steering_angle(120.0).unwrap();
        rig.set_pan_angle(40.0).unwrap();
        rig.set_tilt_angle(55.0).unwrap();
        rig.neutral_pose().unwrap();
        assert_eq!(rig.steering().angle(), 90.0);
        assert_eq!(rig.pan().angle(), 90.0);
        assert_eq!(rig.tilt().angle(), 90.0);
    }

    #[test]
    fn neutral_pose_continues_past_a_failing_servo() {
        let mut rig = rig_with_steering(MockServo::failing("steering"));
        rig.set_pan_angle(40.0).unwrap();
        let result = rig.neutral_pose();
        assert!(matches!(result, Err(BotError::HardwareFault { .. })));
        // The pan servo was still centred after the steering failure.
        assert_eq!(rig.pan().angle(), 90.0);
    }
}
