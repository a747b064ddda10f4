//! [`Maneuver`] – fault-tolerant actuation shared by every behaviour.
//!
//! Actuator and sensor faults are caught here, at the point of use, logged
//! with the attempted command and the current state, and turned into a local
//! fallback:
//!
//! | Fault | Fallback |
//! |---|---|
//! | steering / pan / tilt / propulsion command rejected | command skipped, `false` returned |
//! | reflectance read failed | pattern treated as Lost |
//! | range read failed | treated as no echo |
//!
//! Only [`BotError::Interrupted`] (a stop request) escapes, through the
//! timed helpers.  With an event bus attached, every caught fault is also
//! published as [`EventPayload::Fault`] on the alerts lane.

use linebot_hal::Rig;
use linebot_kernel::Pacer;
use linebot_middleware::EventBus;
use linebot_types::{BotError, Direction, Distance, EventPayload, SensorPattern};
use tracing::warn;

use crate::config::{RobotConfig, ms};
use crate::steering::{Steer, SteeringState};

const FAULT_SOURCE: &str = "maneuver";

/// Everything a behaviour step needs to move the robot.
pub struct Maneuver<'a> {
    pub rig: &'a mut Rig,
    pub steering: &'a mut SteeringState,
    pub pacer: &'a Pacer,
    pub config: &'a RobotConfig,
    events: Option<EventBus>,
}

impl<'a> Maneuver<'a> {
    pub fn new(
        rig: &'a mut Rig,
        steering: &'a mut SteeringState,
        pacer: &'a Pacer,
        config: &'a RobotConfig,
    ) -> Self {
        Self {
            rig,
            steering,
            pacer,
            config,
            events: None,
        }
    }

    /// Publish caught faults on `bus`.
    pub fn with_event_bus(mut self, bus: Option<EventBus>) -> Self {
        self.events = bus;
        self
    }

    fn report_fault(&self, component: &str, error: &BotError) {
        if let Some(bus) = &self.events {
            bus.emit(
                FAULT_SOURCE,
                EventPayload::Fault {
                    component: component.to_string(),
                    message: error.to_string(),
                },
            );
        }
    }

    // ── Actuators ────────────────────────────────────────────────────────────

    /// Steer to a named position.
    pub fn steer(&mut self, steer: Steer) -> bool {
        self.steer_to(steer.angle(&self.config.steering))
    }

    /// Steer to `degrees` (clamped by the rig).
    pub fn steer_to(&mut self, degrees: f32) -> bool {
        match self.rig.set_steering_angle(degrees) {
            Ok(commanded) => {
                self.steering.record(commanded);
                true
            }
            Err(e) => {
                warn!(
                    requested = degrees,
                    current = self.steering.angle(),
                    in_recovery = self.steering.in_recovery(),
                    error = %e,
                    "steering command failed, skipped"
                );
                self.report_fault("steering", &e);
                false
            }
        }
    }

    pub fn pan(&mut self, degrees: f32) -> bool {
        match self.rig.set_pan_angle(degrees) {
            Ok(_) => true,
            Err(e) => {
                warn!(requested = degrees, current = self.rig.pan().angle(), error = %e, "pan command failed, skipped");
                self.report_fault("pan", &e);
                false
            }
        }
    }

    pub fn tilt(&mut self, degrees: f32) -> bool {
        match self.rig.set_tilt_angle(degrees) {
            Ok(_) => true,
            Err(e) => {
                warn!(requested = degrees, current = self.rig.tilt().angle(), error = %e, "tilt command failed, skipped");
                self.report_fault("tilt", &e);
                false
            }
        }
    }

    pub fn drive(&mut self, direction: Direction, speed: u8) -> bool {
        match self.rig.set_propulsion(direction, speed) {
            Ok(()) => true,
            Err(e) => {
                warn!(?direction, speed, steering = self.steering.angle(), error = %e, "propulsion command failed, skipped");
                self.report_fault("propulsion", &e);
                false
            }
        }
    }

    pub fn stop(&mut self) -> bool {
        match self.rig.stop_propulsion() {
            Ok(()) => true,
            Err(e) => {
                warn!(steering = self.steering.angle(), error = %e, "stop command failed");
                self.report_fault("propulsion", &e);
                false
            }
        }
    }

    // ── Sensors ──────────────────────────────────────────────────────────────

    pub fn read_pattern(&mut self) -> SensorPattern {
        match self.rig.read_sensors() {
            Ok(pattern) => pattern,
            Err(e) => {
                warn!(error = %e, "reflectance read failed, treating as lost");
                self.report_fault("reflectance", &e);
                SensorPattern::LOST
            }
        }
    }

    pub fn read_distance(&mut self) -> Distance {
        match self.rig.read_distance() {
            Ok(distance) => distance,
            Err(e) => {
                warn!(error = %e, "range read failed, ignoring obstacle check");
                self.report_fault("range", &e);
                Distance::NO_ECHO
            }
        }
    }

    // ── Timed helpers ────────────────────────────────────────────────────────

    pub fn hold_ms(&self, millis: u64) -> Result<(), BotError> {
        self.pacer.hold(ms(millis))
    }

    /// Drive for `millis`, then stop.  The stop is issued even when the wait
    /// is interrupted.
    pub fn creep(&mut self, direction: Direction, speed: u8, millis: u64) -> Result<(), BotError> {
        self.drive(direction, speed);
        let waited = self.hold_ms(millis);
        self.stop();
        waited
    }

    /// Steer, then creep.
    pub fn steered_creep(
        &mut self,
        steer: Steer,
        direction: Direction,
        speed: u8,
        millis: u64,
    ) -> Result<(), BotError> {
        self.steer(steer);
        self.creep(direction, speed, millis)
    }

    /// Tilt and pan back to the normal pose and centre the steering.
    pub fn restore_pose(&mut self) {
        let head = &self.config.head;
        let (tilt, pan) = (head.tilt_normal, head.pan_center);
        self.tilt(tilt);
        self.pan(pan);
        self.steer(Steer::Center);
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use linebot_hal::sim::{Command, STEERING_ID, SimRig};
    use linebot_kernel::{SimClock, StopToken};
    use linebot_middleware::Topic;

    fn fixture() -> (Rig, linebot_hal::sim::SimHandles, SteeringState, Pacer, RobotConfig) {
        let (rig, handles) = SimRig::new().build();
        let config = RobotConfig::default();
        let steering = SteeringState::new(90.0, config.limits.steering);
        let pacer = Pacer::new(Arc::new(SimClock::new()), StopToken::new());
        (rig, handles, steering, pacer, config)
    }

    #[test]
    fn steer_records_the_clamped_angle() {
        let (mut rig, _h, mut steering, pacer, mut config) = fixture();
        config.steering.extreme_left = 170.0;
        let mut ops = Maneuver::new(&mut rig, &mut steering, &pacer, &config);
        assert!(ops.steer(Steer::ExtremeLeft));
        assert_eq!(steering.angle(), 135.0);
    }

    #[test]
    fn failed_steer_keeps_previous_angle() {
        let (mut rig, handles, mut steering, pacer, config) = fixture();
        handles.faults.fail_servos(true);
        let mut ops = Maneuver::new(&mut rig, &mut steering, &pacer, &config);
        assert!(!ops.steer(Steer::TurnLeft));
        assert_eq!(steering.angle(), 90.0);
        assert!(handles.log.servo_angles(STEERING_ID).is_empty());
    }

    #[test]
    fn sensor_fault_reads_as_lost() {
        let (mut rig, handles, mut steering, pacer, config) = fixture();
        handles.patterns.push([SensorPattern::new(true, true, true)]);
        handles.faults.fail_reflectance(true);
        let mut ops = Maneuver::new(&mut rig, &mut steering, &pacer, &config);
        assert_eq!(ops.read_pattern(), SensorPattern::LOST);
    }

    #[test]
    fn creep_always_ends_with_stop() {
        let (mut rig, handles, mut steering, pacer, config) = fixture();
        pacer.token().stop();
        let mut ops = Maneuver::new(&mut rig, &mut steering, &pacer, &config);
        let result = ops.creep(Direction::Forward, 8, 300);
        assert_eq!(result, Err(BotError::Interrupted));
        assert_eq!(
            handles.log.snapshot(),
            vec![
                Command::Drive {
                    direction: Direction::Forward,
                    speed: 8
                },
                Command::Stop
            ]
        );
    }

    #[test]
    fn caught_faults_are_published_as_alerts() {
        let (mut rig, handles, mut steering, pacer, config) = fixture();
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        handles.faults.fail_servos(true);
        handles.faults.fail_reflectance(true);

        let mut ops =
            Maneuver::new(&mut rig, &mut steering, &pacer, &config).with_event_bus(Some(bus));
        assert!(!ops.steer(Steer::TurnLeft));
        assert_eq!(ops.read_pattern(), SensorPattern::LOST);

        let components: Vec<String> = alerts
            .drain()
            .into_iter()
            .filter_map(|event| match event.payload {
                EventPayload::Fault { component, .. } => Some(component),
                _ => None,
            })
            .collect();
        assert_eq!(components, vec!["steering".to_string(), "reflectance".to_string()]);
    }

    #[test]
    fn healthy_commands_publish_nothing() {
        let (mut rig, _h, mut steering, pacer, config) = fixture();
        let bus = EventBus::default();
        let mut alerts = bus.subscribe_to(Topic::Alerts);
        let mut ops =
            Maneuver::new(&mut rig, &mut steering, &pacer, &config).with_event_bus(Some(bus));
        assert!(ops.steer(Steer::TurnLeft));
        assert!(ops.drive(Direction::Forward, 20));
        assert!(alerts.drain().is_empty());
    }
}
