//! In-process simulated hardware for tests and headless demo runs.
//!
//! [`SimRig`] builds a [`Rig`] whose every slot is backed by a recording
//! driver.  All actuator commands land, in order, in one shared
//! [`CommandLog`], so a test can assert on the exact command sequence a
//! behaviour produced (e.g. "exactly one stop before any steering").
//!
//! # Stub behaviour
//!
//! | Driver | Stub behaviour |
//! |---|---|
//! | [`SimServo`] | Records [`Command::Servo`]; `angle()` returns the last command. |
//! | [`SimPropulsion`] | Records [`Command::Drive`] / [`Command::Stop`]. |
//! | [`SimReflectance`] | Serves patterns from a [`SharedScript`]. |
//! | [`SimRange`] | Serves distances from a [`SharedScript`]. |
//! | [`SimCamera`] | Serves frames from a [`SharedScript`]; records [`Command::Capture`]. |
//! | [`SimArrowDetector`] | Serves arrow verdicts from a [`SharedScript`]. |
//!
//! Every driver consults a [`FaultSwitch`] so tests can inject faults at
//! runtime.
//!
//! # Example
//!
//! ```rust
//! use linebot_hal::sim::SimRig;
//! use linebot_types::SensorPattern;
//!
//! let (mut rig, handles) = SimRig::new()
//!     .with_patterns([SensorPattern::new(false, true, false)])
//!     .build();
//!
//! assert!(rig.read_sensors().unwrap().middle);
//! rig.set_steering_angle(200.0).unwrap();
//! assert_eq!(handles.log.servo_angles("steering"), vec![135.0]);
//! ```

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use linebot_types::{AngleLimits, ArrowDirection, BotError, Direction, Distance, SensorPattern};

use crate::actuator::{Servo, ServoChannel};
use crate::camera::{ArrowDetector, Camera, CameraFrame};
use crate::propulsion::Propulsion;
use crate::rig::Rig;
use crate::sensors::{RangeSensor, ReflectanceArray};

pub const STEERING_ID: &str = "steering";
pub const PAN_ID: &str = "camera_pan";
pub const TILT_ID: &str = "camera_tilt";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

// ────────────────────────────────────────────────────────────────────────────
// Command log
// ────────────────────────────────────────────────────────────────────────────

/// One actuator command (or frame capture) issued to simulated hardware.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Servo { id: String, angle: f32 },
    Drive { direction: Direction, speed: u8 },
    Stop,
    Capture { camera: String },
}

/// Ordered, clone-shared record of every [`Command`].
#[derive(Debug, Clone, Default)]
pub struct CommandLog {
    entries: Arc<Mutex<Vec<Command>>>,
}

impl CommandLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, command: Command) {
        lock(&self.entries).push(command);
    }

    /// Copy of every command recorded so far.
    pub fn snapshot(&self) -> Vec<Command> {
        lock(&self.entries).clone()
    }

    pub fn len(&self) -> usize {
        lock(&self.entries).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        lock(&self.entries).clear();
    }

    /// Number of [`Command::Stop`] records.
    pub fn stop_count(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|c| matches!(c, Command::Stop))
            .count()
    }

    /// Angles commanded to the servo named `id`, in order.
    pub fn servo_angles(&self, id: &str) -> Vec<f32> {
        lock(&self.entries)
            .iter()
            .filter_map(|c| match c {
                Command::Servo { id: servo, angle } if servo == id => Some(*angle),
                _ => None,
            })
            .collect()
    }

    /// Every propulsion drive command, in order.
    pub fn drives(&self) -> Vec<(Direction, u8)> {
        lock(&self.entries)
            .iter()
            .filter_map(|c| match c {
                Command::Drive { direction, speed } => Some((*direction, *speed)),
                _ => None,
            })
            .collect()
    }

    pub fn capture_count(&self) -> usize {
        lock(&self.entries)
            .iter()
            .filter(|c| matches!(c, Command::Capture { .. }))
            .count()
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Scripts and fault injection
// ────────────────────────────────────────────────────────────────────────────

/// Queue of canned readings.  Once the queue is drained the fallback value is
/// served forever, unless the script loops.
#[derive(Debug)]
struct Script<T> {
    queue: VecDeque<T>,
    fallback: T,
    looping: bool,
    served: u64,
}

impl<T: Clone> Script<T> {
    fn next(&mut self) -> T {
        self.served += 1;
        match self.queue.pop_front() {
            Some(value) => {
                if self.looping {
                    self.queue.push_back(value.clone());
                }
                value
            }
            None => self.fallback.clone(),
        }
    }
}

/// Clone-shared handle onto a driver's script, so a test can feed new
/// readings while a behaviour is running.
#[derive(Debug)]
pub struct SharedScript<T> {
    inner: Arc<Mutex<Script<T>>>,
}

impl<T> Clone for SharedScript<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Clone> SharedScript<T> {
    pub fn new(items: impl IntoIterator<Item = T>, fallback: T) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Script {
                queue: items.into_iter().collect(),
                fallback,
                looping: false,
                served: 0,
            })),
        }
    }

    /// Replay the queued items forever instead of falling back.
    pub fn looping(self) -> Self {
        lock(&self.inner).looping = true;
        self
    }

    pub fn next(&self) -> T {
        lock(&self.inner).next()
    }

    /// Append readings to the end of the queue.
    pub fn push(&self, items: impl IntoIterator<Item = T>) {
        lock(&self.inner).queue.extend(items);
    }

    /// Drop any queued readings and serve `items` next.
    pub fn replace(&self, items: impl IntoIterator<Item = T>) {
        let mut script = lock(&self.inner);
        script.queue = items.into_iter().collect();
    }

    pub fn set_fallback(&self, fallback: T) {
        lock(&self.inner).fallback = fallback;
    }

    /// How many readings have been served.
    pub fn served(&self) -> u64 {
        lock(&self.inner).served
    }
}

/// Runtime fault injection shared by every simulated driver.
#[derive(Debug, Clone, Default)]
pub struct FaultSwitch {
    servos: Arc<AtomicBool>,
    propulsion: Arc<AtomicBool>,
    reflectance: Arc<AtomicBool>,
    range: Arc<AtomicBool>,
    camera: Arc<AtomicBool>,
}

impl FaultSwitch {
    pub fn fail_servos(&self, fail: bool) {
        self.servos.store(fail, Ordering::SeqCst);
    }

    pub fn fail_propulsion(&self, fail: bool) {
        self.propulsion.store(fail, Ordering::SeqCst);
    }

    pub fn fail_reflectance(&self, fail: bool) {
        self.reflectance.store(fail, Ordering::SeqCst);
    }

    pub fn fail_range(&self, fail: bool) {
        self.range.store(fail, Ordering::SeqCst);
    }

    pub fn fail_camera(&self, fail: bool) {
        self.camera.store(fail, Ordering::SeqCst);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Drivers
// ────────────────────────────────────────────────────────────────────────────

/// Simulated position servo.  A faulted command leaves the angle unchanged
/// and is not recorded.
pub struct SimServo {
    id: String,
    angle: f32,
    log: CommandLog,
    faults: FaultSwitch,
}

impl SimServo {
    pub fn new(id: impl Into<String>, initial: f32, log: CommandLog, faults: FaultSwitch) -> Self {
        Self {
            id: id.into(),
            angle: initial,
            log,
            faults,
        }
    }
}

impl Servo for SimServo {
    fn id(&self) -> &str {
        &self.id
    }

    fn set_angle(&mut self, degrees: f32) -> Result<(), BotError> {
        if self.faults.servos.load(Ordering::SeqCst) {
            return Err(BotError::hardware(self.id.clone(), "injected servo fault"));
        }
        self.angle = degrees;
        self.log.record(Command::Servo {
            id: self.id.clone(),
            angle: degrees,
        });
        Ok(())
    }

    fn angle(&self) -> f32 {
        self.angle
    }
}

pub struct SimPropulsion {
    log: CommandLog,
    faults: FaultSwitch,
}

impl SimPropulsion {
    pub fn new(log: CommandLog, faults: FaultSwitch) -> Self {
        Self { log, faults }
    }

    fn check(&self) -> Result<(), BotError> {
        if self.faults.propulsion.load(Ordering::SeqCst) {
            return Err(BotError::hardware("drive_motor", "injected motor fault"));
        }
        Ok(())
    }
}

impl Propulsion for SimPropulsion {
    fn id(&self) -> &str {
        "drive_motor"
    }

    fn drive(&mut self, direction: Direction, speed: u8) -> Result<(), BotError> {
        self.check()?;
        self.log.record(Command::Drive { direction, speed });
        Ok(())
    }

    fn stop(&mut self) -> Result<(), BotError> {
        self.check()?;
        self.log.record(Command::Stop);
        Ok(())
    }
}

pub struct SimReflectance {
    script: SharedScript<SensorPattern>,
    faults: FaultSwitch,
}

impl SimReflectance {
    pub fn new(script: SharedScript<SensorPattern>, faults: FaultSwitch) -> Self {
        Self { script, faults }
    }
}

impl ReflectanceArray for SimReflectance {
    fn read(&mut self) -> Result<SensorPattern, BotError> {
        if self.faults.reflectance.load(Ordering::SeqCst) {
            return Err(BotError::sensor("reflectance", "injected read fault"));
        }
        Ok(self.script.next())
    }
}

pub struct SimRange {
    script: SharedScript<Distance>,
    faults: FaultSwitch,
}

impl SimRange {
    pub fn new(script: SharedScript<Distance>, faults: FaultSwitch) -> Self {
        Self { script, faults }
    }
}

impl RangeSensor for SimRange {
    fn distance(&mut self) -> Result<Distance, BotError> {
        if self.faults.range.load(Ordering::SeqCst) {
            return Err(BotError::sensor("ultrasonic", "injected echo fault"));
        }
        Ok(self.script.next())
    }
}

/// Simulated camera serving scripted frames.
pub struct SimCamera {
    id: String,
    frames: SharedScript<CameraFrame>,
    log: CommandLog,
    faults: FaultSwitch,
}

impl SimCamera {
    pub fn new(
        id: impl Into<String>,
        frames: SharedScript<CameraFrame>,
        log: CommandLog,
        faults: FaultSwitch,
    ) -> Self {
        Self {
            id: id.into(),
            frames,
            log,
            faults,
        }
    }
}

impl Camera for SimCamera {
    fn id(&self) -> &str {
        &self.id
    }

    fn capture(&mut self) -> Result<CameraFrame, BotError> {
        self.log.record(Command::Capture {
            camera: self.id.clone(),
        });
        if self.faults.camera.load(Ordering::SeqCst) {
            return Err(BotError::VisionFault(format!(
                "{}: injected capture fault",
                self.id
            )));
        }
        Ok(self.frames.next())
    }
}

pub struct SimArrowDetector {
    verdicts: SharedScript<ArrowDirection>,
}

impl SimArrowDetector {
    pub fn new(verdicts: SharedScript<ArrowDirection>) -> Self {
        Self { verdicts }
    }
}

impl ArrowDetector for SimArrowDetector {
    fn detect(&mut self) -> Result<ArrowDirection, BotError> {
        Ok(self.verdicts.next())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// SimRig builder
// ────────────────────────────────────────────────────────────────────────────

/// Handles kept by the test after [`SimRig::build`] moves the drivers into
/// the [`Rig`].
#[derive(Debug, Clone)]
pub struct SimHandles {
    pub log: CommandLog,
    pub patterns: SharedScript<SensorPattern>,
    pub distances: SharedScript<Distance>,
    pub faults: FaultSwitch,
}

impl SimHandles {
    /// A camera sharing this rig's command log and fault switch.
    pub fn camera(&self, frames: SharedScript<CameraFrame>) -> SimCamera {
        SimCamera::new("front", frames, self.log.clone(), self.faults.clone())
    }
}

/// Builder for a [`Rig`] backed by simulated drivers.
pub struct SimRig {
    patterns: Vec<SensorPattern>,
    idle_pattern: SensorPattern,
    loop_patterns: bool,
    distances: Vec<Distance>,
    clear_distance: Distance,
    range_sensor: bool,
    steering_limits: AngleLimits,
    pan_limits: AngleLimits,
    tilt_limits: AngleLimits,
    neutral: f32,
}

impl Default for SimRig {
    fn default() -> Self {
        Self {
            patterns: Vec::new(),
            idle_pattern: SensorPattern::LOST,
            loop_patterns: false,
            distances: Vec::new(),
            clear_distance: Distance::NO_ECHO,
            range_sensor: true,
            steering_limits: AngleLimits::new(45.0, 135.0),
            pan_limits: AngleLimits::new(30.0, 150.0),
            tilt_limits: AngleLimits::new(30.0, 150.0),
            neutral: 90.0,
        }
    }
}

impl SimRig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reflectance readings served in order.
    pub fn with_patterns(mut self, patterns: impl IntoIterator<Item = SensorPattern>) -> Self {
        self.patterns.extend(patterns);
        self
    }

    /// Reading served once the scripted patterns run out (default: LOST).
    pub fn with_idle_pattern(mut self, pattern: SensorPattern) -> Self {
        self.idle_pattern = pattern;
        self
    }

    /// Replay the scripted patterns forever.
    pub fn looping_patterns(mut self) -> Self {
        self.loop_patterns = true;
        self
    }

    /// Range readings served in order.
    pub fn with_distances(mut self, distances: impl IntoIterator<Item = Distance>) -> Self {
        self.distances.extend(distances);
        self
    }

    /// Range reading served once the scripted distances run out
    /// (default: no echo).
    pub fn with_clear_distance(mut self, distance: Distance) -> Self {
        self.clear_distance = distance;
        self
    }

    pub fn without_range_sensor(mut self) -> Self {
        self.range_sensor = false;
        self
    }

    pub fn with_steering_limits(mut self, limits: AngleLimits) -> Self {
        self.steering_limits = limits;
        self
    }

    pub fn with_pan_limits(mut self, limits: AngleLimits) -> Self {
        self.pan_limits = limits;
        self
    }

    pub fn with_tilt_limits(mut self, limits: AngleLimits) -> Self {
        self.tilt_limits = limits;
        self
    }

    /// Consume the builder and return the rig plus the test-side handles.
    pub fn build(self) -> (Rig, SimHandles) {
        let log = CommandLog::new();
        let faults = FaultSwitch::default();

        let mut patterns = SharedScript::new(self.patterns, self.idle_pattern);
        if self.loop_patterns {
            patterns = patterns.looping();
        }
        let distances = SharedScript::new(self.distances, self.clear_distance);

        let channel = |id: &str, limits: AngleLimits| {
            ServoChannel::new(
                Box::new(SimServo::new(id, self.neutral, log.clone(), faults.clone())),
                limits,
                self.neutral,
            )
        };

        let mut rig = Rig::new(
            Box::new(SimPropulsion::new(log.clone(), faults.clone())),
            channel(STEERING_ID, self.steering_limits),
            channel(PAN_ID, self.pan_limits),
            channel(TILT_ID, self.tilt_limits),
            Box::new(SimReflectance::new(patterns.clone(), faults.clone())),
        );
        if self.range_sensor {
            rig = rig.with_range_sensor(Box::new(SimRange::new(distances.clone(), faults.clone())));
        }

        (
            rig,
            SimHandles {
                log,
                patterns,
                distances,
                faults,
            },
        )
    }
}
