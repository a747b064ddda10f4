//! [`Supervisor`] – owns the hardware and runs at most one behaviour at a
//! time.
//!
//! # Ownership
//!
//! While idle the supervisor holds the [`Hardware`].  Starting a behaviour
//! first stops whatever is running, then moves the hardware into a dedicated
//! OS thread.  When the behaviour loop ends the thread sends the hardware
//! back over a channel.  No two behaviours can ever command the actuators
//! concurrently because only one of them can own the [`Rig`].
//!
//! # Stopping
//!
//! [`Supervisor::stop`] raises the behaviour's [`StopToken`].  Every wait in
//! the behaviours goes through a [`Pacer`], so the thread notices within one
//! slice.  The supervisor waits up to `join_timeout` for the hardware to come
//! back, then forces propulsion off and the servos to neutral.  If the
//! hardware does not come back in time it is reported as unavailable.
//!
//! # Collaborator interface
//!
//! | Call | Effect |
//! |---|---|
//! | `start()` | start line tracking |
//! | `start_behavior(kind)` | stop-then-start any behaviour |
//! | `stop()` | stop the running behaviour, if any |
//! | `is_running()` | a behaviour thread is alive |
//! | `status()` | [`RobotStatus`] snapshot |
//! | `set_obstacle_threshold(d)` | takes effect on the next range check |
//! | `subscribe()` | receive behaviour events |

use std::sync::Arc;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use linebot_hal::{ArrowDetector, Rig};
use linebot_kernel::{Pacer, SharedClock, StopToken, SystemClock};
use linebot_middleware::{EventBus, TopicReceiver};
use linebot_perception::LineScanner;
use linebot_types::{BehaviorKind, BotError, Distance, EventPayload, RobotStatus, SensorPattern};
use tracing::{error, info, warn};

use crate::config::{RobotConfig, ms};
use crate::maneuver::Maneuver;
use crate::navigator::ArrowNavigator;
use crate::obstacle::ObstacleAvoidance;
use crate::status::{ObstacleThreshold, StatusBoard};
use crate::steering::SteeringState;
use crate::tracker::LineTracker;

const EVENT_SOURCE: &str = "supervisor";

/// How long [`Supervisor::stop`] waits for a behaviour to hand the hardware
/// back by default.
pub const DEFAULT_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Every physical resource a behaviour may drive.
pub struct Hardware {
    pub rig: Rig,
    pub scanner: Box<dyn LineScanner>,
    /// Needed only by arrow navigation.
    pub arrows: Option<Box<dyn ArrowDetector>>,
}

impl Hardware {
    pub fn new(rig: Rig, scanner: Box<dyn LineScanner>) -> Self {
        Self {
            rig,
            scanner,
            arrows: None,
        }
    }

    pub fn with_arrow_detector(mut self, detector: Box<dyn ArrowDetector>) -> Self {
        self.arrows = Some(detector);
        self
    }
}

struct ActiveBehavior {
    kind: BehaviorKind,
    token: StopToken,
    handle: JoinHandle<()>,
    returned: Receiver<Hardware>,
}

/// State handed to a behaviour thread.
struct Shared {
    config: Arc<RobotConfig>,
    board: StatusBoard,
    threshold: ObstacleThreshold,
    bus: EventBus,
}

pub struct Supervisor {
    config: Arc<RobotConfig>,
    clock: SharedClock,
    join_timeout: Duration,
    hardware: Option<Hardware>,
    active: Option<ActiveBehavior>,
    board: StatusBoard,
    threshold: ObstacleThreshold,
    bus: EventBus,
}

impl Supervisor {
    /// # Errors
    ///
    /// [`BotError::Config`] when `config` does not validate.
    pub fn new(config: RobotConfig, hardware: Hardware) -> Result<Self, BotError> {
        config.validate()?;
        let threshold = ObstacleThreshold::new(config.obstacle_threshold());
        let board = StatusBoard::new();
        let steering_center = hardware.rig.steering().limits().clamp(config.steering.center);
        board.update(|s| {
            s.obstacle_threshold = threshold.get();
            s.last_steering_angle = steering_center;
        });
        Ok(Self {
            config: Arc::new(config),
            clock: Arc::new(SystemClock::new()),
            join_timeout: DEFAULT_JOIN_TIMEOUT,
            hardware: Some(hardware),
            active: None,
            board,
            threshold,
            bus: EventBus::default(),
        })
    }

    /// Use `clock` for every behaviour wait.
    pub fn with_clock(mut self, clock: SharedClock) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_join_timeout(mut self, timeout: Duration) -> Self {
        self.join_timeout = timeout;
        self
    }

    /// Publish onto an existing bus instead of a private one.
    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = bus;
        self
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Start line tracking.
    ///
    /// # Errors
    ///
    /// See [`start_behavior`](Self::start_behavior).
    pub fn start(&mut self) -> Result<(), BotError> {
        self.start_behavior(BehaviorKind::LineTracking)
    }

    /// Stop whatever is running, then start `kind`.  [`BehaviorKind::Idle`]
    /// only stops.
    ///
    /// # Errors
    ///
    /// [`BotError::Unavailable`] when the hardware was lost by an earlier
    /// behaviour, when arrow navigation is requested without an arrow
    /// detector, or when the behaviour thread cannot be spawned.
    pub fn start_behavior(&mut self, kind: BehaviorKind) -> Result<(), BotError> {
        self.stop();
        if kind == BehaviorKind::Idle {
            return Ok(());
        }

        let Some(hardware) = self.hardware.take() else {
            return Err(BotError::Unavailable(
                "hardware was not returned by the previous behaviour".into(),
            ));
        };
        if kind == BehaviorKind::ArrowNavigation && hardware.arrows.is_none() {
            self.hardware = Some(hardware);
            return Err(BotError::Unavailable("no arrow detector attached".into()));
        }

        let token = StopToken::new();
        let pacer = Pacer::new(Arc::clone(&self.clock), token.clone());
        let shared = Shared {
            config: Arc::clone(&self.config),
            board: self.board.clone(),
            threshold: self.threshold.clone(),
            bus: self.bus.clone(),
        };
        let (tx, returned) = mpsc::channel();

        let spawned = thread::Builder::new()
            .name(format!("linebot-{kind}"))
            .spawn(move || {
                let mut hardware = hardware;
                run_behavior(kind, &mut hardware, &pacer, &shared);
                if tx.send(hardware).is_err() {
                    warn!(behavior = %kind, "supervisor gone, dropping hardware");
                }
            });
        let handle = match spawned {
            Ok(handle) => handle,
            Err(e) => {
                error!(behavior = %kind, error = %e, "could not spawn behaviour thread");
                self.board.update(|s| s.hardware_available = false);
                return Err(BotError::Unavailable(format!("spawn failed: {e}")));
            }
        };

        info!(behavior = %kind, "behaviour started");
        self.active = Some(ActiveBehavior {
            kind,
            token,
            handle,
            returned,
        });
        self.board.update(|s| {
            s.behavior = kind;
            s.running = true;
        });
        self.bus.emit(EVENT_SOURCE, EventPayload::BehaviorChanged(kind));
        Ok(())
    }

    /// Stop the running behaviour and put the robot in its neutral pose.
    ///
    /// Returns `false` when nothing was running.
    pub fn stop(&mut self) -> bool {
        let Some(active) = self.active.take() else {
            return false;
        };
        active.token.stop();

        match active.returned.recv_timeout(self.join_timeout) {
            Ok(hardware) => {
                if active.handle.join().is_err() {
                    warn!(behavior = %active.kind, "behaviour thread panicked after handing back hardware");
                }
                self.hardware = Some(hardware);
            }
            Err(RecvTimeoutError::Timeout) => {
                error!(
                    behavior = %active.kind,
                    timeout_ms = self.join_timeout.as_millis() as u64,
                    "behaviour did not hand the hardware back in time"
                );
            }
            Err(RecvTimeoutError::Disconnected) => {
                error!(behavior = %active.kind, "behaviour thread died holding the hardware");
            }
        }

        let available = match self.hardware.as_mut() {
            Some(hardware) => {
                if let Err(e) = hardware.rig.neutral_pose() {
                    warn!(error = %e, "neutral pose incomplete after stop");
                }
                true
            }
            None => false,
        };

        self.board.update(|s| {
            s.behavior = BehaviorKind::Idle;
            s.running = false;
            s.recovery_in_progress = false;
            s.hardware_available = available;
        });
        info!(behavior = %active.kind, hardware_available = available, "behaviour stopped");
        self.bus
            .emit(EVENT_SOURCE, EventPayload::BehaviorChanged(BehaviorKind::Idle));
        true
    }

    pub fn is_running(&self) -> bool {
        self.active.as_ref().is_some_and(|a| !a.handle.is_finished())
    }

    /// The behaviour that was last started and not yet stopped.
    pub fn behavior(&self) -> BehaviorKind {
        self.active.as_ref().map_or(BehaviorKind::Idle, |a| a.kind)
    }

    // ── Collaborator interface ───────────────────────────────────────────────

    /// Snapshot for collaborators.  While idle the supervisor holds the
    /// hardware, so the reflectance array is read fresh; a failed read
    /// reports Lost.
    pub fn status(&mut self) -> RobotStatus {
        if let Some(hardware) = self.hardware.as_mut() {
            let pattern = hardware.rig.read_sensors().unwrap_or_else(|e| {
                warn!(error = %e, "reflectance read failed, reporting lost");
                SensorPattern::LOST
            });
            self.board.update(|s| s.current_sensors = pattern);
        }
        let mut status = self.board.snapshot();
        status.running = self.is_running();
        status.obstacle_threshold = self.threshold.get();
        status
    }

    /// # Errors
    ///
    /// [`BotError::Config`] unless `threshold` is a positive, finite
    /// distance.
    pub fn set_obstacle_threshold(&self, threshold: Distance) -> Result<(), BotError> {
        match threshold.millimetres() {
            Some(mm) if mm.is_finite() && mm > 0.0 => {}
            _ => {
                return Err(BotError::Config(format!(
                    "obstacle threshold must be a positive distance, got {threshold:?}"
                )));
            }
        }
        self.threshold.set(threshold);
        self.board.update(|s| s.obstacle_threshold = threshold);
        info!(?threshold, "obstacle threshold updated");
        Ok(())
    }

    /// Receive every event published by the behaviours.
    pub fn subscribe(&self) -> TopicReceiver {
        self.bus.subscribe()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.bus
    }
}

impl Drop for Supervisor {
    fn drop(&mut self) {
        self.stop();
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Behaviour loops (run on the behaviour thread)
// ─────────────────────────────────────────────────────────────────────────────

fn run_behavior(kind: BehaviorKind, hardware: &mut Hardware, pacer: &Pacer, shared: &Shared) {
    match kind {
        BehaviorKind::Idle => {}
        BehaviorKind::LineTracking => run_line_tracking(hardware, pacer, shared),
        BehaviorKind::ObstacleAvoidance => run_obstacle_avoidance(hardware, pacer, shared),
        BehaviorKind::ArrowNavigation => run_arrow_navigation(hardware, pacer, shared),
    }
}

fn run_line_tracking(hardware: &mut Hardware, pacer: &Pacer, shared: &Shared) {
    let mut tracker = LineTracker::new(Arc::clone(&shared.config))
        .with_status_board(shared.board.clone())
        .with_event_bus(shared.bus.clone());
    if hardware.rig.has_range_sensor() {
        tracker = tracker.with_obstacle_avoidance(ObstacleAvoidance::new(shared.threshold.clone()));
    }
    tracker.run(&mut hardware.rig, hardware.scanner.as_mut(), pacer);
}

fn run_obstacle_avoidance(hardware: &mut Hardware, pacer: &Pacer, shared: &Shared) {
    let config = &*shared.config;
    let avoidance = ObstacleAvoidance::new(shared.threshold.clone());
    let mut steering = SteeringState::new(config.steering.center, config.limits.steering);
    let mut ops = Maneuver::new(&mut hardware.rig, &mut steering, pacer, config)
        .with_event_bus(Some(shared.bus.clone()));
    let period = ms(config.tracking.period_ms);

    while let Ok(detour) = avoidance.cruise(&mut ops) {
        if let Some(report) = detour {
            shared.board.update(|s| s.stats.obstacles_avoided += 1);
            shared.bus.emit(
                EVENT_SOURCE,
                EventPayload::ObstacleDetected {
                    distance: report.distance,
                },
            );
        }
        let angle = ops.steering.angle();
        shared.board.update(|s| s.last_steering_angle = angle);
        if pacer.hold(period).is_err() {
            break;
        }
    }
    ops.stop();
}

fn run_arrow_navigation(hardware: &mut Hardware, pacer: &Pacer, shared: &Shared) {
    let Some(detector) = hardware.arrows.as_mut() else {
        return;
    };
    let config = &*shared.config;
    let mut navigator = ArrowNavigator::new(shared.threshold.clone());
    let mut steering = SteeringState::new(config.steering.center, config.limits.steering);
    let mut ops = Maneuver::new(&mut hardware.rig, &mut steering, pacer, config)
        .with_event_bus(Some(shared.bus.clone()));
    let period = ms(config.tracking.period_ms);

    while let Ok(direction) = navigator.step(&mut ops, detector.as_mut()) {
        let stats = navigator.stats();
        shared.board.update(|s| s.navigation = stats);
        shared.bus.emit(EVENT_SOURCE, EventPayload::ArrowDecision(direction));
        if pacer.hold(period).is_err() {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::ScriptedScanner;
    use linebot_hal::sim::{Command, SharedScript, SimArrowDetector, SimHandles, SimRig};
    use linebot_kernel::SimClock;
    use linebot_types::ArrowDirection;

    fn supervisor(sim: SimRig) -> (Supervisor, SimHandles) {
        let (rig, handles) = sim.build();
        let hardware = Hardware::new(rig, Box::new(ScriptedScanner::never_found()));
        let supervisor = Supervisor::new(RobotConfig::default(), hardware)
            .unwrap()
            .with_clock(Arc::new(SimClock::new()));
        (supervisor, handles)
    }

    fn on_line() -> SimRig {
        SimRig::new().with_idle_pattern(SensorPattern::new(false, true, false))
    }

    fn wait_until(mut done: impl FnMut() -> bool) {
        for _ in 0..500 {
            if done() {
                return;
            }
            thread::sleep(Duration::from_millis(2));
        }
        panic!("condition not reached");
    }

    #[test]
    fn stop_when_idle_does_nothing() {
        let (mut sup, handles) = supervisor(on_line());
        assert!(!sup.stop());
        assert!(!sup.is_running());
        assert!(handles.log.is_empty());
    }

    #[test]
    fn start_stop_round_trip_returns_the_hardware() {
        let (mut sup, handles) = supervisor(on_line());
        sup.start().unwrap();
        assert!(sup.is_running());
        assert_eq!(sup.behavior(), BehaviorKind::LineTracking);
        wait_until(|| !handles.log.drives().is_empty());

        assert!(sup.stop());
        assert!(!sup.is_running());
        let status = sup.status();
        assert!(status.hardware_available);
        assert_eq!(status.behavior, BehaviorKind::Idle);
        assert!(status.stats.ir_detections > 0);

        // Nothing drives after the final stop.
        let log = handles.log.snapshot();
        let last_stop = log.iter().rposition(|c| *c == Command::Stop).unwrap();
        assert!(
            !log[last_stop..]
                .iter()
                .any(|c| matches!(c, Command::Drive { .. }))
        );

        // The hardware is back, so tracking can start again.
        sup.start().unwrap();
        assert!(sup.stop());
    }

    #[test]
    fn starting_a_behaviour_stops_the_current_one() {
        let (mut sup, handles) = supervisor(on_line());
        sup.start().unwrap();
        wait_until(|| !handles.log.drives().is_empty());

        sup.start_behavior(BehaviorKind::ObstacleAvoidance).unwrap();
        assert_eq!(sup.behavior(), BehaviorKind::ObstacleAvoidance);
        assert!(sup.is_running());
        assert_eq!(sup.status().behavior, BehaviorKind::ObstacleAvoidance);
        assert!(sup.stop());
    }

    #[test]
    fn arrow_navigation_needs_a_detector() {
        let (mut sup, _handles) = supervisor(on_line());
        let err = sup.start_behavior(BehaviorKind::ArrowNavigation).unwrap_err();
        assert!(matches!(err, BotError::Unavailable(_)));
        assert!(!sup.is_running());
        // Hardware kept.
        sup.start().unwrap();
        assert!(sup.stop());
    }

    #[test]
    fn arrow_navigation_runs_with_a_detector() {
        let (rig, handles) = on_line()
            .with_distances([Distance::from_mm(100.0)])
            .build();
        let arrows = SimArrowDetector::new(SharedScript::new(Vec::new(), ArrowDirection::Right));
        let hardware = Hardware::new(rig, Box::new(ScriptedScanner::never_found()))
            .with_arrow_detector(Box::new(arrows));
        let mut sup = Supervisor::new(RobotConfig::default(), hardware)
            .unwrap()
            .with_clock(Arc::new(SimClock::new()));

        sup.start_behavior(BehaviorKind::ArrowNavigation).unwrap();
        wait_until(|| sup.status().navigation.right_turns > 0);
        assert!(sup.stop());
        assert!(handles.log.stop_count() > 0);
    }

    #[test]
    fn threshold_must_be_a_positive_distance() {
        let (mut sup, _handles) = supervisor(on_line());
        assert!(matches!(
            sup.set_obstacle_threshold(Distance::NO_ECHO),
            Err(BotError::Config(_))
        ));
        assert!(sup.set_obstacle_threshold(Distance::from_mm(-5.0)).is_err());
        sup.set_obstacle_threshold(Distance::from_mm(450.0)).unwrap();
        assert_eq!(sup.status().obstacle_threshold, Distance::from_mm(450.0));
    }

    #[test]
    fn idle_status_reads_the_sensors() {
        let (mut sup, handles) = supervisor(on_line());
        assert_eq!(sup.status().current_sensors, SensorPattern::new(false, true, false));

        handles.patterns.set_fallback(SensorPattern::new(true, true, false));
        assert_eq!(sup.status().current_sensors, SensorPattern::new(true, true, false));

        handles.faults.fail_reflectance(true);
        assert_eq!(sup.status().current_sensors, SensorPattern::LOST);
        assert!(handles.log.is_empty());
    }

    #[test]
    fn invalid_config_is_rejected() {
        let (rig, _handles) = SimRig::new().build();
        let mut config = RobotConfig::default();
        config.tracking.period_ms = 0;
        let result = Supervisor::new(config, Hardware::new(rig, Box::new(ScriptedScanner::never_found())));
        assert!(matches!(result, Err(BotError::Config(_))));
    }

    #[test]
    fn behaviour_changes_are_published() {
        let (mut sup, _handles) = supervisor(on_line());
        let mut events = sup.subscribe();
        sup.start().unwrap();
        sup.stop();
        let kinds: Vec<_> = events
            .drain()
            .into_iter()
            .filter_map(|e| match e.payload {
                EventPayload::BehaviorChanged(kind) => Some(kind),
                _ => None,
            })
            .collect();
        assert_eq!(kinds, vec![BehaviorKind::LineTracking, BehaviorKind::Idle]);
    }
}
