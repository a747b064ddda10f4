//! [`LineTracker`] – the reflectance-driven line-following state machine.
//!
//! # States
//!
//! | State | Meaning |
//! |---|---|
//! | `Tracking` | read → classify → steer and drive, every period |
//! | `Recovering` | a [`RecoveryProcedure`] (and maybe an [`ExtremeRecovery`]) owns the actuators |
//!
//! While tracking, each consecutive Lost reading bumps the lost streak.  Up to
//! `lost_ceiling` readings the tracker only wiggles: stop, nudge the steering
//! alternately left (odd streak) and right (even streak), creep forward at
//! search speed, pause.  The next Lost reading starts a recovery.  Whatever
//! the outcome, the streak is reset and the tracker goes back to `Tracking`.
//!
//! When an [`ObstacleAvoidance`] is attached it is polled first on every
//! cycle; a detour replaces that cycle.

use std::sync::Arc;

use linebot_hal::Rig;
use linebot_kernel::Pacer;
use linebot_middleware::EventBus;
use linebot_perception::LineScanner;
use linebot_types::{Action, BotError, Direction, EventPayload, RecoveryStats, SensorPattern};
use tracing::{debug, info, warn};

use crate::classifier::{classify, steer_for};
use crate::config::{EscalationPolicy, RobotConfig, ms};
use crate::extreme::ExtremeRecovery;
use crate::maneuver::Maneuver;
use crate::obstacle::{DetourReport, ObstacleAvoidance};
use crate::recovery::RecoveryProcedure;
use crate::status::StatusBoard;
use crate::steering::{Steer, SteeringState};

const EVENT_SOURCE: &str = "line_tracker";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerState {
    Tracking,
    Recovering,
}

/// What one [`LineTracker::tick`] did.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Line seen; steered and drove according to the action.
    Tracked(Action),
    /// Lost, below the ceiling: wiggled.
    Wiggled { streak: u32 },
    /// Lost past the ceiling: ran a recovery.
    Recovered { reacquired: bool, escalated: bool },
    /// An obstacle was closer than the threshold; detoured instead.
    Detoured(DetourReport),
}

pub struct LineTracker {
    config: Arc<RobotConfig>,
    state: TrackerState,
    steering: SteeringState,
    lost_streak: u32,
    last_pattern: SensorPattern,
    stats: RecoveryStats,
    obstacles: Option<ObstacleAvoidance>,
    board: StatusBoard,
    bus: Option<EventBus>,
}

impl LineTracker {
    pub fn new(config: Arc<RobotConfig>) -> Self {
        let steering = SteeringState::new(config.steering.center, config.limits.steering);
        Self {
            config,
            state: TrackerState::Tracking,
            steering,
            lost_streak: 0,
            last_pattern: SensorPattern::LOST,
            stats: RecoveryStats::default(),
            obstacles: None,
            board: StatusBoard::new(),
            bus: None,
        }
    }

    /// Poll `avoidance` at the start of every cycle.
    pub fn with_obstacle_avoidance(mut self, avoidance: ObstacleAvoidance) -> Self {
        self.obstacles = Some(avoidance);
        self
    }

    /// Write status into a board shared with the supervisor.
    pub fn with_status_board(mut self, board: StatusBoard) -> Self {
        self.board = board;
        self
    }

    pub fn with_event_bus(mut self, bus: EventBus) -> Self {
        self.bus = Some(bus);
        self
    }

    pub fn state(&self) -> TrackerState {
        self.state
    }

    pub fn lost_streak(&self) -> u32 {
        self.lost_streak
    }

    pub fn stats(&self) -> RecoveryStats {
        self.stats
    }

    pub fn steering(&self) -> SteeringState {
        self.steering
    }

    // ── Loop ─────────────────────────────────────────────────────────────────

    /// Run until a stop is requested, one [`tick`](Self::tick) per tracking
    /// period.  Counters start from zero.
    pub fn run(&mut self, rig: &mut Rig, scanner: &mut dyn LineScanner, pacer: &Pacer) -> RecoveryStats {
        self.state = TrackerState::Tracking;
        self.lost_streak = 0;
        self.stats = RecoveryStats::default();

        let config = Arc::clone(&self.config);
        {
            let bus = self.bus.clone();
            let mut ops = Maneuver::new(rig, &mut self.steering, pacer, &config).with_event_bus(bus);
            ops.stop();
            ops.steer(Steer::Center);
        }
        info!(period_ms = config.tracking.period_ms, "line tracking started");

        let period = ms(config.tracking.period_ms);
        while self.tick(rig, scanner, pacer).is_ok() && pacer.hold(period).is_ok() {}

        info!(stats = ?self.stats, "line tracking stopped");
        self.stats
    }

    /// One control cycle.
    ///
    /// # Errors
    ///
    /// Only [`BotError::Interrupted`].
    pub fn tick(
        &mut self,
        rig: &mut Rig,
        scanner: &mut dyn LineScanner,
        pacer: &Pacer,
    ) -> Result<TickOutcome, BotError> {
        pacer.check()?;
        let config = Arc::clone(&self.config);
        let mut steering = self.steering;
        let result = {
            let mut ops = Maneuver::new(rig, &mut steering, pacer, &config).with_event_bus(self.bus.clone());
            self.cycle(&mut ops, scanner)
        };
        self.steering = steering;
        self.publish_status();
        result
    }

    fn cycle(&mut self, ops: &mut Maneuver<'_>, scanner: &mut dyn LineScanner) -> Result<TickOutcome, BotError> {
        let detour = match &self.obstacles {
            Some(avoidance) => avoidance.check(ops)?,
            None => None,
        };
        if let Some(report) = detour {
            self.stats.obstacles_avoided += 1;
            self.emit(EventPayload::ObstacleDetected {
                distance: report.distance,
            });
            return Ok(TickOutcome::Detoured(report));
        }

        let pattern = ops.read_pattern();
        self.last_pattern = pattern;
        let action = classify(pattern);
        let Some(steer) = steer_for(action) else {
            return self.on_lost(ops, scanner);
        };

        if self.lost_streak > 0 {
            debug!(streak = self.lost_streak, %pattern, "line found again");
        }
        self.lost_streak = 0;
        self.stats.ir_detections += 1;
        let speed = match action {
            Action::Forward => ops.config.speeds.normal,
            _ => ops.config.speeds.turn,
        };
        ops.steer(steer);
        ops.drive(Direction::Forward, speed);
        Ok(TickOutcome::Tracked(action))
    }

    fn on_lost(&mut self, ops: &mut Maneuver<'_>, scanner: &mut dyn LineScanner) -> Result<TickOutcome, BotError> {
        self.lost_streak += 1;
        let streak = self.lost_streak;
        self.emit(EventPayload::LineLost { streak });

        let config = ops.config;
        let tracking = &config.tracking;
        if streak <= tracking.lost_ceiling {
            let nudge = if streak % 2 == 1 {
                Steer::SlightLeft
            } else {
                Steer::SlightRight
            };
            debug!(streak, ?nudge, "line lost, wiggling");
            ops.stop();
            ops.steered_creep(nudge, Direction::Forward, config.speeds.search, tracking.wiggle_creep_ms)?;
            ops.hold_ms(tracking.wiggle_pause_ms)?;
            return Ok(TickOutcome::Wiggled { streak });
        }

        self.state = TrackerState::Recovering;
        let result = self.recover(ops, scanner);
        self.lost_streak = 0;
        self.state = TrackerState::Tracking;
        result
    }

    fn recover(&mut self, ops: &mut Maneuver<'_>, scanner: &mut dyn LineScanner) -> Result<TickOutcome, BotError> {
        let last = ops.steering.angle();
        let streak = self.lost_streak;
        warn!(streak, last_steering_angle = last, "line lost, starting recovery");
        self.stats.recoveries_attempted += 1;
        self.board.update(|s| {
            s.recovery_in_progress = true;
            s.lost_streak = streak;
        });

        self.emit(EventPayload::RecoveryStarted {
            last_steering_angle: last,
            extreme: false,
        });
        let report = RecoveryProcedure::new(ops, scanner).recover(last);
        let report = self.settle(report)?;
        self.emit(EventPayload::RecoveryFinished {
            reacquired: report.reacquired,
            attempts: report.attempts.len() as u32,
            extreme: false,
        });

        let mut reacquired = report.reacquired;
        let escalate = !reacquired && self.config.tracking.escalation == EscalationPolicy::Extreme;
        if escalate {
            self.stats.extreme_attempted += 1;
            self.emit(EventPayload::RecoveryStarted {
                last_steering_angle: last,
                extreme: true,
            });
            let report = ExtremeRecovery::new(ops, scanner).recover(last);
            let report = self.settle(report)?;
            self.emit(EventPayload::RecoveryFinished {
                reacquired: report.reacquired,
                attempts: report.attempts.len() as u32,
                extreme: true,
            });
            reacquired = report.reacquired;
        }

        if reacquired {
            self.stats.recoveries_succeeded += 1;
            info!("line reacquired");
        } else {
            self.stats.recoveries_failed += 1;
            warn!("recovery failed, resuming tracking");
        }
        Ok(TickOutcome::Recovered {
            reacquired,
            escalated: escalate,
        })
    }

    /// An interrupted recovery still ends, and counts as failed.
    fn settle<T>(&mut self, result: Result<T, BotError>) -> Result<T, BotError> {
        if result.is_err() {
            self.stats.recoveries_failed += 1;
        }
        result
    }

    // ── Reporting ────────────────────────────────────────────────────────────

    fn publish_status(&self) {
        let (pattern, streak, stats) = (self.last_pattern, self.lost_streak, self.stats);
        let angle = self.steering.angle();
        let recovering = self.state == TrackerState::Recovering;
        self.board.update(|s| {
            s.current_sensors = pattern;
            s.lost_streak = streak;
            s.last_steering_angle = angle;
            s.recovery_in_progress = recovering;
            s.stats = stats;
        });
    }

    fn emit(&self, payload: EventPayload) {
        if let Some(bus) = &self.bus {
            bus.emit(EVENT_SOURCE, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::status::ObstacleThreshold;
    use crate::testkit::{Bench, ScriptedScanner};
    use linebot_hal::sim::{Command, STEERING_ID, SimRig};
    use linebot_middleware::Topic;
    use linebot_types::{Distance, ScanResult};

    const LOST: SensorPattern = SensorPattern::LOST;

    fn p(left: bool, middle: bool, right: bool) -> SensorPattern {
        SensorPattern::new(left, middle, right)
    }

    fn tracker(bench: &Bench) -> LineTracker {
        LineTracker::new(Arc::new(bench.config.clone()))
    }

    fn tick(t: &mut LineTracker, bench: &mut Bench, scanner: &mut ScriptedScanner) -> TickOutcome {
        t.tick(&mut bench.rig, scanner, &bench.pacer).unwrap()
    }

    #[test]
    fn scenario_six_lost_readings_trigger_one_recovery() {
        let mut patterns = vec![p(true, true, true), p(false, true, false)];
        patterns.extend([LOST; 6]);
        let mut bench = Bench::new(SimRig::new().with_patterns(patterns));
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench);

        assert_eq!(tick(&mut t, &mut bench, &mut scanner), TickOutcome::Tracked(Action::Forward));
        assert_eq!(tick(&mut t, &mut bench, &mut scanner), TickOutcome::Tracked(Action::Forward));
        for streak in 1..=5 {
            assert_eq!(tick(&mut t, &mut bench, &mut scanner), TickOutcome::Wiggled { streak });
            assert_eq!(scanner.calls(), 0);
        }
        let outcome = tick(&mut t, &mut bench, &mut scanner);
        assert_eq!(
            outcome,
            TickOutcome::Recovered {
                reacquired: false,
                escalated: false
            }
        );
        assert_eq!(t.stats().recoveries_attempted, 1);
        assert_eq!(scanner.calls(), 3);
    }

    #[test]
    fn streak_and_state_reset_after_recovery() {
        let mut bench = Bench::new(SimRig::new());
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench);
        for _ in 0..6 {
            tick(&mut t, &mut bench, &mut scanner);
        }
        assert_eq!(t.lost_streak(), 0);
        assert_eq!(t.state(), TrackerState::Tracking);
        assert_eq!(tick(&mut t, &mut bench, &mut scanner), TickOutcome::Wiggled { streak: 1 });
    }

    #[test]
    fn every_recovery_ends_succeeded_or_failed() {
        // The first recovery finds the line and lands centred on it.
        let mut patterns = vec![LOST; 6];
        patterns.push(p(false, true, false));
        patterns.extend([LOST; 6]);
        let mut bench = Bench::new(SimRig::new().with_patterns(patterns));
        let mut scanner = ScriptedScanner::answering([Ok(ScanResult::found(90.0))]);
        let mut t = tracker(&bench);
        for _ in 0..12 {
            tick(&mut t, &mut bench, &mut scanner);
        }
        let stats = t.stats();
        assert_eq!(stats.recoveries_attempted, 2);
        assert_eq!(stats.recoveries_succeeded, 1);
        assert_eq!(stats.recoveries_failed, 1);
    }

    #[test]
    fn wiggle_alternates_and_creeps_at_search_speed() {
        let mut bench = Bench::new(SimRig::new());
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench);
        for _ in 0..3 {
            tick(&mut t, &mut bench, &mut scanner);
        }
        assert_eq!(
            bench.handles.log.servo_angles(STEERING_ID),
            vec![100.0, 80.0, 100.0]
        );
        assert!(
            bench
                .handles
                .log
                .drives()
                .iter()
                .all(|d| *d == (Direction::Forward, 8))
        );
    }

    #[test]
    fn turning_actions_use_turn_speed() {
        let sim = SimRig::new().with_patterns([p(false, false, true), p(true, true, false)]);
        let mut bench = Bench::new(sim);
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench);
        tick(&mut t, &mut bench, &mut scanner);
        tick(&mut t, &mut bench, &mut scanner);
        assert_eq!(bench.handles.log.servo_angles(STEERING_ID), vec![110.0, 80.0]);
        assert_eq!(
            bench.handles.log.drives(),
            vec![(Direction::Forward, 18), (Direction::Forward, 18)]
        );
        assert_eq!(t.steering().angle(), 80.0);
        assert_eq!(t.stats().ir_detections, 2);
    }

    #[test]
    fn escalates_only_under_the_extreme_policy() {
        for (policy, expect) in [(EscalationPolicy::Resume, false), (EscalationPolicy::Extreme, true)] {
            let mut bench = Bench::new(SimRig::new());
            bench.config.tracking.escalation = policy;
            let mut scanner = ScriptedScanner::never_found();
            let mut t = tracker(&bench);
            let mut last = None;
            for _ in 0..6 {
                last = Some(tick(&mut t, &mut bench, &mut scanner));
            }
            assert_eq!(
                last,
                Some(TickOutcome::Recovered {
                    reacquired: false,
                    escalated: expect
                })
            );
            assert_eq!(t.stats().extreme_attempted, u64::from(expect));
            assert_eq!(t.stats().recoveries_failed, 1);
        }
    }

    #[test]
    fn sensor_fault_reads_as_lost() {
        let mut bench = Bench::new(SimRig::new().with_patterns([p(true, true, true)]));
        bench.handles.faults.fail_reflectance(true);
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench);
        assert_eq!(tick(&mut t, &mut bench, &mut scanner), TickOutcome::Wiggled { streak: 1 });
    }

    #[test]
    fn actuator_faults_do_not_stop_tracking() {
        let mut bench = Bench::new(SimRig::new().with_patterns([p(false, false, true)]));
        bench.handles.faults.fail_servos(true);
        bench.handles.faults.fail_propulsion(true);
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench);
        assert_eq!(
            tick(&mut t, &mut bench, &mut scanner),
            TickOutcome::Tracked(Action::TurnLeft)
        );
        assert_eq!(t.steering().angle(), 90.0);
        assert!(bench.handles.log.is_empty());
    }

    #[test]
    fn obstacle_detour_replaces_the_cycle() {
        let sim = SimRig::new()
            .with_patterns([p(false, true, false)])
            .with_distances([Distance::from_mm(250.0)]);
        let mut bench = Bench::new(sim);
        let mut scanner = ScriptedScanner::never_found();
        let threshold = ObstacleThreshold::new(bench.config.obstacle_threshold());
        let mut t = tracker(&bench).with_obstacle_avoidance(ObstacleAvoidance::new(threshold));

        assert!(matches!(
            tick(&mut t, &mut bench, &mut scanner),
            TickOutcome::Detoured(_)
        ));
        assert_eq!(bench.handles.patterns.served(), 0);
        assert_eq!(t.stats().obstacles_avoided, 1);
        assert_eq!(
            tick(&mut t, &mut bench, &mut scanner),
            TickOutcome::Tracked(Action::Forward)
        );
    }

    #[test]
    fn status_and_events_follow_the_cycle() {
        let bus = EventBus::default();
        let mut lost_events = bus.subscribe_to(Topic::for_payload(&EventPayload::LineLost { streak: 0 }));
        let board = StatusBoard::new();
        let mut bench = Bench::new(SimRig::new().with_patterns([p(false, true, true), LOST]));
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench)
            .with_status_board(board.clone())
            .with_event_bus(bus.clone());

        tick(&mut t, &mut bench, &mut scanner);
        let snap = board.snapshot();
        assert_eq!(snap.current_sensors, p(false, true, true));
        assert_eq!(snap.last_steering_angle, 100.0);
        assert_eq!(snap.stats.ir_detections, 1);

        tick(&mut t, &mut bench, &mut scanner);
        assert_eq!(board.snapshot().lost_streak, 1);
        let events = lost_events.drain();
        assert!(
            events
                .iter()
                .any(|e| matches!(e.payload, EventPayload::LineLost { streak: 1 }))
        );
    }

    #[test]
    fn run_stops_and_centres_then_exits_on_stop() {
        let mut bench = Bench::new(SimRig::new().with_patterns([p(false, true, false)]));
        let mut scanner = ScriptedScanner::never_found();
        let mut t = tracker(&bench);
        bench.pacer.token().stop();
        let stats = t.run(&mut bench.rig, &mut scanner, &bench.pacer);
        assert_eq!(stats, RecoveryStats::default());
        assert_eq!(
            bench.handles.log.snapshot(),
            vec![
                Command::Stop,
                Command::Servo {
                    id: STEERING_ID.to_string(),
                    angle: 90.0
                }
            ]
        );
    }
}
