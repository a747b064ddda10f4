//! [`ArrowNavigator`] – maze mode driven by arrow markers.
//!
//! One [`ArrowNavigator::step`]:
//!
//! 1. Centre the head and the steering, then cruise forward at normal speed,
//!    polling the range sensor every tracking period, until something is
//!    closer than the obstacle threshold.
//! 2. Stop and let the robot settle.
//! 3. Take `samples` readings from the [`ArrowDetector`], spaced by
//!    `sample_interval`, and keep the majority.  Ties resolve in the order
//!    left, right, none.
//! 4. Act on it:
//!    * none: reverse for `reverse_ms`;
//!    * left / right: back up steered to the opposite sharp side, advance
//!      steered to the chosen sharp side for `turn_ms`, centre the steering.
//!
//! A failed detection counts as a `None` vote.

use linebot_hal::ArrowDetector;
use linebot_types::{ArrowDirection, BotError, Direction, NavigationStats};
use tracing::{debug, info, warn};

use crate::maneuver::Maneuver;
use crate::status::ObstacleThreshold;
use crate::steering::Steer;

/// Vote counts for one decision.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Votes {
    pub left: u32,
    pub right: u32,
    pub none: u32,
}

impl Votes {
    pub fn record(&mut self, direction: ArrowDirection) {
        match direction {
            ArrowDirection::Left => self.left += 1,
            ArrowDirection::Right => self.right += 1,
            ArrowDirection::None => self.none += 1,
        }
    }

    /// Majority direction; ties go left, then right, then none.
    pub fn winner(&self) -> ArrowDirection {
        let top = self.left.max(self.right).max(self.none);
        if self.left == top {
            ArrowDirection::Left
        } else if self.right == top {
            ArrowDirection::Right
        } else {
            ArrowDirection::None
        }
    }
}

#[derive(Debug, Clone)]
pub struct ArrowNavigator {
    threshold: ObstacleThreshold,
    stats: NavigationStats,
}

impl ArrowNavigator {
    pub fn new(threshold: ObstacleThreshold) -> Self {
        Self {
            threshold,
            stats: NavigationStats::default(),
        }
    }

    pub fn stats(&self) -> NavigationStats {
        self.stats
    }

    /// Cruise to the next wall, read the arrow and turn.
    ///
    /// # Errors
    ///
    /// Only [`BotError::Interrupted`], in which case propulsion has been
    /// stopped.
    pub fn step(
        &mut self,
        ops: &mut Maneuver<'_>,
        detector: &mut dyn ArrowDetector,
    ) -> Result<ArrowDirection, BotError> {
        let result = self.run_step(ops, detector);
        if result.is_err() {
            ops.stop();
        }
        result
    }

    fn run_step(
        &mut self,
        ops: &mut Maneuver<'_>,
        detector: &mut dyn ArrowDetector,
    ) -> Result<ArrowDirection, BotError> {
        let config = ops.config;
        let nav = &config.navigation;

        self.cruise_to_obstacle(ops)?;
        self.stats.obstacles_reached += 1;
        ops.hold_ms(nav.sample_interval_ms)?;

        let votes = self.vote(ops, detector)?;
        let direction = votes.winner();
        info!(?direction, ?votes, "arrow decision");
        if direction != ArrowDirection::None {
            self.stats.arrows_detected += 1;
        }

        let search = config.speeds.search;
        let normal = config.speeds.normal;
        match direction {
            ArrowDirection::None => {
                ops.creep(Direction::Reverse, search, nav.reverse_ms)?;
                self.stats.reversals += 1;
            }
            ArrowDirection::Left | ArrowDirection::Right => {
                let turn = if direction == ArrowDirection::Left {
                    self.stats.left_turns += 1;
                    Steer::SharpLeft
                } else {
                    self.stats.right_turns += 1;
                    Steer::SharpRight
                };
                ops.pacer.check()?;
                ops.steered_creep(turn.mirrored(), Direction::Reverse, search, nav.backup_ms)?;
                ops.pacer.check()?;
                ops.steered_creep(turn, Direction::Forward, normal, nav.turn_ms)?;
                ops.steer(Steer::Center);
            }
        }
        Ok(direction)
    }

    fn cruise_to_obstacle(&self, ops: &mut Maneuver<'_>) -> Result<(), BotError> {
        let config = ops.config;
        ops.tilt(config.head.tilt_normal);
        ops.pan(config.head.pan_center);
        ops.steer(Steer::Center);
        ops.pacer.check()?;
        ops.drive(Direction::Forward, config.speeds.normal);
        loop {
            ops.pacer.check()?;
            let distance = ops.read_distance();
            if distance.is_within(self.threshold.get()) {
                debug!(?distance, "wall reached");
                break;
            }
            ops.hold_ms(config.tracking.period_ms)?;
        }
        ops.stop();
        Ok(())
    }

    fn vote(&self, ops: &mut Maneuver<'_>, detector: &mut dyn ArrowDetector) -> Result<Votes, BotError> {
        let nav = &ops.config.navigation;
        let mut votes = Votes::default();
        for sample in 1..=nav.samples {
            ops.pacer.check()?;
            let direction = detector.detect().unwrap_or_else(|e| {
                warn!(sample, error = %e, "arrow detection failed, counting as none");
                ArrowDirection::None
            });
            debug!(sample, ?direction, "arrow sample");
            votes.record(direction);
            if sample < nav.samples {
                ops.hold_ms(nav.sample_interval_ms)?;
            }
        }
        Ok(votes)
    }
}
