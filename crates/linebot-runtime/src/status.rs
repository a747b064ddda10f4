//! Shared, lock-protected [`RobotStatus`] and the runtime-adjustable
//! obstacle threshold.
//!
//! The behaviour thread writes the board every cycle; the supervisor (and,
//! through it, dashboard and voice collaborators) reads snapshots.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use linebot_types::{Distance, RobotStatus};

/// Clone-shared status snapshot.
#[derive(Debug, Clone, Default)]
pub struct StatusBoard {
    inner: Arc<Mutex<RobotStatus>>,
}

impl StatusBoard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mutate the status in place and stamp `updated_at`.
    pub fn update(&self, f: impl FnOnce(&mut RobotStatus)) {
        let mut status = self.inner.lock().unwrap_or_else(|e| e.into_inner());
        f(&mut status);
        status.updated_at = Utc::now();
    }

    pub fn snapshot(&self) -> RobotStatus {
        self.inner.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

/// Obstacle threshold shared between the supervisor and a running
/// behaviour.  Stored as the bit pattern of an `f32` millimetre value.
#[derive(Debug, Clone)]
pub struct ObstacleThreshold {
    millimetres: Arc<AtomicU32>,
}

impl ObstacleThreshold {
    pub fn new(threshold: Distance) -> Self {
        let mm = threshold.millimetres().unwrap_or(0.0);
        Self {
            millimetres: Arc::new(AtomicU32::new(mm.to_bits())),
        }
    }

    pub fn get(&self) -> Distance {
        Distance::from_mm(f32::from_bits(self.millimetres.load(Ordering::SeqCst)))
    }

    pub fn set(&self, threshold: Distance) {
        let mm = threshold.millimetres().unwrap_or(0.0);
        self.millimetres.store(mm.to_bits(), Ordering::SeqCst);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use linebot_types::SensorPattern;

    #[test]
    fn update_is_visible_to_clones() {
        let board = StatusBoard::new();
        let reader = board.clone();
        let before = reader.snapshot().updated_at;
        board.update(|s| {
            s.lost_streak = 4;
            s.current_sensors = SensorPattern::new(true, false, false);
        });
        let snap = reader.snapshot();
        assert_eq!(snap.lost_streak, 4);
        assert!(snap.current_sensors.left);
        assert!(snap.updated_at >= before);
    }

    #[test]
    fn threshold_is_shared() {
        let threshold = ObstacleThreshold::new(Distance::from_mm(300.0));
        let behaviour_side = threshold.clone();
        threshold.set(Distance::from_mm(450.0));
        assert_eq!(behaviour_side.get(), Distance::from_mm(450.0));
    }
}
