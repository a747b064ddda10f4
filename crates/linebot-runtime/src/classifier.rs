//! Reflectance pattern → steering [`Action`].
//!
//! | L M R | Action |
//! |---|---|
//! | 0 0 0 | Lost |
//! | 0 0 1 | TurnLeft |
//! | 0 1 0 | Forward |
//! | 0 1 1 | SlightLeft |
//! | 1 0 0 | TurnRight |
//! | 1 0 1 | Forward |
//! | 1 1 0 | SlightRight |
//! | 1 1 1 | Forward |
//!
//! `1 0 1` has the line under both outer sensors only, which in practice
//! means a crossing; it is kept as Forward.

use linebot_types::{Action, SensorPattern};

use crate::steering::Steer;

pub fn classify(pattern: SensorPattern) -> Action {
    match (pattern.left, pattern.middle, pattern.right) {
        (false, false, false) => Action::Lost,
        (false, false, true) => Action::TurnLeft,
        (false, true, false) => Action::Forward,
        (false, true, true) => Action::SlightLeft,
        (true, false, false) => Action::TurnRight,
        (true, false, true) => Action::Forward,
        (true, true, false) => Action::SlightRight,
        (true, true, true) => Action::Forward,
    }
}

/// Steer for a tracking action.  `None` for [`Action::Lost`].
pub fn steer_for(action: Action) -> Option<Steer> {
    match action {
        Action::Forward => Some(Steer::Center),
        Action::SlightLeft => Some(Steer::SlightLeft),
        Action::SlightRight => Some(Steer::SlightRight),
        Action::TurnLeft => Some(Steer::TurnLeft),
        Action::TurnRight => Some(Steer::TurnRight),
        Action::Lost => None,
    }
}
