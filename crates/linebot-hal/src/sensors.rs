//! Reflectance and ranging sensor traits.

use linebot_types::{BotError, Distance, SensorPattern};

/// The fixed left/middle/right array of binary reflectance sensors.
pub trait ReflectanceArray: Send {
    /// Instantaneous, non-blocking read of all three sensors.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::SensorFault`] if any sensor cannot be read.
    fn read(&mut self) -> Result<SensorPattern, BotError>;
}

/// Forward-facing ranging sensor (ultrasonic or similar).
pub trait RangeSensor: Send {
    /// Instantaneous distance to the nearest obstacle ahead, or
    /// [`Distance::NO_ECHO`].
    ///
    /// # Errors
    ///
    /// Returns [`BotError::SensorFault`] if the sensor cannot be read.
    fn distance(&mut self) -> Result<Distance, BotError>;
}
