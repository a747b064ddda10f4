//! Hardware abstraction layer for the line-following robot.
//!
//! | Module | Contents |
//! |---|---|
//! | [`actuator`] | [`Servo`] trait and the limit-enforcing [`ServoChannel`]. |
//! | [`propulsion`] | [`Propulsion`] trait for the drive motor. |
//! | [`sensors`] | [`ReflectanceArray`] and [`RangeSensor`] traits. |
//! | [`camera`] | [`Camera`] capture and the external [`ArrowDetector`] boundary. |
//! | [`rig`] | [`Rig`], the owned bundle of one handle per physical resource. |
//! | [`sim`] | Recording drivers and the [`SimRig`][sim::SimRig] builder. |

pub mod actuator;
pub mod camera;
pub mod propulsion;
pub mod rig;
pub mod sensors;
pub mod sim;

pub use actuator::{Servo, ServoChannel};
pub use camera::{ArrowDetector, Camera, CameraFrame};
pub use propulsion::{MAX_SPEED, Propulsion};
pub use rig::Rig;
pub use sensors::{RangeSensor, ReflectanceArray};
