//! `linebot-perception` – camera-assisted line search.
//!
//! # Modules
//!
//! - [`detector`] – [`LineDetector`][detector::LineDetector]: threshold and
//!   connected-component area filter over the bottom of a frame.
//! - [`scanner`] – the [`LineScanner`][scanner::LineScanner] boundary used by
//!   recovery, and [`CameraLineScanner`][scanner::CameraLineScanner], which
//!   sweeps the pan servo and stops at the first angle showing the line.

pub mod detector;
pub mod scanner;

pub use detector::{DetectorConfig, LineDetector};
pub use scanner::{CameraLineScanner, LineScanner};
