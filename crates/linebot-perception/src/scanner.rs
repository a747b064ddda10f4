//! [`LineScanner`] – camera sweep that relocates a lost line.
//!
//! The scanner drives the camera pan servo through an ordered list of
//! candidate angles.  At each angle it waits for the servo to settle,
//! analyses one frame and returns on the first positive match.  Angles after
//! the match are never visited.

use std::time::Duration;

use linebot_hal::{Camera, ServoChannel};
use linebot_kernel::Pacer;
use linebot_types::{BotError, ScanResult};
use tracing::{debug, info, warn};

use crate::detector::LineDetector;

/// Vision boundary used by recovery.
pub trait LineScanner: Send {
    /// Sweep `pan` through `candidate_angles` in order and report the first
    /// angle at which the line is visible.
    ///
    /// # Errors
    ///
    /// * [`BotError::Interrupted`] when a stop is requested mid-sweep.
    /// * [`BotError::VisionFault`] when no frame could be analysed at all.
    fn scan_for_line(
        &mut self,
        pan: &mut ServoChannel,
        candidate_angles: &[f32],
        pacer: &Pacer,
    ) -> Result<ScanResult, BotError>;
}

/// [`LineScanner`] backed by a [`Camera`] and a [`LineDetector`].
pub struct CameraLineScanner {
    camera: Box<dyn Camera>,
    detector: LineDetector,
    settle: Duration,
    between_angles: Duration,
}

impl CameraLineScanner {
    pub fn new(camera: Box<dyn Camera>, detector: LineDetector) -> Self {
        Self {
            camera,
            detector,
            settle: Duration::from_millis(300),
            between_angles: Duration::from_millis(100),
        }
    }

    /// Servo settle time before each capture, and the pause between two
    /// candidate angles.
    pub fn with_timing(mut self, settle: Duration, between_angles: Duration) -> Self {
        self.settle = settle;
        self.between_angles = between_angles;
        self
    }

    /// Capture and analyse one frame.  `None` means the frame could not be
    /// obtained or decoded.
    fn look(&mut self) -> Option<bool> {
        let frame = match self.camera.capture() {
            Ok(frame) => frame,
            Err(e) => {
                warn!(camera = self.camera.id(), error = %e, "capture failed, skipping angle");
                return None;
            }
        };
        match self.detector.detect(&frame) {
            Ok(found) => Some(found),
            Err(e) => {
                warn!(camera = self.camera.id(), error = %e, "frame analysis failed, skipping angle");
                None
            }
        }
    }
}

impl LineScanner for CameraLineScanner {
    fn scan_for_line(
        &mut self,
        pan: &mut ServoChannel,
        candidate_angles: &[f32],
        pacer: &Pacer,
    ) -> Result<ScanResult, BotError> {
        let mut analysed = 0usize;
        for (i, &requested) in candidate_angles.iter().enumerate() {
            pacer.check()?;
            if i > 0 {
                pacer.hold(self.between_angles)?;
            }
            let angle = match pan.move_to(requested) {
                Ok(angle) => angle,
                Err(e) => {
                    warn!(angle = requested, error = %e, "pan move failed, skipping angle");
                    continue;
                }
            };
            pacer.hold(self.settle)?;

            match self.look() {
                Some(true) => {
                    info!(angle, "line visible");
                    return Ok(ScanResult::found(angle));
                }
                Some(false) => {
                    analysed += 1;
                    debug!(angle, "no line at angle");
                }
                None => {}
            }
        }

        if analysed == 0 && !candidate_angles.is_empty() {
            return Err(BotError::VisionFault(
                "no frame could be analysed during the scan".to_string(),
            ));
        }
        Ok(ScanResult::not_found())
    }
}
