//! Simulated hardware for running the control core without a robot.
//!
//! The reflectance array, range sensor and arrow detector replay the
//! `[demo]` section of the config in a loop.  The camera serves light frames
//! with a dark stripe on every fourth capture, so a recovery sweep finds the
//! line a few angles into the scan.

use std::time::Duration;

use linebot_hal::CameraFrame;
use linebot_hal::sim::{SharedScript, SimArrowDetector, SimHandles, SimRig};
use linebot_perception::{CameraLineScanner, DetectorConfig, LineDetector};
use linebot_runtime::{Hardware, RobotConfig};
use linebot_types::{ArrowDirection, Distance};

use crate::config::DemoConfig;

const FRAME_WIDTH: u32 = 160;
const FRAME_HEIGHT: u32 = 120;
const STRIPE: std::ops::Range<usize> = 65..95;

/// A light frame with a dark vertical stripe down the middle.
pub fn stripe_frame() -> CameraFrame {
    let mut frame = CameraFrame::filled(FRAME_WIDTH, FRAME_HEIGHT, 220);
    let width = FRAME_WIDTH as usize;
    for row in frame.data.chunks_exact_mut(width) {
        row[STRIPE].fill(15);
    }
    frame
}

fn blank_frame() -> CameraFrame {
    CameraFrame::filled(FRAME_WIDTH, FRAME_HEIGHT, 220)
}

/// Build simulated [`Hardware`] for `robot` replaying `demo`.
///
/// # Errors
///
/// Returns a message when a track pattern does not parse.
pub fn build(robot: &RobotConfig, demo: &DemoConfig) -> Result<(Hardware, SimHandles), String> {
    let patterns = demo.patterns()?;
    let ranges = demo.ranges_mm.iter().map(|&mm| Distance::from_mm(mm));

    let (rig, handles) = SimRig::new()
        .with_patterns(patterns)
        .looping_patterns()
        .with_distances(ranges)
        .with_clear_distance(Distance::NO_ECHO)
        .with_steering_limits(robot.limits.steering)
        .with_pan_limits(robot.limits.pan)
        .with_tilt_limits(robot.limits.tilt)
        .build();
    // The looping flag lives in the shared script, so the rig's range driver
    // replays too.
    handles.distances.clone().looping();

    let frames = SharedScript::new(
        [blank_frame(), blank_frame(), blank_frame(), stripe_frame()],
        blank_frame(),
    )
    .looping();
    let detector = LineDetector::new(DetectorConfig {
        roi_height_ratio: robot.vision.roi_height_ratio,
        dark_threshold: robot.vision.dark_threshold,
        min_area: robot.vision.min_area,
    });
    let scanner = CameraLineScanner::new(Box::new(handles.camera(frames)), detector).with_timing(
        Duration::from_millis(robot.vision.settle_ms),
        Duration::from_millis(robot.vision.between_angles_ms),
    );

    let verdicts = SharedScript::new(demo.arrows.iter().copied(), ArrowDirection::None).looping();
    let hardware = Hardware::new(rig, Box::new(scanner))
        .with_arrow_detector(Box::new(SimArrowDetector::new(verdicts)));

    Ok((hardware, handles))
}
