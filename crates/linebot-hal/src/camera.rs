//! Camera capture and camera-based classifier boundaries.

use linebot_types::{ArrowDirection, BotError};

/// A raw image frame returned by a camera driver.
#[derive(Debug, Clone)]
pub struct CameraFrame {
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Raw pixel data, either 8-bit greyscale or packed RGB24.
    pub data: Vec<u8>,
}

impl CameraFrame {
    /// A greyscale frame filled with `value`.
    pub fn filled(width: u32, height: u32, value: u8) -> Self {
        Self {
            width,
            height,
            data: vec![value; width as usize * height as usize],
        }
    }

    /// Number of pixels in the frame.
    pub fn pixel_count(&self) -> usize {
        self.width as usize * self.height as usize
    }
}

/// A camera or image-capture device.
pub trait Camera: Send {
    /// Stable identifier for this camera, e.g. `"front"`.
    fn id(&self) -> &str;

    /// Capture and return the next available frame.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::VisionFault`] if the frame cannot be captured
    /// (e.g. the device is disconnected or the buffer is unavailable).
    fn capture(&mut self) -> Result<CameraFrame, BotError>;
}

/// External arrow-marker classifier.
///
/// The visual classifier itself lives outside this workspace; the control
/// core only consumes its verdict.
pub trait ArrowDetector: Send {
    /// Classify the marker currently in view.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::VisionFault`] when no frame could be analysed.
    fn detect(&mut self) -> Result<ArrowDirection, BotError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    struct MockCamera {
        id: String,
    }

    impl Camera for MockCamera {
        fn id(&self) -> &str {
            &self.id
        }

        fn capture(&mut self) -> Result<CameraFrame, BotError> {
            Ok(CameraFrame::filled(2, 2, 255))
        }
    }

    #[test]
    fn mock_camera_capture() {
        let mut cam = MockCamera {
            id: "front".to_string(),
        };
        assert_eq!(cam.id(), "front");
        let frame = cam.capture().unwrap();
        assert_eq!(frame.width, 2);
        assert_eq!(frame.height, 2);
        assert_eq!(frame.pixel_count(), 4);
        assert!(frame.data.iter().all(|&b| b == 255));
    }
}
