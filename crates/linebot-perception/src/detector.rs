//! [`LineDetector`] – "is there a dark line in this frame?".
//!
//! The detector works on the bottom part of the frame only (the track just
//! ahead of the robot), marks every pixel at or below a darkness threshold,
//! groups the marked pixels into 4-connected components and reports a line
//! when any component is larger than `min_area` pixels.
//!
//! ```text
//!  ┌───────────────┐
//!  │               │  ignored (1 - roi_height_ratio)
//!  ├───────────────┤
//!  │      ███      │
//!  │      ███      │  region of interest
//!  │      ███      │
//!  └───────────────┘
//! ```

use std::collections::VecDeque;

use linebot_hal::CameraFrame;
use linebot_types::BotError;

/// Tunables for [`LineDetector`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DetectorConfig {
    /// Fraction of the frame height, counted from the bottom, that is
    /// analysed.
    pub roi_height_ratio: f32,
    /// Pixels with luma `<=` this value count as line.
    pub dark_threshold: u8,
    /// A component must be strictly larger than this many pixels.
    pub min_area: usize,
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            roi_height_ratio: 0.6,
            dark_threshold: 50,
            min_area: 1_500,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct LineDetector {
    config: DetectorConfig,
}

impl LineDetector {
    pub fn new(config: DetectorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &DetectorConfig {
        &self.config
    }

    /// Convert a greyscale or packed RGB24 frame to one luma byte per pixel.
    ///
    /// # Errors
    ///
    /// Returns [`BotError::VisionFault`] when the buffer length matches
    /// neither layout.
    pub fn luma(frame: &CameraFrame) -> Result<Vec<u8>, BotError> {
        let pixels = frame.pixel_count();
        if pixels == 0 {
            return Err(BotError::VisionFault("empty frame".to_string()));
        }
        if frame.data.len() == pixels {
            return Ok(frame.data.clone());
        }
        if frame.data.len() == pixels * 3 {
            return Ok(frame
                .data
                .chunks_exact(3)
                .map(|px| {
                    let y = 299 * u32::from(px[0]) + 587 * u32::from(px[1]) + 114 * u32::from(px[2]);
                    (y / 1_000) as u8
                })
                .collect());
        }
        Err(BotError::VisionFault(format!(
            "frame buffer of {} bytes does not fit {}x{}",
            frame.data.len(),
            frame.width,
            frame.height
        )))
    }

    /// Size in pixels of the largest dark component inside the ROI.
    pub fn largest_dark_area(&self, frame: &CameraFrame) -> Result<usize, BotError> {
        let luma = Self::luma(frame)?;
        let width = frame.width as usize;
        let height = frame.height as usize;

        let ratio = self.config.roi_height_ratio.clamp(0.0, 1.0);
        let roi_rows = ((height as f32) * ratio).round() as usize;
        let top = height - roi_rows.min(height);

        let threshold = self.config.dark_threshold;
        let dark = |x: usize, y: usize| luma[y * width + x] <= threshold;

        let mut visited = vec![false; width * height];
        let mut queue = VecDeque::new();
        let mut largest = 0;

        for y in top..height {
            for x in 0..width {
                let idx = y * width + x;
                if visited[idx] || !dark(x, y) {
                    continue;
                }
                visited[idx] = true;
                queue.push_back((x, y));
                let mut area = 0;
                while let Some((cx, cy)) = queue.pop_front() {
                    area += 1;
                    let neighbours = [
                        (cx.wrapping_sub(1), cy),
                        (cx + 1, cy),
                        (cx, cy.wrapping_sub(1)),
                        (cx, cy + 1),
                    ];
                    for (nx, ny) in neighbours {
                        if nx >= width || ny < top || ny >= height {
                            continue;
                        }
                        let n = ny * width + nx;
                        if !visited[n] && dark(nx, ny) {
                            visited[n] = true;
                            queue.push_back((nx, ny));
                        }
                    }
                }
                largest = largest.max(area);
            }
        }
        Ok(largest)
    }

    /// `true` when a dark component larger than `min_area` is in the ROI.
    pub fn detect(&self, frame: &CameraFrame) -> Result<bool, BotError> {
        Ok(self.largest_dark_area(frame)? > self.config.min_area)
    }
}
