use image::RgbImage;

use super::{clamped_pixel, Effect};

/// Displaces each row horizontally along a sine of the row index.
#[derive(Debug, Clone, Copy)]
pub struct SinWaveDistortion {
    /// Peak displacement in pixels at full signal.
    pub amplitude: f32,
    /// Rows per sine period.
    pub wavelength: f32,
}

impl SinWaveDistortion {
    pub fn new(amplitude: f32, wavelength: f32) -> Self {
        Self {
            amplitude,
            wavelength: wavelength.max(1.0),
        }
    }

    fn row_offset(&self, y: u32, signal: f32) -> i64 {
        let phase = 2.0 * std::f32::consts::PI * y as f32 / self.wavelength;
        (signal * self.amplitude * phase.sin()).round() as i64
    }
}

impl Effect for SinWaveDistortion {
    fn name(&self) -> &'static str {
        "sin_wave_distortion"
    }

    fn apply(&self, frame: &RgbImage, signal: f32) -> RgbImage {
        if signal <= 0.0 {
            return frame.clone();
        }
        let signal = signal.min(1.0);
        let offsets: Vec<i64> = (0..frame.height())
            .map(|y| self.row_offset(y, signal))
            .collect();

        RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            clamped_pixel(frame, x as i64 - offsets[y as usize], y as i64)
        })
    }
}
