use image::{Rgb, RgbImage};

use super::{clamped_pixel, Effect};

/// Splits the red and blue channels horizontally in opposite directions.
#[derive(Debug, Clone, Copy)]
pub struct ChromaticAberration {
    /// Channel offset in pixels at full signal.
    pub max_shift: f32,
}

impl ChromaticAberration {
    pub fn new(max_shift: f32) -> Self {
        Self { max_shift }
    }
}

impl Effect for ChromaticAberration {
    fn name(&self) -> &'static str {
        "chromatic_aberration"
    }

    fn apply(&self, frame: &RgbImage, signal: f32) -> RgbImage {
        let shift = (signal.clamp(0.0, 1.0) * self.max_shift).round() as i64;
        if signal <= 0.0 || shift == 0 {
            return frame.clone();
        }

        RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let (x, y) = (x as i64, y as i64);
            let r = clamped_pixel(frame, x + shift, y)[0];
            let g = clamped_pixel(frame, x, y)[1];
            let b = clamped_pixel(frame, x - shift, y)[2];
            Rgb([r, g, b])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::pattern;

    #[test]
    fn test_green_channel_untouched() {
        let frame = pattern(32, 16);
        let out = ChromaticAberration::new(6.0).apply(&frame, 1.0);
        for (a, b) in frame.pixels().zip(out.pixels()) {
            assert_eq!(a[1], b[1]);
        }
    }

    #[test]
    fn test_red_shifted_by_scaled_amount() {
        let frame = pattern(32, 16);
        let out = ChromaticAberration::new(8.0).apply(&frame, 0.5);
        // shift = 4 → red at x comes from x + 4
        assert_eq!(out.get_pixel(10, 3)[0], frame.get_pixel(14, 3)[0]);
        assert_eq!(out.get_pixel(10, 3)[2], frame.get_pixel(6, 3)[2]);
    }

    #[test]
    fn test_tiny_signal_rounds_to_identity() {
        let frame = pattern(16, 16);
        assert_eq!(ChromaticAberration::new(8.0).apply(&frame, 0.01), frame);
    }
}
