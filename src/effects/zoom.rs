use image::{Rgb, RgbImage};

use super::{clamped_pixel, Effect};

/// Centred magnification by `1 + signal · max_zoom`, bilinear sampling.
#[derive(Debug, Clone, Copy)]
pub struct Zoom {
    pub max_zoom: f32,
}

impl Zoom {
    pub fn new(max_zoom: f32) -> Self {
        Self {
            max_zoom: max_zoom.max(0.0),
        }
    }
}

fn lerp(a: u8, b: u8, t: f32) -> f32 {
    a as f32 + (b as f32 - a as f32) * t
}

fn sample_bilinear(frame: &RgbImage, x: f32, y: f32) -> Rgb<u8> {
    let x0 = x.floor();
    let y0 = y.floor();
    let tx = x - x0;
    let ty = y - y0;
    let (x0, y0) = (x0 as i64, y0 as i64);

    let p00 = clamped_pixel(frame, x0, y0);
    let p10 = clamped_pixel(frame, x0 + 1, y0);
    let p01 = clamped_pixel(frame, x0, y0 + 1);
    let p11 = clamped_pixel(frame, x0 + 1, y0 + 1);

    let mut out = [0u8; 3];
    for (c, slot) in out.iter_mut().enumerate() {
        let top = lerp(p00[c], p10[c], tx);
        let bottom = lerp(p01[c], p11[c], tx);
        *slot = (top + (bottom - top) * ty).round().clamp(0.0, 255.0) as u8;
    }
    Rgb(out)
}

impl Effect for Zoom {
    fn name(&self) -> &'static str {
        "zoom"
    }

    fn apply(&self, frame: &RgbImage, signal: f32) -> RgbImage {
        if signal <= 0.0 || self.max_zoom == 0.0 {
            return frame.clone();
        }
        let scale = 1.0 + signal.min(1.0) * self.max_zoom;
        let cx = frame.width() as f32 / 2.0;
        let cy = frame.height() as f32 / 2.0;

        RgbImage::from_fn(frame.width(), frame.height(), |x, y| {
            let sx = (x as f32 + 0.5 - cx) / scale + cx - 0.5;
            let sy = (y as f32 + 0.5 - cy) / scale + cy - 0.5;
            sample_bilinear(frame, sx, sy)
        })
    }
}
