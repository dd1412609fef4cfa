//! Spectrum bar overlay: one RGBA frame per spectrogram column.

use image::{Rgba, RgbaImage};
use thiserror::Error;

use crate::analyzer::Spectrogram;
use crate::config::VisualizerConfig;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum VisualizerError {
    #[error("Invalid bar colour '{0}' (expected #rrggbb)")]
    BadColor(String),
}

/// How bars are drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BarStyle {
    pub color: Rgba<u8>,
    /// Fraction of the frame height a bar at 1.0 reaches.
    pub height_fraction: f32,
    /// Fraction of each bar's slot that is filled.
    pub bar_width_fraction: f32,
}

impl Default for BarStyle {
    fn default() -> Self {
        Self {
            color: Rgba([0xab, 0x20, 0xfd, 0xff]),
            height_fraction: 0.2,
            bar_width_fraction: 0.8,
        }
    }
}

impl BarStyle {
    pub fn from_config(config: &VisualizerConfig) -> Result<Self, VisualizerError> {
        Ok(Self {
            color: parse_hex_color(&config.color)?,
            height_fraction: config.height_fraction.clamp(0.0, 1.0),
            bar_width_fraction: config.bar_width_fraction.clamp(0.0, 1.0),
        })
    }
}

/// Parse `#rrggbb` (or `rrggbb`) into an opaque colour.
pub fn parse_hex_color(text: &str) -> Result<Rgba<u8>, VisualizerError> {
    let hex = text.trim().trim_start_matches('#');
    if hex.len() != 6 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(VisualizerError::BadColor(text.to_string()));
    }
    let channel = |i: usize| {
        u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| VisualizerError::BadColor(text.to_string()))
    };
    Ok(Rgba([channel(0)?, channel(2)?, channel(4)?, 0xff]))
}

/// Draw one bar per entry of `column` across a transparent `width`×`height` canvas.
///
/// Bars are bottom-aligned and evenly spaced; values are clamped to [0, 1].
pub fn render_bar_chart(column: &[f32], width: u32, height: u32, style: &BarStyle) -> RgbaImage {
    let mut canvas = RgbaImage::new(width, height);
    if column.is_empty() || width == 0 || height == 0 {
        return canvas;
    }

    let slot = width as f32 / column.len() as f32;
    let bar_width = slot * style.bar_width_fraction;
    let max_height = height as f32 * style.height_fraction;

    for (i, &value) in column.iter().enumerate() {
        let value = if value.is_finite() { value.clamp(0.0, 1.0) } else { 0.0 };
        let bar_height = (value * max_height).round() as u32;
        if bar_height == 0 || bar_width <= 0.0 {
            continue;
        }

        let left = i as f32 * slot + (slot - bar_width) / 2.0;
        let x0 = (left.round() as u32).min(width - 1);
        let x1 = ((left + bar_width).round() as u32).clamp(x0 + 1, width);
        let y0 = height - bar_height.min(height);

        for y in y0..height {
            for x in x0..x1 {
                canvas.put_pixel(x, y, style.color);
            }
        }
    }
    canvas
}

/// The bar overlay as a frame source clocked at the output frame rate.
pub struct Visualizer {
    spectrogram: Spectrogram,
    width: u32,
    height: u32,
    fps: f64,
    style: BarStyle,
}

impl Visualizer {
    /// `spectrogram` is expected to be globally normalised to [0, 1].
    pub fn new(spectrogram: Spectrogram, width: u32, height: u32, fps: f64, style: BarStyle) -> Self {
        log::debug!(
            "Visualizer: {} frames of {} bars at {}x{}",
            spectrogram.num_frames(),
            spectrogram.num_bands(),
            width,
            height
        );
        Self {
            spectrogram,
            width,
            height,
            fps,
            style,
        }
    }

    /// Number of overlay frames (one per spectrogram column).
    pub fn len(&self) -> usize {
        self.spectrogram.num_frames()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    /// Overlay frame `index`, or `None` past the end.
    pub fn frame(&self, index: usize) -> Option<RgbaImage> {
        if index >= self.len() {
            return None;
        }
        let column: Vec<f32> = self.spectrogram.data.column(index).to_vec();
        Some(render_bar_chart(&column, self.width, self.height, &self.style))
    }

    /// Overlay for output time `t` (frame `round(t · fps)`).
    pub fn overlay_at(&self, t: f64) -> Option<RgbaImage> {
        if !(t >= 0.0) {
            return None;
        }
        self.frame((t * self.fps).round() as usize)
    }
}
