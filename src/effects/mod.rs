//! Per-frame image effects modulated by a scalar signal in [0, 1].
//!
//! Every effect is a pure function of one frame and one scalar, and a
//! signal of 0 (or below) returns the frame unchanged.

pub mod chromatic;
pub mod wave;
pub mod zoom;

use image::RgbImage;

pub use chromatic::ChromaticAberration;
pub use wave::SinWaveDistortion;
pub use zoom::Zoom;

use crate::config::EffectsConfig;

pub trait Effect: Send + Sync {
    fn name(&self) -> &'static str;

    /// Transform `frame` at strength `signal`. Must be total over [0, 1].
    fn apply(&self, frame: &RgbImage, signal: f32) -> RgbImage;
}

/// Which signal drives an effect in the default chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalBand {
    Low,
    High,
}

impl SignalBand {
    pub fn name(self) -> &'static str {
        match self {
            SignalBand::Low => "low",
            SignalBand::High => "high",
        }
    }
}

/// The standard chain: chromatic aberration and wave distortion follow the
/// high component, zoom follows the low one. Order matters.
pub fn default_chain(config: &EffectsConfig) -> Vec<(Box<dyn Effect>, SignalBand)> {
    vec![
        (
            Box::new(ChromaticAberration::new(config.chromatic_max_shift)) as Box<dyn Effect>,
            SignalBand::High,
        ),
        (
            Box::new(SinWaveDistortion::new(
                config.wave_amplitude,
                config.wave_wavelength,
            )),
            SignalBand::High,
        ),
        (Box::new(Zoom::new(config.zoom_max)), SignalBand::Low),
    ]
}

/// Read a pixel with coordinates clamped to the image edge.
pub(crate) fn clamped_pixel(frame: &RgbImage, x: i64, y: i64) -> image::Rgb<u8> {
    let cx = x.clamp(0, frame.width() as i64 - 1) as u32;
    let cy = y.clamp(0, frame.height() as i64 - 1) as u32;
    *frame.get_pixel(cx, cy)
}

#[cfg(test)]
pub(crate) mod test_support {
    use image::{Rgb, RgbImage};

    /// A frame with structure in every channel so that geometric effects are visible.
    pub fn pattern(width: u32, height: u32) -> RgbImage {
        RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 255) / width.max(1)) as u8,
                ((y * 255) / height.max(1)) as u8,
                (((x / 4 + y / 4) % 2) * 200) as u8,
            ])
        })
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::pattern;
    use super::*;

    #[test]
    fn test_zero_signal_is_identity_for_all_effects() {
        let frame = pattern(48, 32);
        for (effect, _) in default_chain(&EffectsConfig::default()) {
            assert_eq!(effect.apply(&frame, 0.0), frame, "{}", effect.name());
        }
    }

    #[test]
    fn test_full_signal_changes_frame() {
        let frame = pattern(64, 48);
        for (effect, _) in default_chain(&EffectsConfig::default()) {
            let out = effect.apply(&frame, 1.0);
            assert_eq!(out.dimensions(), frame.dimensions());
            assert_ne!(out, frame, "{}", effect.name());
        }
    }

    #[test]
    fn test_default_chain_order() {
        let chain = default_chain(&EffectsConfig::default());
        let names: Vec<_> = chain.iter().map(|(e, b)| (e.name(), b.name())).collect();
        assert_eq!(
            names,
            vec![
                ("chromatic_aberration", "high"),
                ("sin_wave_distortion", "high"),
                ("zoom", "low"),
            ]
        );
    }

    #[test]
    fn test_clamped_pixel() {
        let frame = pattern(8, 8);
        assert_eq!(clamped_pixel(&frame, -3, 2), *frame.get_pixel(0, 2));
        assert_eq!(clamped_pixel(&frame, 20, 20), *frame.get_pixel(7, 7));
    }
}
