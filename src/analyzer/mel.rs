//! Mel filterbank and mel-scaled magnitude spectrogram.

use ndarray::Array2;

use super::stft::{generate_window, magnitudes, pad_center, stft, WindowType};

/// Number of mel bands in every spectrogram we build.
pub const N_MELS: usize = 128;

// Slaney mel scale: linear below 1 kHz, logarithmic above.
const F_SP: f64 = 200.0 / 3.0;
const MIN_LOG_HZ: f64 = 1000.0;
const MIN_LOG_MEL: f64 = MIN_LOG_HZ / F_SP;

fn log_step() -> f64 {
    6.4f64.ln() / 27.0
}

pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MIN_LOG_HZ {
        MIN_LOG_MEL + (hz / MIN_LOG_HZ).ln() / log_step()
    } else {
        hz / F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MIN_LOG_MEL {
        MIN_LOG_HZ * (log_step() * (mel - MIN_LOG_MEL)).exp()
    } else {
        F_SP * mel
    }
}

/// Triangular mel filters (`n_mels × (n_fft/2 + 1)`), area-normalised.
pub fn mel_filterbank(sample_rate: u32, n_fft: usize, n_mels: usize, fmin: f64, fmax: f64) -> Array2<f32> {
    let num_bins = n_fft / 2 + 1;
    let nyquist = sample_rate as f64 / 2.0;

    let fft_freqs: Vec<f64> = (0..num_bins)
        .map(|i| i as f64 * nyquist / (num_bins - 1).max(1) as f64)
        .collect();

    let min_mel = hz_to_mel(fmin);
    let max_mel = hz_to_mel(fmax);
    let mel_f: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(min_mel + (max_mel - min_mel) * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut weights = Array2::<f32>::zeros((n_mels, num_bins));
    for m in 0..n_mels {
        let lower_width = mel_f[m + 1] - mel_f[m];
        let upper_width = mel_f[m + 2] - mel_f[m + 1];
        let enorm = 2.0 / (mel_f[m + 2] - mel_f[m]);
        for (bin, &f) in fft_freqs.iter().enumerate() {
            let lower = (f - mel_f[m]) / lower_width;
            let upper = (mel_f[m + 2] - f) / upper_width;
            let w = lower.min(upper).max(0.0);
            weights[[m, bin]] = (w * enorm) as f32;
        }
    }
    weights
}

/// Frame layout of a mel analysis: window of `win_length` inside frames of `n_fft`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameParams {
    pub n_fft: usize,
    pub hop_length: usize,
    pub win_length: usize,
}

/// Mel spectrogram with power 1 (magnitudes), a Blackman window and no centering.
/// Returns `N_MELS × frames`.
pub fn mel_spectrogram(samples: &[f32], sample_rate: u32, frame: &FrameParams) -> Array2<f32> {
    let window = pad_center(
        &generate_window(WindowType::Blackman, frame.win_length.min(frame.n_fft)),
        frame.n_fft,
    );
    let spectrum = stft(samples, frame.n_fft, frame.hop_length, &window);
    let num_bins = frame.n_fft / 2 + 1;
    let mags = magnitudes(&spectrum, num_bins);

    let filters = mel_filterbank(
        sample_rate,
        frame.n_fft,
        N_MELS,
        0.0,
        sample_rate as f64 / 2.0,
    );
    filters.dot(&mags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mel_scale_round_trip() {
        for hz in [0.0, 100.0, 999.0, 1000.0, 4000.0, 11025.0] {
            let back = mel_to_hz(hz_to_mel(hz));
            assert!((back - hz).abs() < 1e-6, "{} -> {}", hz, back);
        }
        assert!((hz_to_mel(1000.0) - 15.0).abs() < 1e-9);
    }

    #[test]
    fn test_filterbank_shape_and_coverage() {
        let fb = mel_filterbank(22050, 2048, N_MELS, 0.0, 11025.0);
        assert_eq!(fb.dim(), (N_MELS, 1025));
        assert!(fb.iter().all(|&w| w >= 0.0));
        // Every band picks up at least one bin at this resolution
        for m in 0..N_MELS {
            assert!(fb.row(m).iter().any(|&w| w > 0.0), "empty band {}", m);
        }
    }

    #[test]
    fn test_mel_spectrogram_frame_count() {
        let sr = 22050;
        let frame = FrameParams {
            n_fft: 4096,
            hop_length: 735,
            win_length: 2205,
        };
        let samples = vec![0.1f32; sr as usize * 2];
        let spec = mel_spectrogram(&samples, sr, &frame);
        assert_eq!(spec.nrows(), N_MELS);
        assert_eq!(spec.ncols(), (samples.len() - 4096) / 735 + 1);
    }

    #[test]
    fn test_tone_lands_in_matching_band() {
        let sr = 22050u32;
        let frame = FrameParams {
            n_fft: 2048,
            hop_length: 512,
            win_length: 2048,
        };
        let low: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 200.0 * i as f32 / sr as f32).sin())
            .collect();
        let high: Vec<f32> = (0..sr)
            .map(|i| (2.0 * std::f32::consts::PI * 5000.0 * i as f32 / sr as f32).sin())
            .collect();

        let peak_band = |s: &[f32]| {
            let spec = mel_spectrogram(s, sr, &frame);
            let col = spec.column(0);
            col.iter()
                .enumerate()
                .max_by(|a, b| a.1.partial_cmp(b.1).unwrap())
                .map(|(i, _)| i)
                .unwrap()
        };
        assert!(peak_band(&low) < peak_band(&high));
    }
}
