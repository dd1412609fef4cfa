//! Short-time Fourier transform helpers shared by HPSS and the mel front end.

use ndarray::Array2;
use rayon::prelude::*;
use rustfft::{num_complex::Complex, FftPlanner};
use std::f64::consts::PI;

pub const COMPLEX_ZERO: Complex<f32> = Complex { re: 0.0, im: 0.0 };

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowType {
    Hann,
    Blackman,
}

/// Periodic (DFT-even) window of `size` samples.
pub fn generate_window(window_type: WindowType, size: usize) -> Vec<f32> {
    match size {
        0 => return vec![],
        1 => return vec![1.0],
        _ => {}
    }
    let n = size as f64;
    (0..size)
        .map(|i| {
            let x = 2.0 * PI * i as f64 / n;
            let w = match window_type {
                WindowType::Hann => 0.5 - 0.5 * x.cos(),
                WindowType::Blackman => 0.42 - 0.5 * x.cos() + 0.08 * (2.0 * x).cos(),
            };
            w as f32
        })
        .collect()
}

/// Zero-pad `window` on both sides to `size`, keeping it centred.
pub fn pad_center(window: &[f32], size: usize) -> Vec<f32> {
    if window.len() >= size {
        return window[..size].to_vec();
    }
    let lpad = (size - window.len()) / 2;
    let mut out = vec![0.0; size];
    out[lpad..lpad + window.len()].copy_from_slice(window);
    out
}

/// Number of full frames of `frame_len` at `hop` that fit in `num_samples`.
pub fn frame_count(num_samples: usize, frame_len: usize, hop: usize) -> usize {
    if hop == 0 || frame_len == 0 || num_samples < frame_len {
        0
    } else {
        (num_samples - frame_len) / hop + 1
    }
}

/// Complex STFT without centering. Returns one `n_fft / 2 + 1` bin vector per frame.
///
/// `window` must already be `n_fft` long (see [`pad_center`]).
pub fn stft(input: &[f32], n_fft: usize, hop: usize, window: &[f32]) -> Vec<Vec<Complex<f32>>> {
    let num_frames = frame_count(input.len(), n_fft, hop);
    let num_bins = n_fft / 2 + 1;
    let fft = FftPlanner::new().plan_fft_forward(n_fft);

    (0..num_frames)
        .into_par_iter()
        .map_init(
            || vec![COMPLEX_ZERO; n_fft],
            |buf, frame_idx| {
                let pos = frame_idx * hop;
                for (i, slot) in buf.iter_mut().enumerate() {
                    *slot = Complex::new(input[pos + i] * window[i], 0.0);
                }
                fft.process(buf);
                buf[..num_bins].to_vec()
            },
        )
        .collect()
}

/// Magnitude spectrogram (bins × frames) from a complex STFT.
pub fn magnitudes(frames: &[Vec<Complex<f32>>], num_bins: usize) -> Array2<f32> {
    let mut mags = Array2::<f32>::zeros((num_bins, frames.len()));
    for (t, frame) in frames.iter().enumerate() {
        for (bin, c) in frame.iter().enumerate().take(num_bins) {
            mags[[bin, t]] = c.norm();
        }
    }
    mags
}

/// Inverse STFT by windowed overlap-add, normalised by the summed squared window.
/// Output has `(frames - 1) * hop + n_fft` samples.
pub fn istft(frames: &[Vec<Complex<f32>>], n_fft: usize, hop: usize, window: &[f32]) -> Vec<f32> {
    if frames.is_empty() {
        return vec![];
    }
    let num_bins = n_fft / 2 + 1;
    let out_len = (frames.len() - 1) * hop + n_fft;
    let ifft = FftPlanner::new().plan_fft_inverse(n_fft);
    let norm = 1.0 / n_fft as f32;

    let mut out = vec![0.0f32; out_len];
    let mut window_sum = vec![0.0f32; out_len];
    let mut buf = vec![COMPLEX_ZERO; n_fft];

    for (frame_idx, spectrum) in frames.iter().enumerate() {
        buf.fill(COMPLEX_ZERO);
        for bin in 0..num_bins {
            buf[bin] = spectrum[bin];
            // Mirror negative frequencies
            if bin > 0 && bin < n_fft - bin {
                buf[n_fft - bin] = spectrum[bin].conj();
            }
        }
        ifft.process(&mut buf);

        let pos = frame_idx * hop;
        for i in 0..n_fft {
            out[pos + i] += buf[i].re * norm * window[i];
            window_sum[pos + i] += window[i] * window[i];
        }
    }

    let max_ws = window_sum.iter().copied().fold(0.0f32, f32::max);
    let min_ws = (max_ws * 1e-3).max(1e-8);
    for (sample, ws) in out.iter_mut().zip(&window_sum) {
        if *ws > min_ws {
            *sample /= *ws;
        }
    }
    out
}
