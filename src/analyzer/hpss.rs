//! Harmonic-Percussive Source Separation (HPSS) via median filtering.
//!
//! Harmonic content is continuous in time (horizontal median over frames),
//! percussive content is broadband (vertical median over bins). Soft masks
//! derived from both are applied to the complex STFT and inverted.

use rayon::prelude::*;

use super::stft::{generate_window, istft, stft, WindowType};

/// Parameters for HPSS processing.
#[derive(Debug, Clone, Copy)]
pub struct HpssParams {
    pub n_fft: usize,
    pub hop: usize,
    /// Width of the time-axis median filter in frames.
    pub harmonic_width: usize,
    /// Width of the frequency-axis median filter in bins.
    pub percussive_width: usize,
    /// Mask exponent.
    pub power: i32,
    /// Separation margin; 1.0 gives a complete decomposition (H + P = X).
    pub margin: f32,
}

impl Default for HpssParams {
    fn default() -> Self {
        Self {
            n_fft: 2048,
            hop: 512,
            harmonic_width: 31,
            percussive_width: 31,
            power: 2,
            margin: 1.0,
        }
    }
}

/// Separate `input` into `(harmonic, percussive)`; both have `input.len()` samples.
pub fn hpss(input: &[f32], params: &HpssParams) -> (Vec<f32>, Vec<f32>) {
    if input.is_empty() {
        return (vec![], vec![]);
    }
    let n_fft = params.n_fft;
    let hop = params.hop;
    let num_bins = n_fft / 2 + 1;

    // Centre frames by zero-padding n_fft / 2 on each side
    let pad = n_fft / 2;
    let mut padded = vec![0.0f32; input.len() + 2 * pad];
    padded[pad..pad + input.len()].copy_from_slice(input);

    let window = generate_window(WindowType::Hann, n_fft);
    let spectrum = stft(&padded, n_fft, hop, &window);
    if spectrum.is_empty() {
        return (input.to_vec(), vec![0.0; input.len()]);
    }

    let mags: Vec<Vec<f32>> = spectrum
        .iter()
        .map(|frame| frame.iter().map(|c| c.norm()).collect())
        .collect();

    let harmonic_mags = median_filter_time(&mags, params.harmonic_width);
    let percussive_mags = median_filter_freq(&mags, params.percussive_width);

    let split_zeros = params.margin == 1.0;
    let mut h_spec = spectrum.clone();
    let mut p_spec = spectrum;

    h_spec
        .par_iter_mut()
        .zip(p_spec.par_iter_mut())
        .enumerate()
        .for_each(|(t, (h_frame, p_frame))| {
            for bin in 0..num_bins {
                let h = harmonic_mags[t][bin];
                let p = percussive_mags[t][bin];
                let h_mask = soft_mask(h, p * params.margin, params.power, split_zeros);
                let p_mask = soft_mask(p, h * params.margin, params.power, split_zeros);
                h_frame[bin] *= h_mask;
                p_frame[bin] *= p_mask;
            }
        });

    let harmonic = crop(istft(&h_spec, n_fft, hop, &window), pad, input.len());
    let percussive = crop(istft(&p_spec, n_fft, hop, &window), pad, input.len());
    (harmonic, percussive)
}

/// `x^p / (x^p + reference^p)`, with both-zero cells split evenly (or zeroed).
fn soft_mask(x: f32, reference: f32, power: i32, split_zeros: bool) -> f32 {
    let z = x.max(reference);
    if z < f32::MIN_POSITIVE {
        return if split_zeros { 0.5 } else { 0.0 };
    }
    let m = (x / z).powi(power);
    let r = (reference / z).powi(power);
    m / (m + r)
}

fn crop(mut signal: Vec<f32>, offset: usize, len: usize) -> Vec<f32> {
    signal.resize(offset + len, 0.0);
    signal.drain(..offset);
    signal
}

/// Mirror an out-of-range index back into `0..n` (`d c b a | a b c d | d c b a`).
fn reflect(i: isize, n: usize) -> usize {
    let n = n as isize;
    let period = 2 * n;
    let mut k = i.rem_euclid(period);
    if k >= n {
        k = period - 1 - k;
    }
    k as usize
}

fn median(scratch: &mut [f32]) -> f32 {
    let mid = scratch.len() / 2;
    let (_, m, _) = scratch.select_nth_unstable_by(mid, |a, b| {
        a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal)
    });
    *m
}

/// Median over a window of `width` frames centred on each frame, per bin.
fn median_filter_time(mags: &[Vec<f32>], width: usize) -> Vec<Vec<f32>> {
    let num_frames = mags.len();
    if num_frames == 0 {
        return vec![];
    }
    let num_bins = mags[0].len();
    let width = width.max(1);
    let half = (width / 2) as isize;

    (0..num_frames)
        .into_par_iter()
        .map_init(
            || vec![0.0f32; width],
            |scratch, t| {
                (0..num_bins)
                    .map(|bin| {
                        for (k, slot) in scratch.iter_mut().enumerate() {
                            let idx = reflect(t as isize + k as isize - half, num_frames);
                            *slot = mags[idx][bin];
                        }
                        median(scratch.as_mut_slice())
                    })
                    .collect()
            },
        )
        .collect()
}

/// Median over a window of `width` bins centred on each bin, per frame.
fn median_filter_freq(mags: &[Vec<f32>], width: usize) -> Vec<Vec<f32>> {
    let width = width.max(1);
    let half = (width / 2) as isize;

    mags.par_iter()
        .map_init(
            || vec![0.0f32; width],
            |scratch, frame| {
                let num_bins = frame.len();
                (0..num_bins)
                    .map(|bin| {
                        for (k, slot) in scratch.iter_mut().enumerate() {
                            *slot = frame[reflect(bin as isize + k as isize - half, num_bins)];
                        }
                        median(scratch.as_mut_slice())
                    })
                    .collect()
            },
        )
        .collect()
}
