//! Non-negative matrix factorisation of a spectrogram into spectral
//! components and their activations over time.

use ndarray::{s, Array1, Array2, Axis};

const EPS: f32 = 1e-10;

#[derive(Debug, Clone)]
pub struct NmfParams {
    pub n_components: usize,
    pub max_iter: usize,
    /// Stop once the relative error improvement over 10 iterations falls below this.
    pub tol: f32,
}

impl Default for NmfParams {
    fn default() -> Self {
        Self {
            n_components: 2,
            max_iter: 200,
            tol: 1e-4,
        }
    }
}

/// `V ≈ components · activations`
#[derive(Debug, Clone)]
pub struct Decomposition {
    /// bins × components
    pub components: Array2<f32>,
    /// components × frames
    pub activations: Array2<f32>,
}

/// Factorise a non-negative `bins × frames` matrix with multiplicative updates.
///
/// Initialisation is deterministic: component `k` starts as the mean spectrum
/// tilted toward band `k / (n - 1)`, so repeated runs give identical output.
/// Components are returned sorted (see [`sort_components`]).
pub fn decompose(v: &Array2<f32>, params: &NmfParams) -> Decomposition {
    let (num_bins, num_frames) = v.dim();
    let n = params.n_components.max(1);

    let total: f32 = v.sum();
    if num_bins == 0 || num_frames == 0 || !(total > 0.0) {
        return Decomposition {
            components: Array2::zeros((num_bins, n)),
            activations: Array2::zeros((n, num_frames)),
        };
    }

    let (mut w, mut h) = initialize(v, n);
    let initial_error = reconstruction_error(v, &w, &h);
    let mut previous_error = initial_error;

    for iter in 1..=params.max_iter {
        // H ← H ⊙ (Wᵀ V) / (Wᵀ W H)
        let numer = w.t().dot(v);
        let denom = w.t().dot(&w).dot(&h);
        h.zip_mut_with(&numer, |x, &nu| *x *= nu);
        h.zip_mut_with(&denom, |x, &de| *x /= de + EPS);

        // W ← W ⊙ (V Hᵀ) / (W H Hᵀ)
        let numer = v.dot(&h.t());
        let denom = w.dot(&h.dot(&h.t()));
        w.zip_mut_with(&numer, |x, &nu| *x *= nu);
        w.zip_mut_with(&denom, |x, &de| *x /= de + EPS);

        if iter % 10 == 0 {
            let error = reconstruction_error(v, &w, &h);
            if initial_error > 0.0 && (previous_error - error) / initial_error < params.tol {
                log::debug!("NMF converged after {} iterations (error {:.4})", iter, error);
                break;
            }
            previous_error = error;
        }
    }

    sort_components(Decomposition {
        components: w,
        activations: h,
    })
}

fn initialize(v: &Array2<f32>, n: usize) -> (Array2<f32>, Array2<f32>) {
    let (num_bins, num_frames) = v.dim();
    let mean_spectrum: Array1<f32> = v.mean_axis(Axis(1)).unwrap_or_else(|| Array1::zeros(num_bins));
    let mean_value = v.mean().unwrap_or(0.0).max(EPS);
    let floor = mean_value * 1e-3;

    let mut w = Array2::<f32>::zeros((num_bins, n));
    for k in 0..n {
        let centre = if n > 1 { k as f32 / (n - 1) as f32 } else { 0.5 };
        for f in 0..num_bins {
            let r = if num_bins > 1 { f as f32 / (num_bins - 1) as f32 } else { 0.5 };
            let tilt = 1.5 - (r - centre).abs();
            w[[f, k]] = mean_spectrum[f] * tilt + floor;
        }
    }

    let frame_energy = v.sum_axis(Axis(0));
    let mean_energy = frame_energy.mean().unwrap_or(0.0).max(EPS);
    let scale = (mean_value / n as f32).sqrt();
    let mut h = Array2::<f32>::zeros((n, num_frames));
    for t in 0..num_frames {
        let value = scale * (frame_energy[t] / mean_energy) + floor;
        h.column_mut(t).fill(value);
    }

    (w, h)
}

fn reconstruction_error(v: &Array2<f32>, w: &Array2<f32>, h: &Array2<f32>) -> f32 {
    let approx = w.dot(h);
    v.iter()
        .zip(approx.iter())
        .map(|(&a, &b)| (a - b) * (a - b))
        .sum::<f32>()
        .sqrt()
}

/// Index of the largest entry in `column`.
fn peak_bin(column: ndarray::ArrayView1<f32>) -> usize {
    column
        .iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |(best_i, best), (i, &x)| {
            if x > best { (i, x) } else { (best_i, best) }
        })
        .0
}

/// Weighted mean bin index of `column`.
fn centroid(column: ndarray::ArrayView1<f32>) -> f32 {
    let total: f32 = column.sum();
    if total <= 0.0 {
        return 0.0;
    }
    column
        .iter()
        .enumerate()
        .map(|(i, &x)| i as f32 * x)
        .sum::<f32>()
        / total
}

/// Order components by ascending peak bin, then spectral centroid, then
/// original position, so "lowest" always comes first.
pub fn sort_components(d: Decomposition) -> Decomposition {
    let n = d.components.ncols();
    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| {
        let ca = d.components.column(a);
        let cb = d.components.column(b);
        peak_bin(ca)
            .cmp(&peak_bin(cb))
            .then(
                centroid(ca)
                    .partial_cmp(&centroid(cb))
                    .unwrap_or(std::cmp::Ordering::Equal),
            )
            .then(a.cmp(&b))
    });

    let mut components = Array2::<f32>::zeros(d.components.dim());
    let mut activations = Array2::<f32>::zeros(d.activations.dim());
    for (dst, &src) in order.iter().enumerate() {
        components
            .slice_mut(s![.., dst])
            .assign(&d.components.column(src));
        activations
            .slice_mut(s![dst, ..])
            .assign(&d.activations.row(src));
    }
    Decomposition {
        components,
        activations,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    /// Two spectral shapes (low and high) with independent activation patterns.
    fn synthetic() -> (Array2<f32>, Vec<f32>, Vec<f32>) {
        let bins = 16;
        let frames = 60;
        let low_act: Vec<f32> = (0..frames).map(|t| if t % 4 == 0 { 1.0 } else { 0.1 }).collect();
        let high_act: Vec<f32> = (0..frames).map(|t| (t as f32 / frames as f32)).collect();
        let mut v = Array2::<f32>::zeros((bins, frames));
        for t in 0..frames {
            for f in 0..bins {
                let low = if f < 4 { 1.0 } else { 0.0 };
                let high = if f >= 12 { 1.0 } else { 0.0 };
                v[[f, t]] = low * low_act[t] + high * high_act[t];
            }
        }
        (v, low_act, high_act)
    }

    fn correlation(a: &[f32], b: &[f32]) -> f32 {
        let n = a.len() as f32;
        let ma = a.iter().sum::<f32>() / n;
        let mb = b.iter().sum::<f32>() / n;
        let cov: f32 = a.iter().zip(b).map(|(x, y)| (x - ma) * (y - mb)).sum();
        let va: f32 = a.iter().map(|x| (x - ma).powi(2)).sum();
        let vb: f32 = b.iter().map(|y| (y - mb).powi(2)).sum();
        cov / (va.sqrt() * vb.sqrt())
    }

    #[test]
    fn test_recovers_low_and_high_components() {
        let (v, low_act, high_act) = synthetic();
        let d = decompose(&v, &NmfParams::default());
        assert_eq!(d.components.dim(), (16, 2));
        assert_eq!(d.activations.dim(), (2, 60));
        assert!(d.components.iter().all(|&x| x >= 0.0));
        assert!(d.activations.iter().all(|&x| x >= 0.0));

        // Sorted: first component peaks lower than the second
        assert!(peak_bin(d.components.column(0)) < peak_bin(d.components.column(1)));

        let low = d.activations.row(0).to_vec();
        let high = d.activations.row(1).to_vec();
        assert!(correlation(&low, &low_act) > 0.8);
        assert!(correlation(&high, &high_act) > 0.8);
    }

    #[test]
    fn test_deterministic() {
        let (v, _, _) = synthetic();
        let a = decompose(&v, &NmfParams::default());
        let b = decompose(&v, &NmfParams::default());
        assert_eq!(a.activations, b.activations);
    }

    #[test]
    fn test_zero_matrix() {
        let v = Array2::<f32>::zeros((8, 10));
        let d = decompose(&v, &NmfParams::default());
        assert!(d.activations.iter().all(|&x| x == 0.0));
        assert_eq!(d.activations.dim(), (2, 10));
    }

    #[test]
    fn test_sort_components_swaps() {
        let d = Decomposition {
            components: array![[0.0f32, 1.0], [1.0, 0.0]],
            activations: array![[1.0f32, 1.0], [2.0, 2.0]],
        };
        let sorted = sort_components(d);
        assert_eq!(sorted.components.column(0).to_vec(), vec![1.0, 0.0]);
        assert_eq!(sorted.activations.row(0).to_vec(), vec![2.0, 2.0]);
    }
}
