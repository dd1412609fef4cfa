//! Self-recurrence smoothing: each spectrogram column is replaced by the
//! affinity-weighted average of its nearest neighbours under cosine distance.

use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;

/// Sparse recurrence structure: for each frame, its neighbours with affinity weights.
#[derive(Debug, Clone)]
pub struct Recurrence {
    pub neighbors: Vec<Vec<(usize, f32)>>,
}

/// Neighbour count for `num_frames` frames: `2·⌈√(T − 1)⌉`, capped at `T − 1`.
pub fn default_k(num_frames: usize) -> usize {
    if num_frames < 2 {
        return 0;
    }
    let k = 2 * ((num_frames - 1) as f64).sqrt().ceil() as usize;
    k.min(num_frames - 1)
}

/// Cosine similarity between two vectors; zero vectors are dissimilar to everything.
fn cosine_similarity(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;

    for (&x, &y) in a.iter().zip(b) {
        dot += x as f64 * y as f64;
        norm_a += x as f64 * x as f64;
        norm_b += y as f64 * y as f64;
    }

    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom < 1e-10 {
        0.0
    } else {
        dot / denom
    }
}

/// Build the k-nearest-neighbour affinity recurrence over the columns of `spec`.
pub fn recurrence_affinity(spec: &Array2<f32>, k: usize) -> Recurrence {
    let num_frames = spec.ncols();
    let k = k.min(num_frames.saturating_sub(1));
    if k == 0 {
        return Recurrence {
            neighbors: vec![Vec::new(); num_frames],
        };
    }

    let columns: Vec<Vec<f32>> = spec.axis_iter(Axis(1)).map(|c| c.to_vec()).collect();

    // Cosine distance → 0 = identical, 2 = opposite. Keep the k closest, self excluded.
    let distances: Vec<Vec<(usize, f64)>> = (0..num_frames)
        .into_par_iter()
        .map(|i| {
            let mut row: Vec<(usize, f64)> = (0..num_frames)
                .filter(|&j| j != i)
                .map(|j| (j, 1.0 - cosine_similarity(&columns[i], &columns[j])))
                .collect();
            let by_distance = |a: &(usize, f64), b: &(usize, f64)| {
                a.1.partial_cmp(&b.1)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.0.cmp(&b.0))
            };
            row.select_nth_unstable_by(k - 1, by_distance);
            row.truncate(k);
            row.sort_by(by_distance);
            row
        })
        .collect();

    let bandwidth = median(
        distances
            .iter()
            .filter_map(|row| row.last().map(|&(_, d)| d))
            .collect(),
    );

    let neighbors = distances
        .into_iter()
        .map(|row| {
            row.into_iter()
                .map(|(j, d)| {
                    let affinity = if bandwidth > 1e-12 {
                        (-d / bandwidth).exp()
                    } else {
                        1.0
                    };
                    (j, affinity as f32)
                })
                .collect()
        })
        .collect();

    Recurrence { neighbors }
}

fn median(mut values: Vec<f64>) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let n = values.len();
    if n % 2 == 1 {
        values[n / 2]
    } else {
        (values[n / 2 - 1] + values[n / 2]) / 2.0
    }
}

/// Replace each column by the weighted average of its recurrence neighbours.
/// Columns without neighbours (or with zero total weight) are kept as-is.
pub fn nn_filter(spec: &Array2<f32>, rec: &Recurrence) -> Array2<f32> {
    let mut out = spec.clone();
    for (i, neighbors) in rec.neighbors.iter().enumerate() {
        let total: f32 = neighbors.iter().map(|&(_, w)| w).sum();
        if neighbors.is_empty() || total <= 0.0 {
            continue;
        }
        let mut acc = Array1::<f32>::zeros(spec.nrows());
        for &(j, w) in neighbors {
            acc.scaled_add(w, &spec.column(j));
        }
        acc /= total;
        out.column_mut(i).assign(&acc);
    }
    out
}

/// Recurrence smoothing with the default neighbour count.
pub fn smooth(spec: &Array2<f32>) -> Array2<f32> {
    let rec = recurrence_affinity(spec, default_k(spec.ncols()));
    nn_filter(spec, &rec)
}
