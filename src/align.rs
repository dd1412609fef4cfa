//! Nearest-neighbour resampling of analysis-rate series onto video frame times.

use std::cmp::Ordering;

use thiserror::Error;

use crate::analyzer::series::{normalize_min_max, ActivationSeries};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AlignError {
    #[error("Cannot align empty series '{0}'")]
    EmptySeries(String),
}

/// A series resampled onto target timestamps, stored as sorted `(time, value)` pairs.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedSignal {
    pub name: String,
    times: Vec<f64>,
    values: Vec<f32>,
}

impl AlignedSignal {
    /// Build from parallel vectors; entries are sorted by time.
    pub fn from_pairs(name: impl Into<String>, mut pairs: Vec<(f64, f32)>) -> Self {
        pairs.sort_by(|a, b| a.0.total_cmp(&b.0));
        let (times, values) = pairs.into_iter().unzip();
        Self {
            name: name.into(),
            times,
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// Value stored at exactly `t`, if any. No interpolation, no tolerance.
    pub fn get(&self, t: f64) -> Option<f32> {
        self.times
            .binary_search_by(|probe| probe.total_cmp(&t))
            .ok()
            .map(|i| self.values[i])
    }

    pub fn contains(&self, t: f64) -> bool {
        self.get(t).is_some()
    }
}

/// Index of the source time nearest to `t`; equidistant ties go to the earlier one.
/// `source` must be sorted ascending and non-empty.
fn nearest_index(source: &[f64], t: f64) -> usize {
    let upper = source.partition_point(|&s| s < t);
    if upper == 0 {
        return 0;
    }
    if upper == source.len() {
        return source.len() - 1;
    }
    let before = t - source[upper - 1];
    let after = source[upper] - t;
    match after.partial_cmp(&before) {
        Some(Ordering::Less) => upper,
        _ => upper - 1,
    }
}

/// Resample `series` onto `target_times` (nearest match), then re-normalise to [0, 1].
///
/// O((n + m) log n): one binary search per target time.
pub fn align(series: &ActivationSeries, target_times: &[f64]) -> Result<AlignedSignal, AlignError> {
    if series.is_empty() {
        return Err(AlignError::EmptySeries(series.name.clone()));
    }

    let picked: Vec<f32> = target_times
        .iter()
        .map(|&t| series.values[nearest_index(&series.times, t)])
        .collect();
    let normalized = normalize_min_max(&picked);

    Ok(AlignedSignal::from_pairs(
        series.name.clone(),
        target_times.iter().copied().zip(normalized).collect(),
    ))
}

/// Frame timestamps `i / fps` for every frame starting inside `[0, duration)`.
pub fn frame_times(duration: f64, fps: f64) -> Vec<f64> {
    if !(duration > 0.0) || !(fps > 0.0) {
        return vec![];
    }
    let mut times = Vec::with_capacity((duration * fps).ceil() as usize);
    let mut i = 0u64;
    loop {
        let t = i as f64 / fps;
        if t >= duration {
            break;
        }
        times.push(t);
        i += 1;
    }
    times
}

#[cfg(test)]
mod tests {
    use super::*;

    fn series(times: Vec<f64>, values: Vec<f32>) -> ActivationSeries {
        ActivationSeries::new("test", times, values)
    }

    #[test]
    fn test_nearest_index_ties_go_earlier() {
        let source = [0.0, 1.0, 2.0];
        assert_eq!(nearest_index(&source, -5.0), 0);
        assert_eq!(nearest_index(&source, 0.4), 0);
        assert_eq!(nearest_index(&source, 0.5), 0);
        assert_eq!(nearest_index(&source, 0.6), 1);
        assert_eq!(nearest_index(&source, 1.0), 1);
        assert_eq!(nearest_index(&source, 1.5), 1);
        assert_eq!(nearest_index(&source, 9.0), 2);
    }

    #[test]
    fn test_align_length_and_values() {
        let s = series(vec![0.0, 0.1, 0.2, 0.3], vec![0.0, 1.0, 0.5, 0.25]);
        let targets = vec![0.0, 0.04, 0.09, 0.16, 0.26, 0.5, 0.7];
        let aligned = align(&s, &targets).unwrap();
        assert_eq!(aligned.len(), targets.len());
        // picked: 0.0, 0.0, 1.0, 0.5, 0.25, 0.25, 0.25 → already spans [0, 1]
        assert_eq!(aligned.values(), &[0.0, 0.0, 1.0, 0.5, 0.25, 0.25, 0.25]);
    }

    #[test]
    fn test_align_renormalizes() {
        // Targets only ever land on the 0.2 and 0.6 entries
        let s = series(vec![0.0, 1.0, 2.0], vec![0.2, 0.6, 1.0]);
        let aligned = align(&s, &[0.0, 0.2, 1.1]).unwrap();
        assert_eq!(aligned.values(), &[0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_align_degenerate_is_zero() {
        let s = series(vec![0.0, 1.0], vec![0.0, 0.0]);
        let aligned = align(&s, &[0.0, 0.5, 1.0]).unwrap();
        assert!(aligned.values().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn test_align_empty_series() {
        let s = series(vec![], vec![]);
        assert_eq!(
            align(&s, &[0.0]).unwrap_err(),
            AlignError::EmptySeries("test".to_string())
        );
    }

    #[test]
    fn test_exact_lookup() {
        let targets = frame_times(1.0, 30.0);
        let s = series(vec![0.0, 0.5], vec![0.0, 1.0]);
        let aligned = align(&s, &targets).unwrap();
        for &t in &targets {
            assert!(aligned.contains(t));
        }
        assert_eq!(aligned.get(targets[20]), Some(1.0));
        assert_eq!(aligned.get(0.5000001), None);
        assert_eq!(aligned.get(2.0), None);
    }

    #[test]
    fn test_frame_times() {
        let t = frame_times(1.0, 30.0);
        assert_eq!(t.len(), 30);
        assert_eq!(t[0], 0.0);
        assert!(*t.last().unwrap() < 1.0);
        assert_eq!(frame_times(10.0, 30.0).len(), 300);
        assert_eq!(frame_times(0.05, 30.0).len(), 2);
        assert!(frame_times(0.0, 30.0).is_empty());
    }
}
