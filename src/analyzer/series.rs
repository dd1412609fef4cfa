use serde::Serialize;

/// A named scalar series over strictly increasing timestamps (seconds).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ActivationSeries {
    pub name: String,
    pub times: Vec<f64>,
    pub values: Vec<f32>,
}

impl ActivationSeries {
    pub fn new(name: impl Into<String>, times: Vec<f64>, values: Vec<f32>) -> Self {
        debug_assert_eq!(times.len(), values.len());
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

    /// Copy of this series min-max normalised to [0, 1].
    pub fn normalized(&self) -> Self {
        Self {
            name: self.name.clone(),
            times: self.times.clone(),
            values: normalize_min_max(&self.values),
        }
    }
}

/// Min-max normalise to [0, 1]. A constant (or empty) series maps to all zeros,
/// as does any series containing non-finite values.
pub fn normalize_min_max(values: &[f32]) -> Vec<f32> {
    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    let range = max - min;
    if !range.is_finite() || range <= 0.0 || values.iter().any(|v| !v.is_finite()) {
        return vec![0.0; values.len()];
    }
    values.iter().map(|&v| (v - min) / range).collect()
}

/// Centre time of each analysis frame: `(i * hop + n_fft / 2) / sample_rate`.
pub fn frame_times(num_frames: usize, hop_length: usize, n_fft: usize, sample_rate: u32) -> Vec<f64> {
    let sr = sample_rate as f64;
    (0..num_frames)
        .map(|i| (i * hop_length + n_fft / 2) as f64 / sr)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_range() {
        let n = normalize_min_max(&[2.0, 4.0, 3.0, 6.0]);
        assert_eq!(n, vec![0.0, 0.5, 0.25, 1.0]);
        let min = n.iter().copied().fold(f32::INFINITY, f32::min);
        let max = n.iter().copied().fold(f32::NEG_INFINITY, f32::max);
        assert_eq!(min, 0.0);
        assert_eq!(max, 1.0);
    }

    #[test]
    fn test_normalize_degenerate() {
        assert_eq!(normalize_min_max(&[0.3; 5]), vec![0.0; 5]);
        assert_eq!(normalize_min_max(&[0.0; 3]), vec![0.0; 3]);
        assert!(normalize_min_max(&[]).is_empty());
        assert_eq!(normalize_min_max(&[1.0, f32::NAN]), vec![0.0; 2]);
    }

    #[test]
    fn test_frame_times() {
        let t = frame_times(3, 100, 200, 1000);
        assert_eq!(t, vec![0.1, 0.2, 0.3]);
    }
}
