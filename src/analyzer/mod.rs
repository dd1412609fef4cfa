pub mod decode;
pub mod hpss;
pub mod mel;
pub mod nmf;
pub mod recurrence;
pub mod series;
pub mod stft;

use std::path::Path;

use ndarray::Array2;
use thiserror::Error;

use decode::AudioSignal;
use mel::FrameParams;
use series::{frame_times, normalize_min_max, ActivationSeries};

#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("Decode error: {0}")]
    Decode(#[from] decode::DecodeError),
    #[error("Invalid time range: start {start:.3}s, end {end:.3}s, audio duration {duration:.3}s")]
    InvalidTimeRange { start: f64, end: f64, duration: f64 },
    #[error("Invalid analysis parameter: {0}")]
    InvalidParams(String),
}

/// Inputs that shape the analysis, in video terms.
#[derive(Debug, Clone, Copy)]
pub struct AnalysisParams {
    pub start_time: f64,
    /// `None` = to the end of the audio.
    pub end_time: Option<f64>,
    pub fps: f64,
    /// Analysis window length in video frames.
    pub frame_smoothing: f64,
}

impl Default for AnalysisParams {
    fn default() -> Self {
        Self {
            start_time: 0.0,
            end_time: None,
            fps: 30.0,
            frame_smoothing: 3.0,
        }
    }
}

/// A magnitude spectrogram (`bands × frames`) with the time of each frame.
#[derive(Debug, Clone)]
pub struct Spectrogram {
    pub data: Array2<f32>,
    pub times: Vec<f64>,
}

impl Spectrogram {
    pub fn num_frames(&self) -> usize {
        self.data.ncols()
    }

    pub fn num_bands(&self) -> usize {
        self.data.nrows()
    }

    /// Copy with every cell min-max normalised against the global range.
    pub fn normalized(&self) -> Spectrogram {
        let flat: Vec<f32> = self.data.iter().copied().collect();
        let norm = normalize_min_max(&flat);
        let data = Array2::from_shape_vec(self.data.raw_dim(), norm)
            .unwrap_or_else(|_| Array2::zeros(self.data.raw_dim()));
        Spectrogram {
            data,
            times: self.times.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Analysis {
    /// Activation of the lower-pitched component, normalised to [0, 1].
    pub low: ActivationSeries,
    /// Activation of the higher-pitched component, normalised to [0, 1].
    pub high: ActivationSeries,
    /// Unsmoothed percussive mel spectrogram, globally normalised, for the visualizer.
    pub display: Spectrogram,
    pub frame: FrameParams,
    pub sample_rate: u32,
    /// The analysed window in source-audio seconds.
    pub start_time: f64,
    pub end_time: f64,
}

impl Analysis {
    pub fn duration(&self) -> f64 {
        self.end_time - self.start_time
    }
}

/// Derive STFT layout from the target video frame rate.
pub fn frame_params(sample_rate: u32, fps: f64, frame_smoothing: f64) -> FrameParams {
    let sr = sample_rate as f64;
    let hop_length = (sr / fps).round().max(1.0) as usize;
    let win_length = (frame_smoothing * sr / fps).round().max(1.0) as usize;
    FrameParams {
        n_fft: win_length.next_power_of_two(),
        hop_length,
        win_length,
    }
}

/// Validate `[start, end)` against the audio and resolve an open end.
///
/// `tolerance` allows `end` to overshoot the audio slightly (one video frame)
/// before it is rejected; overshoot within tolerance is clamped.
pub fn resolve_time_range(
    start: f64,
    end: Option<f64>,
    duration: f64,
    tolerance: f64,
) -> Result<(f64, f64), AnalyzeError> {
    let end_value = end.unwrap_or(duration);
    let invalid = || AnalyzeError::InvalidTimeRange {
        start,
        end: end_value,
        duration,
    };

    if !start.is_finite() || !end_value.is_finite() || start < 0.0 {
        return Err(invalid());
    }
    if start >= end_value || start >= duration || end_value > duration + tolerance {
        return Err(invalid());
    }
    Ok((start, end_value.min(duration)))
}

/// Run the full analysis: trim, HPSS, mel spectrogram, recurrence smoothing,
/// rank-2 decomposition, normalisation.
pub fn analyze(signal: &AudioSignal, params: &AnalysisParams) -> Result<Analysis, AnalyzeError> {
    if !(params.fps > 0.0) || !params.fps.is_finite() {
        return Err(AnalyzeError::InvalidParams(format!("fps must be positive, got {}", params.fps)));
    }
    if !(params.frame_smoothing > 0.0) || !params.frame_smoothing.is_finite() {
        return Err(AnalyzeError::InvalidParams(format!(
            "frame smoothing must be positive, got {}",
            params.frame_smoothing
        )));
    }
    if signal.sample_rate == 0 {
        return Err(AnalyzeError::InvalidParams("sample rate is zero".to_string()));
    }

    let (start, end) = resolve_time_range(
        params.start_time,
        params.end_time,
        signal.duration(),
        1.0 / params.fps,
    )?;
    let trimmed = signal.trim(start, end);
    let sr = trimmed.sample_rate;

    let frame = frame_params(sr, params.fps, params.frame_smoothing);
    log::debug!(
        "Analysis window {:.3}s..{:.3}s: hop {} win {} n_fft {} ({} samples @ {} Hz)",
        start,
        end,
        frame.hop_length,
        frame.win_length,
        frame.n_fft,
        trimmed.samples.len(),
        sr
    );

    log::info!("Separating harmonic and percussive components");
    let (_harmonic, percussive) = hpss::hpss(&trimmed.samples, &hpss::HpssParams::default());

    log::info!("Computing mel spectrogram");
    let mel = mel::mel_spectrogram(&percussive, sr, &frame);
    let times = frame_times(mel.ncols(), frame.hop_length, frame.n_fft, sr);
    log::debug!("{} analysis frames", times.len());

    log::info!("Smoothing spectrogram by self-recurrence");
    let smoothed = recurrence::smooth(&mel);

    log::info!("Decomposing into low/high components");
    let decomposition = nmf::decompose(&smoothed, &nmf::NmfParams::default());
    let low = ActivationSeries::new(
        "low",
        times.clone(),
        decomposition.activations.row(0).to_vec(),
    )
    .normalized();
    let high = ActivationSeries::new(
        "high",
        times.clone(),
        decomposition.activations.row(1).to_vec(),
    )
    .normalized();

    let display = Spectrogram { data: mel, times }.normalized();

    Ok(Analysis {
        low,
        high,
        display,
        frame,
        sample_rate: sr,
        start_time: start,
        end_time: end,
    })
}

/// Load `path` and analyse it.
pub fn analyze_file(path: &Path, ffmpeg: &Path, params: &AnalysisParams) -> Result<Analysis, AnalyzeError> {
    let signal = decode::load_audio(path, ffmpeg)?;
    analyze(&signal, params)
}
