//! `create_animation`: resolve inputs, analyse the audio, build the effect
//! chain and visualizer, then encode.

use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::align::{align, frame_times, AlignError};
use crate::analyzer::decode::{load_audio, DecodeError};
use crate::analyzer::{analyze, resolve_time_range, AnalysisParams, AnalyzeError};
use crate::config::AppConfig;
use crate::effects::{default_chain, SignalBand};
use crate::media::{detect_media, FrameSource, MediaInfo, MediaKind, SourceError, StillImage, VideoClip};
use crate::pipeline::{compose, EffectChain, EffectStage, LookupMode};
use crate::render::{render, AudioTrack, EncodeError, RenderError, RenderOutput};
use crate::timecode::{TimeArg, TimecodeError};
use crate::visualizer::{BarStyle, Visualizer, VisualizerError};

#[derive(Error, Debug)]
pub enum AnimateError {
    #[error("Could not load audio: {0}")]
    AudioLoad(DecodeError),
    #[error("Invalid time range: start {start:.3}s, end {end:.3}s, audio duration {duration:.3}s")]
    InvalidTimeRange { start: f64, end: f64, duration: f64 },
    #[error("Analysis produced an empty '{0}' series (audio window too short?)")]
    EmptySeries(String),
    #[error("Encode error: {0}")]
    Encode(EncodeError),
    #[error(
        "Audio ({audio:.3}s) and video ({video:.3}s) durations differ by more than {tolerance:.3}s"
    )]
    AudioSync { audio: f64, video: f64, tolerance: f64 },
    #[error("{0} is neither an image nor a video")]
    UnsupportedMediaType(PathBuf),
    #[error("Both an image and a video were given; pick one")]
    ConflictingSources,
    #[error("No image or video given")]
    MissingVisualSource,
    #[error("No audio given and {0} has no audio track")]
    MissingAudio(String),
    #[error("Visual source error: {0}")]
    Source(SourceError),
    #[error("{0}")]
    Timecode(#[from] TimecodeError),
    #[error("Invalid parameter: {0}")]
    InvalidParams(String),
}

impl From<AnalyzeError> for AnimateError {
    fn from(e: AnalyzeError) -> Self {
        match e {
            AnalyzeError::Decode(e) => AnimateError::AudioLoad(e),
            AnalyzeError::InvalidTimeRange { start, end, duration } => {
                AnimateError::InvalidTimeRange { start, end, duration }
            }
            AnalyzeError::InvalidParams(msg) => AnimateError::InvalidParams(msg),
        }
    }
}

impl From<AlignError> for AnimateError {
    fn from(e: AlignError) -> Self {
        match e {
            AlignError::EmptySeries(name) => AnimateError::EmptySeries(name),
        }
    }
}

impl From<SourceError> for AnimateError {
    fn from(e: SourceError) -> Self {
        match e {
            SourceError::UnsupportedMediaType(path) => AnimateError::UnsupportedMediaType(path),
            other => AnimateError::Source(other),
        }
    }
}

impl From<RenderError> for AnimateError {
    fn from(e: RenderError) -> Self {
        match e {
            RenderError::Source(e) => e.into(),
            RenderError::Encode(e) => AnimateError::Encode(e),
            RenderError::AudioSync { audio, video, tolerance } => {
                AnimateError::AudioSync { audio, video, tolerance }
            }
            RenderError::InvalidParams(msg) => AnimateError::InvalidParams(msg),
        }
    }
}

impl From<VisualizerError> for AnimateError {
    fn from(e: VisualizerError) -> Self {
        AnimateError::InvalidParams(e.to_string())
    }
}

/// Everything `create_animation` needs to know.
#[derive(Debug, Clone)]
pub struct AnimationRequest {
    pub img: Option<PathBuf>,
    pub audio: Option<PathBuf>,
    pub video: Option<PathBuf>,
    pub output: PathBuf,
    pub start_time: TimeArg,
    /// `None` = to the end of the audio.
    pub end_time: Option<TimeArg>,
    /// Output frame rate; ignored for video sources, which keep their own.
    pub fps: f64,
    /// Analysis window length in video frames.
    pub frame_smoothing: f64,
    pub visualizer: bool,
    pub show_progress: bool,
}

impl AnimationRequest {
    pub fn new(output: impl Into<PathBuf>) -> Self {
        Self {
            img: None,
            audio: None,
            video: None,
            output: output.into(),
            start_time: TimeArg(0.0),
            end_time: None,
            fps: 30.0,
            frame_smoothing: 3.0,
            visualizer: true,
            show_progress: false,
        }
    }

    /// Set the start from seconds or "M:SS" text.
    pub fn start_at(mut self, text: &str) -> Result<Self, AnimateError> {
        self.start_time = text.parse()?;
        Ok(self)
    }

    /// Set the end from seconds or "M:SS" text.
    pub fn end_at(mut self, text: &str) -> Result<Self, AnimateError> {
        self.end_time = Some(text.parse()?);
        Ok(self)
    }
}

enum Visual {
    Image(PathBuf),
    Video(PathBuf, MediaInfo),
}

fn resolve_visual(request: &AnimationRequest, ffprobe: &Path) -> Result<Visual, AnimateError> {
    let path = match (&request.img, &request.video) {
        (Some(_), Some(_)) => return Err(AnimateError::ConflictingSources),
        (None, None) => return Err(AnimateError::MissingVisualSource),
        (Some(path), None) | (None, Some(path)) => path,
    };

    match detect_media(path, ffprobe)? {
        MediaKind::Image => {
            if request.video.is_some() {
                log::warn!("{} is an image; using it as a still", path.display());
            }
            Ok(Visual::Image(path.clone()))
        }
        MediaKind::Video(info) => {
            if request.img.is_some() {
                log::info!("{} is a video; using video mode", path.display());
            }
            Ok(Visual::Video(path.clone(), info))
        }
    }
}

/// A fully wired render: effect chain, overlay and audio window, ready to encode.
pub struct PreparedAnimation {
    pub source: EffectChain<Box<dyn FrameSource>>,
    pub visualizer: Option<Visualizer>,
    pub audio: AudioTrack,
    pub duration: f64,
    pub fps: f64,
}

impl PreparedAnimation {
    /// Output frame timestamps, identical to the ones the signals were aligned to.
    pub fn frame_times(&self) -> Vec<f64> {
        frame_times(self.duration, self.fps)
    }
}

/// Resolve inputs, analyse the audio and assemble the frame pipeline.
pub fn prepare(request: &AnimationRequest, config: &AppConfig) -> Result<PreparedAnimation, AnimateError> {
    let encoder = &config.encoder;
    let visual = resolve_visual(request, &encoder.ffprobe)?;

    let audio_path = match (&request.audio, &visual) {
        (Some(path), _) => path.clone(),
        (None, Visual::Video(path, info)) if info.has_audio => path.clone(),
        (None, Visual::Video(path, _)) | (None, Visual::Image(path)) => {
            return Err(AnimateError::MissingAudio(path.display().to_string()));
        }
    };
    let audio_from_video = matches!(&visual, Visual::Video(path, _) if *path == audio_path);

    let fps = match &visual {
        Visual::Video(_, info) => info.fps,
        Visual::Image(_) => request.fps,
    };
    if !(fps > 0.0) || !fps.is_finite() {
        return Err(AnimateError::InvalidParams(format!("fps must be positive, got {}", fps)));
    }

    log::info!("Loading audio from {}", audio_path.display());
    let signal = load_audio(&audio_path, &encoder.ffmpeg).map_err(AnimateError::AudioLoad)?;
    let (start, end) = resolve_time_range(
        request.start_time.seconds(),
        request.end_time.map(TimeArg::seconds),
        signal.duration(),
        1.0 / fps,
    )?;
    let duration = end - start;

    log::info!("Analyzing audio ({:.2}s to {:.2}s)", start, end);
    let analysis = analyze(
        &signal,
        &AnalysisParams {
            start_time: start,
            end_time: Some(end),
            fps,
            frame_smoothing: request.frame_smoothing,
        },
    )?;
    let audio_duration = signal.window_duration(start, end);
    drop(signal);

    let times = frame_times(duration, fps);
    let low = align(&analysis.low, &times)?;
    let high = align(&analysis.high, &times)?;
    log::debug!(
        "Aligned {} analysis frames onto {} video frames",
        analysis.low.len(),
        times.len()
    );

    let base: Box<dyn FrameSource> = match &visual {
        Visual::Image(path) => Box::new(StillImage::open(path)?),
        Visual::Video(path, info) => {
            let offset = if audio_from_video { start } else { 0.0 };
            Box::new(VideoClip::open(path, &encoder.ffmpeg, info.clone(), offset))
        }
    };
    let (width, height) = base.dimensions();

    let stages = default_chain(&config.effects)
        .into_iter()
        .map(|(effect, band)| {
            let signal = match band {
                SignalBand::Low => low.clone(),
                SignalBand::High => high.clone(),
            };
            EffectStage::new(effect, signal)
        })
        .collect();
    let source = compose(base, stages, LookupMode::Lenient);

    let visualizer = if request.visualizer {
        let style = BarStyle::from_config(&config.visualizer)?;
        Some(Visualizer::new(analysis.display, width, height, fps, style))
    } else {
        None
    };

    Ok(PreparedAnimation {
        source,
        visualizer,
        audio: AudioTrack {
            path: audio_path,
            start,
            duration: audio_duration,
        },
        duration,
        fps,
    })
}

/// Render an audio-reactive video to `request.output`.
///
/// The output file only appears once encoding has fully succeeded.
pub fn create_animation(request: &AnimationRequest, config: &AppConfig) -> Result<RenderOutput, AnimateError> {
    let mut prepared = prepare(request, config)?;
    let output = render(
        &mut prepared.source,
        prepared.visualizer.as_ref(),
        Some(&prepared.audio),
        prepared.duration,
        prepared.fps,
        &request.output,
        &config.encoder,
        request.show_progress,
    )?;
    log::info!("Wrote {} ({} frames)", output.path.display(), output.frames);
    Ok(output)
}
