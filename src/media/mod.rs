//! Visual sources: still images and decoded video clips, both exposed as
//! a [`FrameSource`] that maps a timestamp to an RGB frame.

pub mod probe;
pub mod video;

use std::path::{Path, PathBuf};

use image::{ImageReader, RgbImage};

pub use probe::MediaInfo;
pub use video::VideoClip;

#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("{0} not found on PATH")]
    FfmpegNotFound(String),
    #[error("ffprobe error: {0}")]
    Ffprobe(String),
    #[error("ffprobe output: {0}")]
    Json(#[from] serde_json::Error),
    #[error("ffmpeg video decode error: {0}")]
    Ffmpeg(String),
    #[error("{0} is neither an image nor a video")]
    UnsupportedMediaType(PathBuf),
    #[error("Video {0} produced no frames")]
    EmptyClip(PathBuf),
    #[error(transparent)]
    Pipeline(#[from] crate::pipeline::PipelineError),
}

/// Anything that can produce a frame for a point in time.
///
/// Every frame a source returns has the same dimensions. Takes `&mut self`
/// so that decoders can keep their read position between calls.
pub trait FrameSource {
    fn dimensions(&self) -> (u32, u32);

    fn frame_at(&mut self, t: f64) -> Result<RgbImage, SourceError>;
}

impl<S: FrameSource + ?Sized> FrameSource for Box<S> {
    fn dimensions(&self) -> (u32, u32) {
        (**self).dimensions()
    }

    fn frame_at(&mut self, t: f64) -> Result<RgbImage, SourceError> {
        (**self).frame_at(t)
    }
}

/// A single image held for the whole render.
#[derive(Debug, Clone)]
pub struct StillImage {
    image: RgbImage,
}

impl StillImage {
    pub fn new(image: RgbImage) -> Self {
        Self { image }
    }

    pub fn open(path: &Path) -> Result<Self, SourceError> {
        let image = ImageReader::open(path)?.with_guessed_format()?.decode()?;
        log::debug!(
            "Loaded still image {} ({}x{})",
            path.display(),
            image.width(),
            image.height()
        );
        Ok(Self::new(image.to_rgb8()))
    }
}

impl FrameSource for StillImage {
    fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }

    fn frame_at(&mut self, _t: f64) -> Result<RgbImage, SourceError> {
        Ok(self.image.clone())
    }
}

/// What a visual input path turned out to contain.
#[derive(Debug, Clone, PartialEq)]
pub enum MediaKind {
    Image,
    Video(MediaInfo),
}

/// Decide whether `path` is an image or a video by looking at its content.
///
/// Image decoders get the first look (magic bytes, then extension), then
/// ffprobe is asked for a video stream.
pub fn detect_media(path: &Path, ffprobe: &Path) -> Result<MediaKind, SourceError> {
    if looks_like_image(path)? {
        return Ok(MediaKind::Image);
    }
    match probe::probe(path, ffprobe)? {
        Some(info) => Ok(MediaKind::Video(info)),
        None => Err(SourceError::UnsupportedMediaType(path.to_path_buf())),
    }
}

fn looks_like_image(path: &Path) -> Result<bool, SourceError> {
    let reader = ImageReader::open(path)?.with_guessed_format()?;
    Ok(reader.format().is_some())
}
