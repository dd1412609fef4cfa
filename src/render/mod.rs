//! Final stage: pull frames, composite the overlay, stream to the encoder.

pub mod composite;
pub mod encoder;

use std::path::{Path, PathBuf};

use indicatif::{ProgressBar, ProgressStyle};
use thiserror::Error;

use crate::align::frame_times;
use crate::config::EncoderConfig;
use crate::media::{FrameSource, SourceError};
use crate::visualizer::Visualizer;

pub use composite::composite_over;
pub use encoder::{AudioTrack, EncodeError, EncodeJob, FfmpegEncoder};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Frame source error: {0}")]
    Source(#[from] SourceError),
    #[error("Encode error: {0}")]
    Encode(#[from] EncodeError),
    #[error(
        "Audio ({audio:.3}s) and video ({video:.3}s) durations differ by more than {tolerance:.3}s"
    )]
    AudioSync { audio: f64, video: f64, tolerance: f64 },
    #[error("Invalid render parameter: {0}")]
    InvalidParams(String),
}

/// Summary of a finished render.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub path: PathBuf,
    pub frames: u64,
}

fn progress_bar(len: u64) -> ProgressBar {
    let pb = ProgressBar::new(len);
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} ({eta}) {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );
    pb
}

/// Largest allowed gap between the audio and video durations.
pub fn sync_tolerance(fps: f64) -> f64 {
    1.0 / fps + 0.05
}

fn check_audio_sync(audio: &AudioTrack, duration: f64, fps: f64) -> Result<(), RenderError> {
    let tolerance = sync_tolerance(fps);
    if (audio.duration - duration).abs() > tolerance {
        return Err(RenderError::AudioSync {
            audio: audio.duration,
            video: duration,
            tolerance,
        });
    }
    Ok(())
}

/// Encode `duration` seconds of `source` at `fps` into `output`.
///
/// Frame `i` is taken at `t = i / fps`; when a visualizer is given its frame
/// for the same `t` is composited on top. The audio window is muxed as-is and
/// must match the encoded length (`frames / fps`) within [`sync_tolerance`].
#[allow(clippy::too_many_arguments)]
pub fn render(
    source: &mut dyn FrameSource,
    visualizer: Option<&Visualizer>,
    audio: Option<&AudioTrack>,
    duration: f64,
    fps: f64,
    output: &Path,
    encoder: &EncoderConfig,
    show_progress: bool,
) -> Result<RenderOutput, RenderError> {
    if !(fps > 0.0) || !fps.is_finite() {
        return Err(RenderError::InvalidParams(format!("fps must be positive, got {}", fps)));
    }
    if !(duration > 0.0) || !duration.is_finite() {
        return Err(RenderError::InvalidParams(format!(
            "duration must be positive, got {}",
            duration
        )));
    }
    let times = frame_times(duration, fps);
    if let Some(audio) = audio {
        // against what is actually encoded, not the requested duration
        check_audio_sync(audio, times.len() as f64 / fps, fps)?;
    }

    let (width, height) = source.dimensions();
    if width == 0 || height == 0 {
        return Err(RenderError::InvalidParams(format!(
            "frame source has empty dimensions {}x{}",
            width, height
        )));
    }
    log::info!(
        "Rendering video: {} frames at {}x{}, {:.3} fps -> {}",
        times.len(),
        width,
        height,
        fps,
        output.display()
    );

    let job = EncodeJob {
        width,
        height,
        fps,
        duration,
        audio: audio.cloned(),
    };
    let mut encoder = FfmpegEncoder::spawn(encoder, &job, output)?;

    let pb = if show_progress {
        progress_bar(times.len() as u64)
    } else {
        ProgressBar::hidden()
    };

    for &t in &times {
        let frame = match source.frame_at(t) {
            Ok(mut frame) => {
                if let Some(overlay) = visualizer.and_then(|v| v.overlay_at(t)) {
                    composite_over(&mut frame, &overlay);
                }
                frame
            }
            Err(e) => {
                pb.abandon();
                encoder.cancel();
                return Err(e.into());
            }
        };
        if let Err(e) = encoder.write_frame(&frame) {
            pb.abandon();
            encoder.cancel();
            return Err(e.into());
        }
        pb.inc(1);
    }

    let frames = encoder.frames_written();
    pb.set_message("finalizing");
    let path = encoder.finish()?;
    pb.finish_with_message(format!("Done: {} frames", frames));

    Ok(RenderOutput { path, frames })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects::test_support::pattern;
    use crate::media::{MediaInfo, StillImage, VideoClip};
    use image::RgbImage;

    /// Stand-in ffmpeg: writes the number of bytes it read on stdin to its
    /// last argument (the output path).
    #[cfg(unix)]
    fn counting_encoder(dir: &Path) -> EncoderConfig {
        fake_ffmpeg(
            dir,
            "encoder",
            "for last; do :; done\nwc -c | tr -d ' ' > \"$last\"",
        )
    }

    #[cfg(unix)]
    fn fake_ffmpeg(dir: &Path, name: &str, body: &str) -> EncoderConfig {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        EncoderConfig {
            ffmpeg: path,
            ..EncoderConfig::default()
        }
    }

    #[cfg(unix)]
    fn leftover_temps(dir: &Path) -> Vec<String> {
        std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .filter(|name| name.starts_with(".beatframe-"))
            .collect()
    }

    fn track(duration: f64) -> AudioTrack {
        AudioTrack {
            path: PathBuf::from("a.wav"),
            start: 0.0,
            duration,
        }
    }

    #[test]
    fn test_sync_tolerance() {
        assert!((sync_tolerance(30.0) - (1.0 / 30.0 + 0.05)).abs() < 1e-12);
        assert!(check_audio_sync(&track(5.0), 5.0, 30.0).is_ok());
        assert!(check_audio_sync(&track(5.08), 5.0, 30.0).is_ok());
        assert!(matches!(
            check_audio_sync(&track(5.2), 5.0, 30.0),
            Err(RenderError::AudioSync { .. })
        ));
    }

    #[test]
    fn test_audio_mismatch_rejected_before_encoding() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut source = StillImage::new(RgbImage::new(8, 8));
        let err = render(
            &mut source,
            None,
            Some(&track(9.0)),
            5.0,
            30.0,
            &output,
            &EncoderConfig::default(),
            false,
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::AudioSync { .. }));
        assert!(!output.exists());
    }

    #[test]
    fn test_invalid_params() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut source = StillImage::new(RgbImage::new(8, 8));
        let config = EncoderConfig::default();
        assert!(matches!(
            render(&mut source, None, None, 0.0, 30.0, &output, &config, false),
            Err(RenderError::InvalidParams(_))
        ));
        assert!(matches!(
            render(&mut source, None, None, 1.0, 0.0, &output, &config, false),
            Err(RenderError::InvalidParams(_))
        ));
    }

    #[test]
    fn test_missing_encoder_is_encode_error() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut source = StillImage::new(RgbImage::new(8, 8));
        let config = EncoderConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..EncoderConfig::default()
        };
        let err = render(&mut source, None, None, 1.0, 30.0, &output, &config, false).unwrap_err();
        assert!(matches!(err, RenderError::Encode(EncodeError::FfmpegNotFound(_))));
        assert!(!output.exists());
    }

    #[test]
    fn test_sync_checked_against_encoded_length() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let mut source = StillImage::new(RgbImage::new(8, 8));
        // 1.09s at 10 fps encodes 11 frames (1.1s): 0.945s of audio is within
        // tolerance of 1.09 but not of what gets written
        let config = EncoderConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..EncoderConfig::default()
        };
        let err = render(&mut source, None, Some(&track(1.1)), 1.09, 10.0, &output, &config, false)
            .unwrap_err();
        assert!(matches!(err, RenderError::Encode(EncodeError::FfmpegNotFound(_))));
        let err = render(&mut source, None, Some(&track(0.945)), 1.09, 10.0, &output, &config, false)
            .unwrap_err();
        assert!(matches!(err, RenderError::AudioSync { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_still_image_streams_every_frame() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let config = counting_encoder(dir.path());
        let mut source = StillImage::new(pattern(48, 32));

        let result = render(
            &mut source,
            None,
            Some(&track(10.0)),
            10.0,
            30.0,
            &output,
            &config,
            false,
        )
        .unwrap();

        assert_eq!(result.frames, 300);
        assert_eq!(result.path, output);
        assert_eq!(std::fs::read_to_string(&output).unwrap().trim(), "1382400");
        assert!(leftover_temps(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_short_video_padded_to_full_duration() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let config = counting_encoder(dir.path());
        // decoder emits three 4x4 frames then exits
        let decoder = fake_ffmpeg(dir.path(), "decoder", "head -c 144 /dev/zero");
        let info = MediaInfo {
            width: 4,
            height: 4,
            fps: 30.0,
            duration: 0.1,
            has_audio: false,
        };
        let mut source = VideoClip::open(Path::new("clip.mp4"), &decoder.ffmpeg, info, 0.0);

        let result = render(&mut source, None, None, 10.0, 30.0, &output, &config, false).unwrap();

        assert_eq!(result.frames, 300);
        assert_eq!(std::fs::read_to_string(&output).unwrap().trim(), (300 * 48).to_string());
        assert!(leftover_temps(dir.path()).is_empty());
    }

    #[cfg(unix)]
    #[test]
    fn test_encoder_failure_after_streaming_leaves_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("out.mp4");
        let config = fake_ffmpeg(
            dir.path(),
            "encoder",
            "cat > /dev/null\necho 'muxing failed' >&2\nexit 1",
        );
        let mut source = StillImage::new(RgbImage::new(8, 8));

        let err = render(&mut source, None, None, 1.0, 30.0, &output, &config, false).unwrap_err();
        match err {
            RenderError::Encode(EncodeError::Ffmpeg(msg)) => {
                assert!(msg.contains("muxing failed"), "{}", msg)
            }
            other => panic!("expected ffmpeg error, got {}", other),
        }
        assert!(!output.exists());
        assert!(leftover_temps(dir.path()).is_empty());
    }
}
