//! ffmpeg sidecar encoder: raw rgb24 frames in on stdin, muxed file out.
//!
//! Output goes to a temporary file beside the destination and is renamed into
//! place only after ffmpeg exits cleanly, so a failed render never leaves a
//! truncated video at the output path.

use std::ffi::OsString;
use std::io::{ErrorKind, Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;
use tempfile::TempPath;
use thiserror::Error;

use crate::config::EncoderConfig;

#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("{0} not found on PATH: install ffmpeg to encode video")]
    FfmpegNotFound(String),
    #[error("ffmpeg encode failed: {0}")]
    Ffmpeg(String),
    #[error("Frame size mismatch: encoder expects {expected:?}, got {got:?}")]
    FrameSize { expected: (u32, u32), got: (u32, u32) },
    #[error("Could not move finished video into place: {0}")]
    Persist(#[from] tempfile::PathPersistError),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Audio to mux in: a window of an existing media file.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioTrack {
    pub path: PathBuf,
    pub start: f64,
    pub duration: f64,
}

/// Geometry and timing of the stream being encoded.
#[derive(Debug, Clone)]
pub struct EncodeJob {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub audio: Option<AudioTrack>,
}

fn os_args<const N: usize>(args: [&str; N]) -> impl Iterator<Item = OsString> {
    args.into_iter().map(OsString::from)
}

/// Full ffmpeg argument list for `job`, writing to `target`.
pub fn ffmpeg_args(config: &EncoderConfig, job: &EncodeJob, target: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = Vec::new();
    args.extend(os_args(["-hide_banner", "-loglevel", "error", "-nostats", "-y"]));
    args.extend(os_args(["-f", "rawvideo", "-pix_fmt", "rgb24"]));
    args.extend(os_args([
        "-s:v",
        &format!("{}x{}", job.width, job.height),
        "-r",
        &format!("{}", job.fps),
        "-i",
        "-",
    ]));

    if let Some(audio) = &job.audio {
        args.extend(os_args([
            "-ss",
            &format!("{:.6}", audio.start),
            "-t",
            &format!("{:.6}", audio.duration),
            "-i",
        ]));
        args.push(audio.path.as_os_str().to_os_string());
        args.extend(os_args(["-map", "0:v:0", "-map", "1:a:0"]));
    } else {
        args.extend(os_args(["-map", "0:v:0"]));
    }

    // yuv420p needs even dimensions
    args.extend(os_args(["-vf", "pad=ceil(iw/2)*2:ceil(ih/2)*2"]));
    args.extend(os_args([
        "-c:v",
        &config.video_codec,
        "-preset",
        &config.preset,
        "-pix_fmt",
        &config.pixel_format,
    ]));
    if job.audio.is_some() {
        args.extend(os_args(["-c:a", &config.audio_codec]));
    }
    args.extend(os_args(["-threads", &config.resolve_threads().to_string()]));
    args.extend(config.extra_args.iter().map(OsString::from));
    args.extend(os_args(["-t", &format!("{:.6}", job.duration)]));

    args.push(target.as_os_str().to_os_string());
    args
}

/// Temporary path next to `output`, keeping its extension so ffmpeg picks the
/// same container.
fn temp_output(output: &Path) -> Result<TempPath, EncodeError> {
    let dir = match output.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    let suffix = output
        .extension()
        .map(|ext| format!(".{}", ext.to_string_lossy()))
        .unwrap_or_default();
    let file = tempfile::Builder::new()
        .prefix(".beatframe-")
        .suffix(&suffix)
        .tempfile_in(dir)?;
    Ok(file.into_temp_path())
}

pub struct FfmpegEncoder {
    child: Child,
    stdin: ChildStdin,
    stderr: Option<JoinHandle<String>>,
    temp: TempPath,
    output: PathBuf,
    dimensions: (u32, u32),
    frames_written: u64,
}

impl FfmpegEncoder {
    pub fn spawn(config: &EncoderConfig, job: &EncodeJob, output: &Path) -> Result<Self, EncodeError> {
        let temp = temp_output(output)?;
        let args = ffmpeg_args(config, job, &temp);
        log::debug!(
            "{} {}",
            config.ffmpeg.display(),
            args.iter()
                .map(|a| a.to_string_lossy())
                .collect::<Vec<_>>()
                .join(" ")
        );

        let mut child = Command::new(&config.ffmpeg)
            .args(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    EncodeError::FfmpegNotFound(config.ffmpeg.display().to_string())
                } else {
                    EncodeError::Io(e)
                }
            })?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| EncodeError::Ffmpeg("failed to capture ffmpeg stdin".to_string()))?;
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        Ok(Self {
            child,
            stdin,
            stderr,
            temp,
            output: output.to_path_buf(),
            dimensions: (job.width, job.height),
            frames_written: 0,
        })
    }

    pub fn write_frame(&mut self, frame: &RgbImage) -> Result<(), EncodeError> {
        if frame.dimensions() != self.dimensions {
            return Err(EncodeError::FrameSize {
                expected: self.dimensions,
                got: frame.dimensions(),
            });
        }
        match self.stdin.write_all(frame.as_raw()) {
            Ok(()) => {
                self.frames_written += 1;
                Ok(())
            }
            // ffmpeg died; its stderr says why
            Err(e) if e.kind() == ErrorKind::BrokenPipe => Err(self.abort()),
            Err(e) => Err(EncodeError::Io(e)),
        }
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
            .trim()
            .to_string()
    }

    fn abort(&mut self) -> EncodeError {
        let status = self.child.wait();
        let stderr = self.collect_stderr();
        match status {
            Ok(status) => EncodeError::Ffmpeg(format!("{} ({})", stderr, status)),
            Err(e) => EncodeError::Io(e),
        }
    }

    /// Stop ffmpeg and discard the partial output.
    pub fn cancel(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
        let _ = self.collect_stderr();
        log::debug!("Encode to {} cancelled after {} frames", self.output.display(), self.frames_written);
    }

    /// Close the stream, wait for ffmpeg and move the result to the output path.
    pub fn finish(mut self) -> Result<PathBuf, EncodeError> {
        self.stdin.flush()?;
        let Self {
            mut child,
            stdin,
            stderr,
            temp,
            output,
            ..
        } = self;
        drop(stdin);

        let status = child.wait()?;
        let stderr = stderr
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default();
        if !status.success() {
            return Err(EncodeError::Ffmpeg(format!("{} ({})", stderr.trim(), status)));
        }
        if !stderr.trim().is_empty() {
            log::warn!("ffmpeg: {}", stderr.trim());
        }

        temp.persist(&output)?;
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(args: &[OsString]) -> Vec<String> {
        args.iter().map(|a| a.to_string_lossy().into_owned()).collect()
    }

    fn has_pair(args: &[String], flag: &str, value: &str) -> bool {
        args.windows(2).any(|w| w[0] == flag && w[1] == value)
    }

    fn job(audio: Option<AudioTrack>) -> EncodeJob {
        EncodeJob {
            width: 641,
            height: 360,
            fps: 30.0,
            duration: 5.0,
            audio,
        }
    }

    #[test]
    fn test_video_only_args() {
        let args = strings(&ffmpeg_args(&EncoderConfig::default(), &job(None), Path::new("out.mp4")));
        assert!(has_pair(&args, "-s:v", "641x360"));
        assert!(has_pair(&args, "-pix_fmt", "rgb24"));
        assert!(has_pair(&args, "-c:v", "libx264"));
        assert!(has_pair(&args, "-pix_fmt", "yuv420p"));
        assert!(has_pair(&args, "-bf", "2"));
        assert!(has_pair(&args, "-t", "5.000000"));
        assert!(!args.iter().any(|a| a == "-c:a"));
        assert!(!args.iter().any(|a| a == "1:a:0"));
        assert_eq!(args.last().map(String::as_str), Some("out.mp4"));
    }

    #[test]
    fn test_audio_window_args() {
        let audio = AudioTrack {
            path: PathBuf::from("song.flac"),
            start: 12.5,
            duration: 5.0,
        };
        let args = strings(&ffmpeg_args(&EncoderConfig::default(), &job(Some(audio)), Path::new("out.mp4")));
        let ss = args.iter().position(|a| a == "-ss").unwrap();
        assert_eq!(args[ss + 1], "12.500000");
        assert_eq!(args[ss + 2], "-t");
        assert_eq!(args[ss + 4], "-i");
        assert_eq!(args[ss + 5], "song.flac");
        assert!(has_pair(&args, "-map", "1:a:0"));
        assert!(has_pair(&args, "-c:a", "aac"));
    }

    #[test]
    fn test_config_threads_and_codec() {
        let config = EncoderConfig {
            video_codec: "libx265".to_string(),
            threads: 3,
            extra_args: vec![],
            ..EncoderConfig::default()
        };
        let args = strings(&ffmpeg_args(&config, &job(None), Path::new("out.mkv")));
        assert!(has_pair(&args, "-c:v", "libx265"));
        assert!(has_pair(&args, "-threads", "3"));
        assert!(!args.iter().any(|a| a == "-bf"));
    }

    #[test]
    fn test_temp_output_beside_target() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("final.mov");
        let temp = temp_output(&target).unwrap();
        assert_eq!(temp.parent(), Some(dir.path()));
        assert_eq!(temp.extension().and_then(|e| e.to_str()), Some("mov"));
        let path = temp.to_path_buf();
        drop(temp);
        assert!(!path.exists());
    }

    #[test]
    fn test_missing_ffmpeg_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.mp4");
        let config = EncoderConfig {
            ffmpeg: PathBuf::from("/nonexistent/ffmpeg-binary"),
            ..EncoderConfig::default()
        };
        let err = FfmpegEncoder::spawn(&config, &job(None), &target).err().unwrap();
        assert!(matches!(err, EncodeError::FfmpegNotFound(_)));
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }
}
