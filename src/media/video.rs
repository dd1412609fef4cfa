//! Streaming video decode through an ffmpeg child emitting raw `rgb24` frames.

use std::ffi::OsString;
use std::io::{BufReader, ErrorKind, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdout, Command, Stdio};
use std::thread::JoinHandle;

use image::RgbImage;

use super::{FrameSource, MediaInfo, SourceError};

struct Decoder {
    child: Child,
    stdout: BufReader<ChildStdout>,
    /// Drained on its own thread; ffmpeg must never stall on a full stderr pipe.
    stderr: Option<JoinHandle<String>>,
}

impl Decoder {
    fn stop(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }

    fn collect_stderr(&mut self) -> String {
        self.stderr
            .take()
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
            .trim()
            .to_string()
    }
}

/// A video file read sequentially at its own frame rate.
///
/// Time `t` is measured from `offset` seconds into the file. Reads only go
/// forward; asking for an earlier frame restarts ffmpeg with a seek. Past the
/// last decoded frame the clip holds that frame.
pub struct VideoClip {
    path: PathBuf,
    ffmpeg: PathBuf,
    info: MediaInfo,
    offset: f64,
    decoder: Option<Decoder>,
    /// Index of the frame the decoder will emit next.
    next_index: u64,
    current: Option<(u64, RgbImage)>,
    exhausted: bool,
}

impl VideoClip {
    pub fn open(path: &Path, ffmpeg: &Path, info: MediaInfo, offset: f64) -> Self {
        log::debug!(
            "Video {}: {}x{} @ {:.3} fps, {:.2}s (reading from {:.2}s)",
            path.display(),
            info.width,
            info.height,
            info.fps,
            info.duration,
            offset
        );
        Self {
            path: path.to_path_buf(),
            ffmpeg: ffmpeg.to_path_buf(),
            info,
            offset: offset.max(0.0),
            decoder: None,
            next_index: 0,
            current: None,
            exhausted: false,
        }
    }

    pub fn info(&self) -> &MediaInfo {
        &self.info
    }

    fn frame_bytes(&self) -> usize {
        self.info.width as usize * self.info.height as usize * 3
    }

    fn restart(&mut self, index: u64) -> Result<(), SourceError> {
        if let Some(decoder) = self.decoder.take() {
            decoder.stop();
        }
        let seek = self.offset + index as f64 / self.info.fps;
        log::debug!("Starting video decode of {} at {:.3}s", self.path.display(), seek);

        let mut child = Command::new(&self.ffmpeg)
            .args(decoder_args(&self.path, seek, self.info.fps))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| {
                if e.kind() == ErrorKind::NotFound {
                    SourceError::FfmpegNotFound(self.ffmpeg.display().to_string())
                } else {
                    SourceError::Io(e)
                }
            })?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SourceError::Ffmpeg("failed to capture ffmpeg stdout".to_string()))?;
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        self.decoder = Some(Decoder {
            child,
            stdout: BufReader::new(stdout),
            stderr,
        });
        self.next_index = index;
        self.current = None;
        self.exhausted = false;
        Ok(())
    }

    /// Pull the next frame off the pipe; `None` once ffmpeg is done.
    fn advance(&mut self) -> Result<Option<RgbImage>, SourceError> {
        let (width, height) = (self.info.width, self.info.height);
        let frame_bytes = self.frame_bytes();
        let Some(decoder) = self.decoder.as_mut() else {
            return Ok(None);
        };
        if let Some(frame) = read_frame(&mut decoder.stdout, width, height, frame_bytes)? {
            return Ok(Some(frame));
        }

        let Some(mut decoder) = self.decoder.take() else {
            return Ok(None);
        };
        let status = decoder.child.wait()?;
        let stderr = decoder.collect_stderr();
        if !status.success() && self.current.is_none() {
            return Err(SourceError::Ffmpeg(format!("{} ({})", stderr, status)));
        }
        if !stderr.is_empty() {
            log::debug!("ffmpeg decode of {}: {}", self.path.display(), stderr);
        }
        Ok(None)
    }
}

impl FrameSource for VideoClip {
    fn dimensions(&self) -> (u32, u32) {
        (self.info.width, self.info.height)
    }

    fn frame_at(&mut self, t: f64) -> Result<RgbImage, SourceError> {
        let index = frame_index(t, self.info.fps);

        if let Some((current, frame)) = &self.current {
            if *current == index {
                return Ok(frame.clone());
            }
        }
        let behind = matches!(&self.current, Some((current, _)) if *current > index);
        let idle = self.current.is_none() && self.decoder.is_none() && !self.exhausted;
        if behind || idle {
            self.restart(index)?;
        }

        while !self.exhausted && self.next_index <= index {
            match self.advance()? {
                Some(frame) => {
                    self.current = Some((self.next_index, frame));
                    self.next_index += 1;
                }
                None => {
                    log::debug!(
                        "Video {} ended after frame {}; holding last frame",
                        self.path.display(),
                        self.next_index.saturating_sub(1)
                    );
                    self.exhausted = true;
                }
            }
        }

        self.current
            .as_ref()
            .map(|(_, frame)| frame.clone())
            .ok_or_else(|| SourceError::EmptyClip(self.path.clone()))
    }
}

impl Drop for VideoClip {
    fn drop(&mut self) {
        if let Some(decoder) = self.decoder.take() {
            decoder.stop();
        }
    }
}

/// Frame number for time `t` at `fps`, rounded to the nearest frame.
pub fn frame_index(t: f64, fps: f64) -> u64 {
    (t.max(0.0) * fps).round() as u64
}

fn decoder_args(path: &Path, seek: f64, fps: f64) -> Vec<OsString> {
    let mut args: Vec<OsString> = vec!["-hide_banner".into(), "-loglevel".into(), "error".into()];
    if seek > 0.0 {
        args.push("-ss".into());
        args.push(format!("{:.6}", seek).into());
    }
    args.push("-i".into());
    args.push(path.as_os_str().to_os_string());
    for arg in ["-an", "-sn", "-f", "rawvideo", "-pix_fmt", "rgb24", "-r"] {
        args.push(arg.into());
    }
    args.push(format!("{}", fps).into());
    args.push("-".into());
    args
}

/// Read one packed rgb24 frame. A short read at end of stream is treated as
/// the end (the partial frame is dropped).
fn read_frame<R: Read>(
    reader: &mut R,
    width: u32,
    height: u32,
    frame_bytes: usize,
) -> Result<Option<RgbImage>, SourceError> {
    let mut buf = vec![0u8; frame_bytes];
    match reader.read_exact(&mut buf) {
        Ok(()) => Ok(RgbImage::from_raw(width, height, buf)),
        Err(e) if e.kind() == ErrorKind::UnexpectedEof => Ok(None),
        Err(e) => Err(SourceError::Io(e)),
    }
}
