use std::path::Path;
use std::process::Command;

use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DecodeError {
    #[error("Symphonia decode error: {0}")]
    Symphonia(String),
    #[error("No audio track found in {0}")]
    NoAudioTrack(String),
    #[error("ffmpeg not found — required to extract audio from {0}")]
    FfmpegNotFound(String),
    #[error("ffmpeg decode error: {0}")]
    Ffmpeg(String),
    #[error("WAV error: {0}")]
    Wav(#[from] hound::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Mono audio at its native sample rate.
#[derive(Debug, Clone, PartialEq)]
pub struct AudioSignal {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

impl AudioSignal {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }

    fn window(&self, start: f64, end: f64) -> std::ops::Range<usize> {
        let sr = self.sample_rate as f64;
        let len = self.samples.len();
        let from = ((start.max(0.0) * sr).round() as usize).min(len);
        let to = ((end.max(0.0) * sr).round() as usize).clamp(from, len);
        from..to
    }

    /// Samples in `[start, end)` seconds. Bounds are clamped to the signal.
    pub fn trim(&self, start: f64, end: f64) -> AudioSignal {
        AudioSignal::new(self.samples[self.window(start, end)].to_vec(), self.sample_rate)
    }

    /// Seconds of audio actually present in `[start, end)`.
    pub fn window_duration(&self, start: f64, end: f64) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.window(start, end).len() as f64 / self.sample_rate as f64
    }
}

/// Load an audio file (or the audio track of a video) as mono.
///
/// Symphonia handles the common audio formats and MP4/MKV containers;
/// anything it can't open is extracted through an ffmpeg subprocess.
pub fn load_audio(path: &Path, ffmpeg: &Path) -> Result<AudioSignal, DecodeError> {
    match load_with_symphonia(path) {
        Ok(signal) => Ok(signal),
        Err(DecodeError::Io(e)) => Err(DecodeError::Io(e)),
        Err(e) => {
            log::debug!(
                "Symphonia could not decode {} ({}), trying ffmpeg",
                path.display(),
                e
            );
            load_via_ffmpeg(path, ffmpeg)
        }
    }
}

fn load_with_symphonia(path: &Path) -> Result<AudioSignal, DecodeError> {
    let file = std::fs::File::open(path)?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());

    let mut hint = Hint::new();
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let probed = symphonia::default::get_probe()
        .format(
            &hint,
            mss,
            &FormatOptions::default(),
            &MetadataOptions::default(),
        )
        .map_err(|e| DecodeError::Symphonia(e.to_string()))?;
    let mut format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeError::NoAudioTrack(path.display().to_string()))?;
    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| DecodeError::Symphonia("unknown sample rate".to_string()))?;

    let mut decoder = symphonia::default::get_codecs()
        .make(&codec_params, &DecoderOptions::default())
        .map_err(|e| DecodeError::Symphonia(e.to_string()))?;

    let mut mono: Vec<f32> = Vec::new();
    let mut skipped = 0usize;

    loop {
        let packet = match format.next_packet() {
            Ok(p) => p,
            Err(SymphoniaError::IoError(ref e))
                if e.kind() == std::io::ErrorKind::UnexpectedEof =>
            {
                break;
            }
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(DecodeError::Symphonia(e.to_string())),
        };

        if packet.track_id() != track_id {
            continue;
        }

        let decoded = match decoder.decode(&packet) {
            Ok(d) => d,
            Err(SymphoniaError::DecodeError(_)) => {
                skipped += 1;
                continue;
            }
            Err(e) => return Err(DecodeError::Symphonia(e.to_string())),
        };

        let spec = *decoded.spec();
        let channels = spec.channels.count().max(1);
        let mut sample_buf = SampleBuffer::<f32>::new(decoded.capacity() as u64, spec);
        sample_buf.copy_interleaved_ref(decoded);
        downmix_into(sample_buf.samples(), channels, &mut mono);
    }

    if skipped > 0 {
        log::warn!("Skipped {} undecodable packets in {}", skipped, path.display());
    }

    Ok(AudioSignal::new(mono, sample_rate))
}

/// Extract the audio stream with ffmpeg into a temporary 16-bit WAV and read it back.
fn load_via_ffmpeg(path: &Path, ffmpeg: &Path) -> Result<AudioSignal, DecodeError> {
    if Command::new(ffmpeg).arg("-version").output().is_err() {
        return Err(DecodeError::FfmpegNotFound(path.display().to_string()));
    }

    let tmp_wav = tempfile::Builder::new()
        .prefix("beatframe_audio_")
        .suffix(".wav")
        .tempfile()?;

    let output = Command::new(ffmpeg)
        .arg("-hide_banner")
        .args(["-loglevel", "error", "-i"])
        .arg(path)
        .args(["-vn", "-f", "wav", "-acodec", "pcm_s16le", "-y"])
        .arg(tmp_wav.path())
        .output()?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(DecodeError::Ffmpeg(stderr.trim().to_string()));
    }

    read_wav(tmp_wav.path())
}

/// Read a WAV file as mono f32.
pub fn read_wav(path: &Path) -> Result<AudioSignal, DecodeError> {
    let mut reader = hound::WavReader::open(path)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let interleaved: Vec<f32> = match spec.sample_format {
        hound::SampleFormat::Float => reader.samples::<f32>().collect::<Result<_, _>>()?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1i64 << (spec.bits_per_sample.max(1) - 1)) as f32;
            reader
                .samples::<i32>()
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<Result<_, _>>()?
        }
    };

    let mut mono = Vec::with_capacity(interleaved.len() / channels);
    downmix_into(&interleaved, channels, &mut mono);
    Ok(AudioSignal::new(mono, spec.sample_rate))
}

fn downmix_into(interleaved: &[f32], channels: usize, out: &mut Vec<f32>) {
    if channels == 1 {
        out.extend_from_slice(interleaved);
        return;
    }
    let inv = 1.0 / channels as f32;
    out.extend(
        interleaved
            .chunks_exact(channels)
            .map(|frame| frame.iter().sum::<f32>() * inv),
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_downmix_stereo() {
        let mut out = Vec::new();
        downmix_into(&[1.0, 0.0, 0.5, 0.5, -1.0, 1.0], 2, &mut out);
        assert_eq!(out, vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn test_trim_bounds() {
        let signal = AudioSignal::new((0..100).map(|i| i as f32).collect(), 10);
        assert!((signal.duration() - 10.0).abs() < 1e-12);

        let t = signal.trim(2.0, 5.0);
        assert_eq!(t.samples.len(), 30);
        assert_eq!(t.samples[0], 20.0);

        // End past the signal clamps, start past the end yields nothing
        assert_eq!(signal.trim(8.0, 50.0).samples.len(), 20);
        assert!(signal.trim(20.0, 30.0).samples.is_empty());
    }

    #[test]
    fn test_window_duration_counts_present_samples() {
        let signal = AudioSignal::new(vec![0.0; 100], 10);
        assert!((signal.window_duration(2.0, 5.0) - 3.0).abs() < 1e-12);
        assert!((signal.window_duration(8.0, 50.0) - 2.0).abs() < 1e-12);
        assert_eq!(signal.window_duration(20.0, 30.0), 0.0);
        assert_eq!(AudioSignal::new(vec![], 0).window_duration(0.0, 1.0), 0.0);
    }

    #[test]
    fn test_read_wav_int_stereo() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tone.wav");
        let spec = hound::WavSpec {
            channels: 2,
            sample_rate: 8000,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..800 {
            writer.write_sample(16384i16).unwrap();
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let signal = read_wav(&path).unwrap();
        assert_eq!(signal.sample_rate, 8000);
        assert_eq!(signal.samples.len(), 800);
        assert!((signal.samples[0] - 0.25).abs() < 1e-4);
    }

    #[test]
    fn test_load_audio_wav_through_symphonia() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silence.wav");
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: 22050,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(&path, spec).unwrap();
        for _ in 0..22050 {
            writer.write_sample(0i16).unwrap();
        }
        writer.finalize().unwrap();

        let signal = load_audio(&path, Path::new("ffmpeg")).unwrap();
        assert_eq!(signal.sample_rate, 22050);
        assert_eq!(signal.samples.len(), 22050);
        assert!(signal.samples.iter().all(|&s| s == 0.0));
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_audio(Path::new("/nonexistent/beatframe.wav"), Path::new("ffmpeg"))
            .unwrap_err();
        assert!(matches!(err, DecodeError::Io(_)));
    }
}
