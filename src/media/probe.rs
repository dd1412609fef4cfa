//! Container metadata via `ffprobe -print_format json`.

use std::path::Path;
use std::process::Command;

use serde::Deserialize;

use super::SourceError;

#[derive(Debug, Deserialize)]
struct ProbeOutput {
    #[serde(default)]
    streams: Vec<ProbeStream>,
    format: Option<ProbeFormat>,
}

#[derive(Debug, Deserialize)]
struct ProbeStream {
    codec_type: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    duration: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ProbeFormat {
    duration: Option<String>,
}

/// What we need to know about a video file.
#[derive(Debug, Clone, PartialEq)]
pub struct MediaInfo {
    pub width: u32,
    pub height: u32,
    pub fps: f64,
    pub duration: f64,
    pub has_audio: bool,
}

/// Parse an ffprobe rational like `30000/1001` (or a plain number).
pub fn parse_rate(rate: &str) -> Option<f64> {
    let value = match rate.split_once('/') {
        Some((num, den)) => {
            let num: f64 = num.trim().parse().ok()?;
            let den: f64 = den.trim().parse().ok()?;
            if den == 0.0 {
                return None;
            }
            num / den
        }
        None => rate.trim().parse().ok()?,
    };
    (value.is_finite() && value > 0.0).then_some(value)
}

/// Interpret ffprobe JSON. `Ok(None)` means the file has no video stream.
pub fn parse_probe_json(json: &str) -> Result<Option<MediaInfo>, SourceError> {
    let probe: ProbeOutput = serde_json::from_str(json)?;
    let has_audio = probe
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));

    let Some(video) = probe
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
    else {
        return Ok(None);
    };

    let (Some(width), Some(height)) = (video.width, video.height) else {
        return Err(SourceError::Ffprobe("video stream without dimensions".to_string()));
    };

    // avg_frame_rate is the real cadence; r_frame_rate can be a field rate
    let fps = video
        .avg_frame_rate
        .as_deref()
        .and_then(parse_rate)
        .or_else(|| video.r_frame_rate.as_deref().and_then(parse_rate))
        .ok_or_else(|| SourceError::Ffprobe("unknown frame rate".to_string()))?;

    let duration = video
        .duration
        .as_deref()
        .and_then(|d| d.parse::<f64>().ok())
        .or_else(|| {
            probe
                .format
                .as_ref()
                .and_then(|f| f.duration.as_deref())
                .and_then(|d| d.parse::<f64>().ok())
        })
        .unwrap_or(0.0);

    Ok(Some(MediaInfo {
        width,
        height,
        fps,
        duration,
        has_audio,
    }))
}

/// Run ffprobe on `path`. `Ok(None)` if ffprobe can't read it as media with video.
pub fn probe(path: &Path, ffprobe: &Path) -> Result<Option<MediaInfo>, SourceError> {
    let output = Command::new(ffprobe)
        .args(["-v", "error", "-print_format", "json", "-show_streams", "-show_format"])
        .arg(path)
        .output()
        .map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                SourceError::FfmpegNotFound(ffprobe.display().to_string())
            } else {
                SourceError::Io(e)
            }
        })?;

    if !output.status.success() {
        log::debug!(
            "ffprobe rejected {}: {}",
            path.display(),
            String::from_utf8_lossy(&output.stderr).trim()
        );
        return Ok(None);
    }

    parse_probe_json(&String::from_utf8_lossy(&output.stdout))
}
