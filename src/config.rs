use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::Deserialize;

/// Application configuration loaded from TOML config file.
/// All fields have sensible defaults — the config file is optional.
#[derive(Debug, Deserialize, Default, Clone)]
#[serde(default)]
pub struct AppConfig {
    pub render: RenderConfig,
    pub encoder: EncoderConfig,
    pub effects: EffectsConfig,
    pub visualizer: VisualizerConfig,
}

/// Defaults for a render when the CLI doesn't say otherwise.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct RenderConfig {
    /// Output frame rate for still-image sources (videos keep their own).
    pub fps: f64,
    /// Analysis window length, in video frames.
    pub frame_smoothing: f64,
    /// Draw the spectrum bar overlay.
    pub visualizer: bool,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            fps: 30.0,
            frame_smoothing: 3.0,
            visualizer: true,
        }
    }
}

/// ffmpeg settings for decoding sources and encoding the output.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EncoderConfig {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    pub video_codec: String,
    pub audio_codec: String,
    pub preset: String,
    pub pixel_format: String,
    /// Encoder threads. 0 = auto-detect (all cores).
    pub threads: usize,
    /// Appended verbatim before the output path.
    pub extra_args: Vec<String>,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            video_codec: "libx264".to_string(),
            audio_codec: "aac".to_string(),
            preset: "medium".to_string(),
            pixel_format: "yuv420p".to_string(),
            threads: 0,
            extra_args: vec!["-bf".to_string(), "2".to_string()],
        }
    }
}

impl EncoderConfig {
    /// Resolve thread count: 0 → all available cores.
    pub fn resolve_threads(&self) -> usize {
        if self.threads > 0 {
            self.threads
        } else {
            std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1)
        }
    }
}

/// Strength of each effect at full signal.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct EffectsConfig {
    /// Red/blue channel offset in pixels.
    pub chromatic_max_shift: f32,
    /// Row displacement in pixels.
    pub wave_amplitude: f32,
    /// Rows per sine period.
    pub wave_wavelength: f32,
    /// Extra magnification (0.25 = 125%).
    pub zoom_max: f32,
}

impl Default for EffectsConfig {
    fn default() -> Self {
        Self {
            chromatic_max_shift: 12.0,
            wave_amplitude: 12.0,
            wave_wavelength: 90.0,
            zoom_max: 0.25,
        }
    }
}

/// Appearance of the spectrum bar overlay.
#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct VisualizerConfig {
    /// Bar colour as `#rrggbb`.
    pub color: String,
    /// Fraction of the frame height a full-scale bar occupies.
    pub height_fraction: f32,
    /// Fraction of each bar's slot that is filled.
    pub bar_width_fraction: f32,
}

impl Default for VisualizerConfig {
    fn default() -> Self {
        Self {
            color: "#ab20fd".to_string(),
            height_fraction: 0.2,
            bar_width_fraction: 0.8,
        }
    }
}

impl AppConfig {
    /// Load config from `~/.config/beatframe/config.toml`.
    /// Returns default config if file doesn't exist.
    /// Logs a warning if the file exists but can't be parsed.
    pub fn load() -> Self {
        match Self::config_path() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => {
                log::debug!("No config file found, using defaults");
                Self::default()
            }
        }
    }

    /// Load a specific config file, falling back to defaults on any error.
    pub fn load_from(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => match toml::from_str::<AppConfig>(&contents) {
                Ok(config) => {
                    log::info!("Loaded config from {}", path.display());
                    config
                }
                Err(e) => {
                    log::warn!(
                        "Failed to parse {}: {}. Using defaults.",
                        path.display(),
                        e
                    );
                    Self::default()
                }
            },
            Err(e) => {
                log::warn!(
                    "Failed to read {}: {}. Using defaults.",
                    path.display(),
                    e
                );
                Self::default()
            }
        }
    }

    /// Get the config file path.
    fn config_path() -> Option<PathBuf> {
        ProjectDirs::from("", "", crate::APP_NAME)
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Default location of the session file (last used paths).
pub fn default_session_path() -> PathBuf {
    if let Some(dirs) = ProjectDirs::from("", "", crate::APP_NAME) {
        let data_dir = dirs.data_dir();
        std::fs::create_dir_all(data_dir).ok();
        data_dir.join("session.json")
    } else {
        PathBuf::from("beatframe-session.json")
    }
}
