pub mod align;
pub mod analyzer;
pub mod animate;
pub mod config;
pub mod effects;
pub mod media;
pub mod pipeline;
pub mod render;
pub mod session;
pub mod timecode;
pub mod visualizer;

/// Output containers ffmpeg can mux our H.264/AAC stream into
pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov", "mkv", "m4v", "avi"];

/// Application name for XDG paths
pub const APP_NAME: &str = "beatframe";

/// Whether `path` ends in a recognised video container extension.
pub fn has_video_extension(path: &std::path::Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| VIDEO_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}
