use anyhow::{Context, Result};
use beatframe::animate::{create_animation, AnimationRequest};
use beatframe::analyzer::{analyze_file, AnalysisParams};
use beatframe::config::AppConfig;
use beatframe::session::{Session, KEY_AUDIO, KEY_INPUT, KEY_OUTPUT};
use beatframe::timecode::TimeArg;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "beatframe", version, about = "Audio-reactive video renderer")]
struct Cli {
    /// Config file (defaults to the platform config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Render a video from an image or video plus audio
    Render {
        /// Image or video to animate (defaults to the last one used)
        input: Option<PathBuf>,

        /// Audio track (defaults to the input video's own audio)
        #[arg(short, long)]
        audio: Option<PathBuf>,

        /// Output video (".mp4" is appended if the extension isn't a video container)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Start time, seconds or M:SS
        #[arg(long, default_value = "0")]
        start: TimeArg,

        /// End time, seconds or M:SS (default: end of audio)
        #[arg(long)]
        end: Option<TimeArg>,

        /// Output frame rate for still images
        #[arg(long)]
        fps: Option<f64>,

        /// Analysis window length in frames
        #[arg(long)]
        smoothing: Option<f64>,

        /// Skip the spectrum bar overlay
        #[arg(long)]
        no_visualizer: bool,

        /// Open the result when done
        #[arg(long)]
        open: bool,
    },

    /// Print the low/high activation series for an audio file
    Analyze {
        /// Audio file
        audio: PathBuf,

        /// Start time, seconds or M:SS
        #[arg(long, default_value = "0")]
        start: TimeArg,

        /// End time, seconds or M:SS (default: end of audio)
        #[arg(long)]
        end: Option<TimeArg>,

        /// Frame rate the series is sampled at
        #[arg(long)]
        fps: Option<f64>,

        /// Analysis window length in frames
        #[arg(long)]
        smoothing: Option<f64>,

        /// Emit JSON instead of CSV
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let log_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Load config file (optional, defaults if missing)
    let config = match &cli.config {
        Some(path) => AppConfig::load_from(path),
        None => AppConfig::load(),
    };

    match cli.command {
        Commands::Render {
            input,
            audio,
            output,
            start,
            end,
            fps,
            smoothing,
            no_visualizer,
            open,
        } => {
            let session_path = beatframe::config::default_session_path();
            let mut session = Session::load(&session_path);

            // Omitted paths come from the last run; a remembered audio track
            // only applies when the input is also the remembered one
            let (input, audio) = match input {
                Some(input) => (input, audio),
                None => {
                    let input = session.get_path(KEY_INPUT).context(
                        "No input given and no previous input remembered. Pass an image or video.",
                    )?;
                    (input, audio.or_else(|| session.get_path(KEY_AUDIO)))
                }
            };
            let output = output
                .or_else(|| session.get_path(KEY_OUTPUT))
                .unwrap_or_else(|| default_output(&input));
            let output = ensure_video_extension(output);

            let request = AnimationRequest {
                img: Some(input.clone()),
                audio: audio.clone(),
                video: None,
                output: output.clone(),
                start_time: start,
                end_time: end,
                fps: fps.unwrap_or(config.render.fps),
                frame_smoothing: smoothing.unwrap_or(config.render.frame_smoothing),
                visualizer: config.render.visualizer && !no_visualizer,
                show_progress: true,
            };

            let result = create_animation(&request, &config)
                .with_context(|| format!("Failed to render {}", output.display()))?;
            println!(
                "Rendered {} ({} frames, {}{})",
                result.path.display(),
                result.frames,
                start,
                end.map(|e| format!(" to {}", e)).unwrap_or_default()
            );

            session.set_path(KEY_INPUT, &input);
            match &audio {
                Some(audio) => session.set_path(KEY_AUDIO, audio),
                None => session.remove(KEY_AUDIO),
            }
            session.set_path(KEY_OUTPUT, &output);
            if let Err(e) = session.save() {
                log::warn!("Could not save session: {}", e);
            }

            if open {
                open_file(&result.path)
                    .with_context(|| format!("Failed to open {}", result.path.display()))?;
            }
        }

        Commands::Analyze {
            audio,
            start,
            end,
            fps,
            smoothing,
            json,
        } => {
            let params = AnalysisParams {
                start_time: start.seconds(),
                end_time: end.map(TimeArg::seconds),
                fps: fps.unwrap_or(config.render.fps),
                frame_smoothing: smoothing.unwrap_or(config.render.frame_smoothing),
            };
            let analysis = analyze_file(&audio, &config.encoder.ffmpeg, &params)
                .with_context(|| format!("Failed to analyze {}", audio.display()))?;

            if json {
                let out = serde_json::json!({
                    "start_time": analysis.start_time,
                    "end_time": analysis.end_time,
                    "sample_rate": analysis.sample_rate,
                    "hop_length": analysis.frame.hop_length,
                    "n_fft": analysis.frame.n_fft,
                    "low": analysis.low,
                    "high": analysis.high,
                });
                println!("{}", serde_json::to_string_pretty(&out)?);
            } else {
                println!("time,low,high");
                for ((t, low), high) in analysis
                    .low
                    .times
                    .iter()
                    .zip(&analysis.low.values)
                    .zip(&analysis.high.values)
                {
                    println!("{:.4},{:.4},{:.4}", t, low, high);
                }
            }
        }
    }

    Ok(())
}

/// `<input stem>_beatframe.mp4` in the current directory.
fn default_output(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_string());
    PathBuf::from(format!("{}_beatframe.mp4", stem))
}

fn ensure_video_extension(path: PathBuf) -> PathBuf {
    if beatframe::has_video_extension(&path) {
        return path;
    }
    let mut name = path.into_os_string();
    name.push(".mp4");
    PathBuf::from(name)
}

/// Hand the finished file to the desktop's default player.
fn open_file(path: &Path) -> Result<()> {
    let mut command = if cfg!(target_os = "windows") {
        let mut c = std::process::Command::new("cmd");
        c.args(["/C", "start", ""]);
        c
    } else if cfg!(target_os = "macos") {
        std::process::Command::new("open")
    } else {
        std::process::Command::new("xdg-open")
    };
    command.arg(path);
    log::debug!("Opening {} with {:?}", path.display(), command);
    command.spawn().context("Failed to launch the system opener")?;
    Ok(())
}
