use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use colored::Colorize;
use image::DynamicImage;
use indicatif::{ProgressBar, ProgressStyle};
use regift::{
    FfmpegFrameExtractor, FfmpegLogLevel, GifOptions, GifOutput, LastFramePolicy, MediaSource,
    ProgressCallback, ProgressInfo, Regift, SkipReason, TimePoint, sample_time_points,
};
use serde_json::json;

const CLI_AFTER_HELP: &str = "Examples:\n  regift convert input.mp4 --frames 24 --delay 0.08 --out clip.gif\n  regift convert input.mp4 --frames 40 --max-width 480 --out-dir gifs --progress\n  regift sample input.mp4 --frames 10\n  regift probe input.mp4 --json\n  regift completions zsh > _regift";

#[derive(Debug, Parser)]
#[command(
    name = "regift",
    version,
    about = "Turn videos into animated GIFs",
    after_help = CLI_AFTER_HELP
)]
struct Cli {
    #[command(flatten)]
    global: GlobalOptions,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Parser, Clone, Default)]
struct GlobalOptions {
    /// Show debug logging from regift.
    #[arg(long)]
    verbose: bool,

    /// Show a progress bar while frames are encoded.
    #[arg(long)]
    progress: bool,

    /// Allow overwriting an existing output file.
    #[arg(long)]
    overwrite: bool,

    /// FFmpeg log level (quiet, panic, fatal, error, warning, info, verbose, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Convert a video into an animated GIF.
    #[command(
        about = "Convert a video into a GIF",
        visible_alias = "gif",
        after_help = "Examples:\n  regift convert input.mp4 --frames 24 --out clip.gif\n  regift convert input.mp4 --frames 30 --loop-count 1 --strict --json"
    )]
    Convert {
        /// Input video path or URL.
        input: String,
        /// Number of evenly spaced frames to sample.
        #[arg(long, default_value_t = 20)]
        frames: u32,
        /// Display time of each frame in seconds.
        #[arg(long, default_value_t = 0.1)]
        delay: f32,
        /// Number of times the animation repeats (0 = forever).
        #[arg(long, default_value_t = 0)]
        loop_count: u16,
        /// Maximum output width in pixels.
        #[arg(long)]
        max_width: Option<u32>,
        /// Maximum output height in pixels.
        #[arg(long)]
        max_height: Option<u32>,
        /// Output GIF path.
        #[arg(long, conflicts_with = "out_dir")]
        out: Option<PathBuf>,
        /// Directory to write a uniquely named GIF into.
        #[arg(long)]
        out_dir: Option<PathBuf>,
        /// Fail if the last frame cannot be decoded.
        #[arg(long)]
        strict: bool,
        /// Give up if no frame decodes within this time (seconds or [hh:]mm:ss).
        #[arg(long)]
        timeout: Option<String>,
        /// Quantizer speed, 1 (best) to 30 (fastest).
        #[arg(long)]
        speed: Option<i32>,
        /// Decode time points on all cores (requires the `rayon` feature).
        #[arg(long)]
        parallel: bool,
        /// Print the result as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print the time points a conversion would sample.
    #[command(
        about = "Show sampled time points",
        after_help = "Examples:\n  regift sample input.mp4 --frames 10\n  regift sample --duration 00:01:30 --frames 4"
    )]
    Sample {
        /// Input video path or URL. Not needed with --duration.
        #[arg(required_unless_present = "duration")]
        input: Option<String>,
        /// Number of frames.
        #[arg(long, default_value_t = 20)]
        frames: u32,
        /// Use this duration (seconds or [hh:]mm:ss) instead of probing.
        #[arg(long)]
        duration: Option<String>,
    },

    /// Print video metadata.
    #[command(
        about = "Print video metadata",
        visible_alias = "info",
        after_help = "Examples:\n  regift probe input.mp4\n  regift probe input.mp4 --json"
    )]
    Probe {
        /// Input video path or URL.
        input: String,

        /// Output metadata as machine-readable JSON.
        #[arg(long)]
        json: bool,
    },

    /// Generate shell completion scripts.
    #[command(about = "Generate shell completions")]
    Completions {
        #[arg(value_enum)]
        shell: Shell,
    },
}

fn parse_timecode(value: &str) -> Result<Duration, Box<dyn std::error::Error>> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err("time value cannot be empty".into());
    }

    if let Ok(seconds) = trimmed.parse::<f64>() {
        if !seconds.is_finite() {
            return Err(format!("invalid time value: {trimmed}").into());
        }
        return Ok(Duration::from_secs_f64(seconds.max(0.0)));
    }

    let parts: Vec<&str> = trimmed.split(':').collect();
    let (hours, minutes, seconds) = match parts.as_slice() {
        [minutes, seconds] => (0_u64, minutes.parse::<u64>()?, seconds.parse::<f64>()?),
        [hours, minutes, seconds] => (
            hours.parse::<u64>()?,
            minutes.parse::<u64>()?,
            seconds.parse::<f64>()?,
        ),
        _ => return Err(format!("invalid time format: {trimmed}").into()),
    };

    let total_seconds = (hours as f64 * 3600.0) + (minutes as f64 * 60.0) + seconds;
    Ok(Duration::from_secs_f64(total_seconds.max(0.0)))
}

fn ensure_writable_path(path: &Path, overwrite: bool) -> Result<(), Box<dyn std::error::Error>> {
    if path.exists() {
        if overwrite {
            eprintln!(
                "{} {}",
                "warning:".yellow().bold(),
                format!("overwriting {}", path.display()).yellow()
            );
        } else {
            return Err(format!(
                "output already exists: {} (use --overwrite to replace)",
                path.display()
            )
            .into());
        }
    }
    Ok(())
}

fn apply_global_options(global: &GlobalOptions) -> Result<(), Box<dyn std::error::Error>> {
    let default_filter = if global.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .format_timestamp(None)
        .init();

    if let Some(level) = &global.log_level {
        let parsed: FfmpegLogLevel = level
            .parse()
            .map_err(|_| format!("unsupported --log-level: {level}"))?;
        regift::set_ffmpeg_log_level(parsed);
    }

    Ok(())
}

/// Drives an indicatif bar from frame progress.
struct TerminalProgress {
    bar: ProgressBar,
}

impl TerminalProgress {
    fn new(frames: u32) -> Self {
        let bar = ProgressBar::new(u64::from(frames));
        if let Ok(style) =
            ProgressStyle::with_template("{spinner} [{bar:40.cyan/blue}] {pos}/{len} frames {msg}")
        {
            bar.set_style(style.progress_chars("=> "));
        }
        Self { bar }
    }
}

impl ProgressCallback for TerminalProgress {
    fn on_progress(&self, _frame: &DynamicImage, info: &ProgressInfo) {
        self.bar.set_position(u64::from(info.completed));
        self.bar.set_message(format!("@ {}", info.time_point));
    }
}

fn print_output(output: &GifOutput, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        let skipped: Vec<_> = output
            .skipped
            .iter()
            .map(|frame| {
                json!({
                    "index": frame.index,
                    "time_seconds": frame.time_point.as_secs_f64(),
                    "reason": frame.reason.to_string(),
                })
            })
            .collect();
        let payload = json!({
            "path": output.path.display().to_string(),
            "frames_requested": output.frames_requested,
            "frames_written": output.frames_written,
            "skipped": skipped,
        });
        println!("{}", serde_json::to_string_pretty(&payload)?);
        return Ok(());
    }

    println!(
        "{} {} ({}/{} frames)",
        "created".green().bold(),
        output.path.display(),
        output.frames_written,
        output.frames_requested,
    );
    for frame in &output.skipped {
        let line = format!(
            "skipped frame {} at {}: {}",
            frame.index, frame.time_point, frame.reason
        );
        match frame.reason {
            SkipReason::Cancelled => eprintln!("{}", line.dimmed()),
            SkipReason::Failed(_) => eprintln!("{} {}", "warning:".yellow().bold(), line.yellow()),
        }
    }
    Ok(())
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    apply_global_options(&cli.global)?;

    match cli.command {
        Commands::Convert {
            input,
            frames,
            delay,
            loop_count,
            max_width,
            max_height,
            out,
            out_dir,
            strict,
            timeout,
            speed,
            parallel,
            json,
        } => {
            let mut options = GifOptions::new(frames)
                .with_delay(delay)
                .with_loop_count(loop_count)
                .with_max_size(max_width.unwrap_or(0), max_height.unwrap_or(0));

            if strict {
                options = options.with_last_frame_policy(LastFramePolicy::Strict);
            }
            if let Some(timeout) = timeout {
                options = options.with_timeout(parse_timecode(&timeout)?);
            }
            if let Some(speed) = speed {
                options = options.with_quantizer_speed(speed);
            }
            if let Some(out) = out {
                ensure_writable_path(&out, cli.global.overwrite)?;
                options = options.with_output_path(out);
            } else if let Some(out_dir) = out_dir {
                std::fs::create_dir_all(&out_dir)?;
                options = options.with_output_dir(out_dir);
            }

            let progress = cli
                .global
                .progress
                .then(|| Arc::new(TerminalProgress::new(frames)));
            if let Some(progress) = &progress {
                options = options.with_progress(Arc::clone(progress) as Arc<dyn ProgressCallback>);
            }

            #[cfg(feature = "rayon")]
            let extractor = if parallel {
                FfmpegFrameExtractor::parallel()
            } else {
                FfmpegFrameExtractor::new()
            };
            #[cfg(not(feature = "rayon"))]
            let extractor = {
                if parallel {
                    eprintln!(
                        "{} {}",
                        "warning:".yellow().bold(),
                        "--parallel requires building with the `rayon` feature".yellow()
                    );
                }
                FfmpegFrameExtractor::new()
            };

            let result = Regift::with_extractor(extractor).create_gif(&input, &options);
            if let Some(progress) = &progress {
                progress.bar.finish_and_clear();
            }
            print_output(&result?, json)?;
        }
        Commands::Sample {
            input,
            frames,
            duration,
        } => {
            let duration = match (duration, input) {
                (Some(duration), _) => TimePoint::from_duration(parse_timecode(&duration)?),
                (None, Some(input)) => MediaSource::probe(&input)?.duration,
                (None, None) => return Err("either an input or --duration is required".into()),
            };
            for (index, point) in sample_time_points(duration, frames)?.iter().enumerate() {
                println!("{index:>4}  {point}  ({}/{})", point.value(), point.timescale());
            }
        }
        Commands::Probe { input, json } => {
            let metadata = MediaSource::probe(&input)?;
            let (display_width, display_height) = metadata.display_size();
            if json {
                let payload = json!({
                    "format": metadata.format,
                    "codec": metadata.codec,
                    "duration_seconds": metadata.duration.as_secs_f64(),
                    "start_seconds": metadata.start_time.as_secs_f64(),
                    "width": metadata.width,
                    "height": metadata.height,
                    "display_width": display_width,
                    "display_height": display_height,
                    "rotation": metadata.rotation_degrees,
                    "fps": metadata.frames_per_second,
                    "stream_index": metadata.stream_index,
                });
                println!("{}", serde_json::to_string_pretty(&payload)?);
            } else {
                println!("Format: {}", metadata.format);
                println!("Duration: {}", metadata.duration);
                if metadata.start_time != TimePoint::ZERO {
                    println!("Starts at: {}", metadata.start_time);
                }
                println!(
                    "Video: {}x{} @ {:.2} fps [{}]",
                    metadata.width, metadata.height, metadata.frames_per_second, metadata.codec,
                );
                if metadata.rotation_degrees != 0 {
                    println!(
                        "Rotation: {} degrees (displayed as {}x{})",
                        metadata.rotation_degrees, display_width, display_height,
                    );
                }
            }
        }
        Commands::Completions { shell } => {
            let mut command = Cli::command();
            clap_complete::generate(shell, &mut command, "regift", &mut std::io::stdout());
        }
    }

    Ok(())
}

fn main() {
    if let Err(error) = run() {
        eprintln!("{} {error}", "error:".red().bold());
        std::process::exit(1);
    }
}
