//! # regift
//!
//! Turn videos into animated GIFs.
//!
//! `regift` samples a fixed number of evenly spaced frames from a video,
//! decodes them with FFmpeg via
//! [`ffmpeg-next`](https://crates.io/crates/ffmpeg-next) and encodes them
//! into a looping GIF with the [`gif`](https://crates.io/crates/gif) crate.
//!
//! ## Quick Start
//!
//! ```no_run
//! use regift::{GifOptions, Regift};
//!
//! let options = GifOptions::new(30).with_delay(0.05).with_max_size(480, 0);
//! let output = Regift::new().create_gif("input.mp4", &options).unwrap();
//! println!("GIF written to {}", output.path.display());
//! ```
//!
//! ## Pipeline
//!
//! 1. **Sampling**: the video duration is divided into `N` exact rational
//!    time points, `duration * i / N` ([`sample_time_points`]).
//! 2. **Extraction**: a [`FrameExtractor`] decodes the frame shown at each
//!    point on a background thread and delivers outcomes, in any order,
//!    through a [`FrameSink`].
//! 3. **Muxing**: the orchestrator reorders outcomes and appends them to a
//!    [`GifMuxer`] in time order, reporting progress as it goes.
//!
//! Frames that fail to decode are skipped and listed on the [`GifOutput`].
//! [`LastFramePolicy::Strict`] turns a failed final frame into an error
//! instead.
//!
//! ## Features
//!
//! - **`async`**: [`Regift::create_gif_async`] returns a [`GifFuture`] that
//!   runs on Tokio's blocking pool.
//! - **`rayon`**: `FfmpegFrameExtractor::parallel()` decodes time points on
//!   the rayon thread pool.
//! - **`full`**: both of the above.

#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod configuration;
mod conversion;
pub mod decode;
pub mod error;
pub mod extractor;
pub mod ffmpeg;
#[cfg(feature = "async")]
pub mod future;
pub mod muxer;
pub mod output;
#[cfg(feature = "rayon")]
mod parallel;
pub mod progress;
pub mod regift;
pub mod source;
pub mod time_point;

pub use configuration::{GifOptions, LastFramePolicy, MaxFrameSize, OutputTarget, Tolerance};
pub use decode::FfmpegFrameExtractor;
pub use error::RegiftError;
pub use extractor::{
    ExtractionSettings, FrameExtractor, FrameOutcome, FrameResult, FrameSink, FrameStatus,
};
pub use ffmpeg::{FfmpegLogLevel, get_ffmpeg_log_level, set_ffmpeg_log_level};
#[cfg(feature = "async")]
pub use future::GifFuture;
pub use muxer::GifMuxer;
pub use output::{GifOutput, SkipReason, SkippedFrame};
pub use progress::{CancellationToken, ProgressCallback, ProgressInfo};
pub use regift::{GenerationTask, Regift};
pub use source::{MediaSource, VideoMetadata};
pub use time_point::{DEFAULT_TIMESCALE, TimePoint, sample_time_points};
