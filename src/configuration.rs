//! GIF generation options.
//!
//! [`GifOptions`] is a builder that carries everything a single generation
//! request needs besides the source: frame count, timing, output size limits,
//! decode tolerance, output location, progress callback and cancellation.
//!
//! # Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use regift::{CancellationToken, GifOptions, LastFramePolicy};
//!
//! let token = CancellationToken::new();
//! let options = GifOptions::new(30)
//!     .with_delay(0.05)
//!     .with_loop_count(0)
//!     .with_max_size(480, 0)
//!     .with_last_frame_policy(LastFramePolicy::Strict)
//!     .with_timeout(Duration::from_secs(60))
//!     .with_cancellation(token.clone());
//! ```

use std::fmt::{Debug, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use uuid::Uuid;

use crate::error::RegiftError;
use crate::progress::{CancellationToken, NoOpProgress, ProgressCallback};
use crate::time_point::{DEFAULT_TIMESCALE, TimePoint};

/// Default per-frame delay in seconds.
pub const DEFAULT_DELAY: f32 = 0.1;

/// Default slack on either side of a requested time point: 10 ms.
pub const DEFAULT_TOLERANCE_SECONDS: f64 = 0.01;

/// Default time to wait for the next decoded frame before giving up.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// Default NeuQuant speed passed to the GIF quantizer (1 = best, 30 = fastest).
pub const DEFAULT_QUANTIZER_SPEED: i32 = 10;

/// Upper bound on output frame size. A zero component leaves that axis
/// unbounded; `0 x 0` means no limit at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MaxFrameSize {
    /// Maximum width in pixels, or 0 for no limit.
    pub width: u32,
    /// Maximum height in pixels, or 0 for no limit.
    pub height: u32,
}

impl MaxFrameSize {
    /// No size limit.
    pub const UNBOUNDED: MaxFrameSize = MaxFrameSize {
        width: 0,
        height: 0,
    };

    /// Create a bound of `width x height`.
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Returns `true` if neither axis is bounded.
    pub fn is_unbounded(&self) -> bool {
        self.width == 0 && self.height == 0
    }

    /// Fit `(width, height)` inside this bound, preserving aspect ratio.
    ///
    /// Frames are only ever scaled down; a source that already fits is
    /// returned unchanged. Both results are at least 1 pixel.
    pub fn fit(&self, width: u32, height: u32) -> (u32, u32) {
        if width == 0 || height == 0 {
            return (width, height);
        }

        let scale_x = if self.width > 0 {
            self.width as f64 / width as f64
        } else {
            f64::INFINITY
        };
        let scale_y = if self.height > 0 {
            self.height as f64 / height as f64
        } else {
            f64::INFINITY
        };
        let scale = scale_x.min(scale_y);

        if scale >= 1.0 {
            return (width, height);
        }

        let fitted_width = ((width as f64 * scale).round() as u32).max(1);
        let fitted_height = ((height as f64 * scale).round() as u32).max(1);
        (fitted_width, fitted_height)
    }
}

/// How much a decoder may deviate from a requested time point to land on a
/// cheaply decodable frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tolerance {
    /// Allowed slack before the requested time.
    pub before: TimePoint,
    /// Allowed slack after the requested time.
    pub after: TimePoint,
}

impl Tolerance {
    /// Require exact frames.
    pub const EXACT: Tolerance = Tolerance {
        before: TimePoint::ZERO,
        after: TimePoint::ZERO,
    };

    /// Symmetric tolerance of `slack` on both sides.
    pub fn symmetric(slack: Duration) -> Self {
        let slack = TimePoint::from_duration(slack);
        Self {
            before: slack,
            after: slack,
        }
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        let slack = TimePoint::from_seconds(DEFAULT_TOLERANCE_SECONDS, DEFAULT_TIMESCALE);
        Self {
            before: slack,
            after: slack,
        }
    }
}

/// What to do when the frame for the final time point cannot be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LastFramePolicy {
    /// Finish the GIF with whatever frames decoded and report the skipped
    /// time points on the output. This is the default.
    #[default]
    Lenient,
    /// Fail the whole generation with
    /// [`RegiftError::LastFrameFailed`](crate::RegiftError::LastFrameFailed),
    /// even if every earlier frame succeeded. No file is kept.
    Strict,
}

/// Where the finished GIF is written.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputTarget {
    /// A uniquely named file in the system temporary directory.
    #[default]
    TempDir,
    /// A uniquely named file inside the given directory.
    Directory(PathBuf),
    /// Exactly this path.
    File(PathBuf),
}

impl OutputTarget {
    /// Resolve to a concrete path. Directory targets get a fresh
    /// `regift-<uuid>.gif` name on every call, so concurrent requests never
    /// collide.
    pub fn resolve(&self) -> PathBuf {
        match self {
            OutputTarget::TempDir => unique_gif_path(&std::env::temp_dir()),
            OutputTarget::Directory(directory) => unique_gif_path(directory),
            OutputTarget::File(path) => path.clone(),
        }
    }
}

fn unique_gif_path(directory: &Path) -> PathBuf {
    directory.join(format!("regift-{}.gif", Uuid::new_v4()))
}

/// Options for one GIF generation request.
///
/// All fields except the frame count have defaults: 0.1 s per frame, loop
/// forever, no size limit, 10 ms decode tolerance, lenient last-frame policy,
/// a five-minute timeout and a unique file in the temp directory.
#[derive(Clone)]
#[must_use]
pub struct GifOptions {
    pub(crate) frame_count: u32,
    pub(crate) delay: f32,
    pub(crate) loop_count: u16,
    pub(crate) max_size: MaxFrameSize,
    pub(crate) tolerance: Tolerance,
    pub(crate) quantizer_speed: i32,
    pub(crate) last_frame_policy: LastFramePolicy,
    pub(crate) timeout: Duration,
    pub(crate) output: OutputTarget,
    pub(crate) progress: Arc<dyn ProgressCallback>,
    pub(crate) cancellation: Option<CancellationToken>,
}

impl Debug for GifOptions {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("GifOptions")
            .field("frame_count", &self.frame_count)
            .field("delay", &self.delay)
            .field("loop_count", &self.loop_count)
            .field("max_size", &self.max_size)
            .field("tolerance", &self.tolerance)
            .field("quantizer_speed", &self.quantizer_speed)
            .field("last_frame_policy", &self.last_frame_policy)
            .field("timeout", &self.timeout)
            .field("output", &self.output)
            .field("has_cancellation", &self.cancellation.is_some())
            .finish()
    }
}

impl GifOptions {
    /// Create options that sample `frame_count` evenly spaced frames.
    pub fn new(frame_count: u32) -> Self {
        Self {
            frame_count,
            delay: DEFAULT_DELAY,
            loop_count: 0,
            max_size: MaxFrameSize::UNBOUNDED,
            tolerance: Tolerance::default(),
            quantizer_speed: DEFAULT_QUANTIZER_SPEED,
            last_frame_policy: LastFramePolicy::default(),
            timeout: DEFAULT_TIMEOUT,
            output: OutputTarget::default(),
            progress: Arc::new(NoOpProgress),
            cancellation: None,
        }
    }

    /// Set the display time of every frame, in seconds.
    pub fn with_delay(mut self, seconds: f32) -> Self {
        self.delay = seconds;
        self
    }

    /// Set how many times the animation repeats. `0` loops forever.
    pub fn with_loop_count(mut self, loop_count: u16) -> Self {
        self.loop_count = loop_count;
        self
    }

    /// Bound the output frame size. Pass 0 for an axis to leave it unbounded.
    pub fn with_max_size(mut self, width: u32, height: u32) -> Self {
        self.max_size = MaxFrameSize::new(width, height);
        self
    }

    /// Set the decode tolerance window.
    pub fn with_tolerance(mut self, tolerance: Tolerance) -> Self {
        self.tolerance = tolerance;
        self
    }

    /// Set the quantizer speed, clamped to `1..=30`.
    pub fn with_quantizer_speed(mut self, speed: i32) -> Self {
        self.quantizer_speed = speed.clamp(1, 30);
        self
    }

    /// Choose how a failed final frame is handled.
    pub fn with_last_frame_policy(mut self, policy: LastFramePolicy) -> Self {
        self.last_frame_policy = policy;
        self
    }

    /// Set how long to wait for the next decoded frame. Clamped to at least
    /// one millisecond.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout.max(Duration::from_millis(1));
        self
    }

    /// Write the GIF to exactly this path.
    pub fn with_output_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.output = OutputTarget::File(path.into());
        self
    }

    /// Write a uniquely named GIF into this directory.
    pub fn with_output_dir<P: Into<PathBuf>>(mut self, directory: P) -> Self {
        self.output = OutputTarget::Directory(directory.into());
        self
    }

    /// Attach a progress callback.
    pub fn with_progress(mut self, callback: Arc<dyn ProgressCallback>) -> Self {
        self.progress = callback;
        self
    }

    /// Attach a cancellation token.
    ///
    /// Cancelling `token` stops the generation. The generation itself never
    /// cancels it: a timeout only cancels a child token private to the
    /// request, so `token` can be shared with unrelated work.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = Some(token);
        self
    }

    /// Number of frames to sample.
    pub fn frame_count(&self) -> u32 {
        self.frame_count
    }

    /// Per-frame delay in seconds.
    pub fn delay(&self) -> f32 {
        self.delay
    }

    /// Loop count (0 = forever).
    pub fn loop_count(&self) -> u16 {
        self.loop_count
    }

    /// Output size bound.
    pub fn max_size(&self) -> MaxFrameSize {
        self.max_size
    }

    /// Decode tolerance window.
    pub fn tolerance(&self) -> Tolerance {
        self.tolerance
    }

    /// Last-frame policy.
    pub fn last_frame_policy(&self) -> LastFramePolicy {
        self.last_frame_policy
    }

    /// Timeout between decoded frames.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Output target.
    pub fn output(&self) -> &OutputTarget {
        &self.output
    }

    /// Reject option combinations that can never produce a GIF.
    pub(crate) fn validate(&self) -> Result<(), RegiftError> {
        if self.frame_count == 0 {
            return Err(RegiftError::InvalidFrameCount(self.frame_count));
        }
        self.validate_delay()
    }

    pub(crate) fn validate_delay(&self) -> Result<(), RegiftError> {
        if !self.delay.is_finite() || self.delay < 0.0 {
            return Err(RegiftError::InvalidDelay(self.delay));
        }
        Ok(())
    }
}
