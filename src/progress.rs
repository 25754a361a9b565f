//! Progress reporting and cancellation support.
//!
//! This module provides [`ProgressCallback`] for observing frames as they are
//! appended to the GIF, [`ProgressInfo`] for the accompanying snapshot, and
//! [`CancellationToken`] for cooperative cancellation.
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use image::DynamicImage;
//! use regift::{GifOptions, ProgressCallback, ProgressInfo, Regift, RegiftError};
//!
//! struct PrintProgress;
//!
//! impl ProgressCallback for PrintProgress {
//!     fn on_progress(&self, _frame: &DynamicImage, info: &ProgressInfo) {
//!         println!("{:.0}% ({}/{})", info.fraction * 100.0, info.completed, info.requested);
//!     }
//! }
//!
//! let options = GifOptions::new(24).with_progress(Arc::new(PrintProgress));
//! let output = Regift::new().create_gif("input.mp4", &options)?;
//! # Ok::<(), RegiftError>(())
//! ```

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};
use std::time::{Duration, Instant};

use image::DynamicImage;

use crate::time_point::TimePoint;

/// A snapshot taken right after a frame was appended to the GIF.
#[derive(Debug, Clone)]
pub struct ProgressInfo {
    /// Frames appended so far.
    pub completed: u32,
    /// Frames requested in total.
    pub requested: u32,
    /// `completed / requested`, in `[0.0, 1.0]`.
    pub fraction: f64,
    /// The time point of the frame just appended.
    pub time_point: TimePoint,
    /// Wall-clock time since extraction started.
    pub elapsed: Duration,
}

/// Trait for receiving progress updates during GIF generation.
///
/// Implementations must be [`Send`] and [`Sync`] because the callback runs on
/// whichever thread drives the generation (the caller's thread, a background
/// thread, or a Tokio blocking thread).
///
/// Progress callbacks are **infallible** — they observe but cannot halt the
/// operation. Use [`CancellationToken`] for cooperative cancellation.
pub trait ProgressCallback: Send + Sync {
    /// Called once for every frame appended to the output, in time order.
    fn on_progress(&self, frame: &DynamicImage, info: &ProgressInfo);
}

impl<F> ProgressCallback for F
where
    F: Fn(&DynamicImage, &ProgressInfo) + Send + Sync,
{
    fn on_progress(&self, frame: &DynamicImage, info: &ProgressInfo) {
        self(frame, info)
    }
}

/// Discards all progress notifications. The default.
pub(crate) struct NoOpProgress;

impl ProgressCallback for NoOpProgress {
    fn on_progress(&self, _frame: &DynamicImage, _info: &ProgressInfo) {}
}

/// Cooperative cancellation token backed by an [`AtomicBool`].
///
/// Clone this token and share it between threads; call
/// [`cancel`](CancellationToken::cancel) from any thread to stop the
/// associated generation. Extractors report every time point they have not
/// decoded yet as cancelled, and the generation resolves to
/// [`RegiftError::Cancelled`](crate::RegiftError::Cancelled) without leaving
/// a file behind.
///
/// # Example
///
/// ```
/// use regift::CancellationToken;
///
/// let token = CancellationToken::new();
/// assert!(!token.is_cancelled());
///
/// token.cancel();
/// assert!(token.is_cancelled());
/// ```
#[derive(Debug, Clone)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
    parent: Option<Box<CancellationToken>>,
}

impl CancellationToken {
    /// Create a new, non-cancelled token.
    pub fn new() -> Self {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: None,
        }
    }

    /// A token that is cancelled whenever `self` is, and that can also be
    /// cancelled on its own without affecting `self`.
    ///
    /// ```
    /// use regift::CancellationToken;
    ///
    /// let parent = CancellationToken::new();
    /// let child = parent.child_token();
    ///
    /// child.cancel();
    /// assert!(!parent.is_cancelled());
    ///
    /// let other = parent.child_token();
    /// parent.cancel();
    /// assert!(other.is_cancelled());
    /// ```
    pub fn child_token(&self) -> CancellationToken {
        Self {
            cancelled: Arc::new(AtomicBool::new(false)),
            parent: Some(Box::new(self.clone())),
        }
    }

    /// Request cancellation. All clones and child tokens observe it.
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Release);
    }

    /// Check whether cancellation has been requested on this token or any
    /// token it descends from.
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || self
                .parent
                .as_ref()
                .is_some_and(|parent| parent.is_cancelled())
    }
}

impl Default for CancellationToken {
    fn default() -> Self {
        Self::new()
    }
}

/// Counts appended frames and emits callbacks.
pub(crate) struct ProgressTracker {
    callback: Arc<dyn ProgressCallback>,
    requested: u32,
    completed: u32,
    start_time: Instant,
}

impl ProgressTracker {
    pub(crate) fn new(callback: Arc<dyn ProgressCallback>, requested: u32) -> Self {
        Self {
            callback,
            requested,
            completed: 0,
            start_time: Instant::now(),
        }
    }

    /// Record one appended frame and report it.
    pub(crate) fn advance(&mut self, frame: &DynamicImage, time_point: TimePoint) {
        self.completed += 1;

        let fraction = if self.requested > 0 {
            (self.completed as f64 / self.requested as f64).min(1.0)
        } else {
            0.0
        };

        let info = ProgressInfo {
            completed: self.completed,
            requested: self.requested,
            fraction,
            time_point,
            elapsed: self.start_time.elapsed(),
        };

        self.callback.on_progress(frame, &info);
    }

    pub(crate) fn completed(&self) -> u32 {
        self.completed
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[test]
    fn tracker_reports_fraction_of_requested() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let callback = move |_: &DynamicImage, info: &ProgressInfo| {
            sink.lock().unwrap().push(info.fraction);
        };

        let mut tracker = ProgressTracker::new(Arc::new(callback), 4);
        let frame = DynamicImage::new_rgba8(1, 1);
        tracker.advance(&frame, TimePoint::ZERO);
        tracker.advance(&frame, TimePoint::new(1, 1));

        assert_eq!(*seen.lock().unwrap(), vec![0.25, 0.5]);
        assert_eq!(tracker.completed(), 2);
    }

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::default();
        let clone = token.clone();
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn child_cancellation_stays_local() {
        let parent = CancellationToken::new();
        let child = parent.child_token();
        let grandchild = child.child_token();

        grandchild.cancel();
        assert!(grandchild.is_cancelled());
        assert!(!child.is_cancelled());
        assert!(!parent.is_cancelled());

        parent.cancel();
        assert!(child.is_cancelled());
        assert!(child.clone().is_cancelled());
    }
}
