//! The result of a finished generation.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};

use crate::time_point::TimePoint;

/// Why a requested time point has no frame in the GIF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SkipReason {
    /// The decoder failed; carries its message.
    Failed(String),
    /// The request was cancelled before it was decoded.
    Cancelled,
}

impl Display for SkipReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            SkipReason::Failed(reason) => write!(f, "failed: {reason}"),
            SkipReason::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A requested time point that did not make it into the GIF.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedFrame {
    /// Position of the time point in the request.
    pub index: usize,
    /// The requested time point.
    pub time_point: TimePoint,
    /// Why it was skipped.
    pub reason: SkipReason,
}

/// A finished GIF on disk.
#[derive(Debug, Clone)]
#[must_use]
pub struct GifOutput {
    /// Where the GIF was written.
    pub path: PathBuf,
    /// Number of time points requested.
    pub frames_requested: u32,
    /// Number of frames actually encoded.
    pub frames_written: u32,
    /// Time points with no frame, in request order.
    pub skipped: Vec<SkippedFrame>,
}

impl GifOutput {
    /// Returns `true` if some requested frames are missing.
    pub fn is_partial(&self) -> bool {
        self.frames_written < self.frames_requested
    }

    /// Path of the GIF.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Consume the output and return its path.
    pub fn into_path(self) -> PathBuf {
        self.path
    }
}
