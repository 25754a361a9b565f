//! Error types for the `regift` crate.
//!
//! This module defines [`RegiftError`], the unified error type returned by all
//! fallible operations in the crate. Variants are grouped by where in the
//! pipeline they originate (sampling, source, decode, encode) so callers can
//! tell the cause of a failed conversion apart without parsing messages.

use std::{io::Error as IoError, path::PathBuf, time::Duration};

use ffmpeg_next::Error as FfmpegError;
use gif::EncodingError;
use image::ImageError;
use thiserror::Error;

use crate::time_point::TimePoint;

/// The unified error type for all `regift` operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegiftError {
    /// The media source could not be opened.
    #[error("Failed to open media source {path}: {reason}")]
    FileOpen {
        /// Path or URI that was passed in.
        path: PathBuf,
        /// Underlying reason the open failed.
        reason: String,
    },

    /// The source does not contain a video stream.
    #[error("No video stream found in source")]
    NoVideoStream,

    /// A frame count of zero was requested.
    #[error("Frame count must be greater than zero (got {0})")]
    InvalidFrameCount(u32),

    /// The source duration is zero, negative, or unknown.
    #[error("Invalid media duration: {0}")]
    InvalidDuration(TimePoint),

    /// The per-frame delay is negative or not finite.
    #[error("Invalid frame delay: {0} seconds")]
    InvalidDelay(f32),

    /// Caller-supplied time points are empty or not strictly increasing.
    #[error("Invalid time points: {0}")]
    InvalidTimePoints(String),

    /// A frame could not be decoded at the requested time point.
    #[error("Failed to decode frame at {time_point}: {reason}")]
    VideoDecode {
        /// The requested time point.
        time_point: TimePoint,
        /// Why decoding failed.
        reason: String,
    },

    /// The final requested time point failed to decode under
    /// [`LastFramePolicy::Strict`](crate::LastFramePolicy::Strict).
    #[error("Decoding the last frame ({time_point}) failed: {reason}")]
    LastFrameFailed {
        /// The last requested time point.
        time_point: TimePoint,
        /// The decode failure message.
        reason: String,
    },

    /// GIF encoding failed.
    #[error("GIF encoding error: {0}")]
    GifEncode(String),

    /// The muxer was finalized without any frame having been appended.
    #[error("No frames were written to the GIF")]
    NoFramesWritten,

    /// No frame outcome arrived within the configured timeout.
    #[error("Timed out after {0:?} waiting for decoded frames")]
    Timeout(Duration),

    /// The operation was cancelled via a [`CancellationToken`](crate::CancellationToken).
    #[error("Operation cancelled")]
    Cancelled,

    /// A background generation task panicked or was aborted.
    #[error("Generation task failed: {0}")]
    TaskFailed(String),

    /// An error originating from the FFmpeg libraries.
    #[error("FFmpeg error: {0}")]
    Ffmpeg(String),

    /// An I/O error occurred while writing the output file.
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// An error from the `image` crate during frame conversion.
    #[error("Image processing error: {0}")]
    Image(#[from] ImageError),
}

impl From<FfmpegError> for RegiftError {
    fn from(error: FfmpegError) -> Self {
        RegiftError::Ffmpeg(error.to_string())
    }
}

impl From<EncodingError> for RegiftError {
    fn from(error: EncodingError) -> Self {
        match error {
            EncodingError::Io(io) => RegiftError::Io(io),
            other => RegiftError::GifEncode(other.to_string()),
        }
    }
}

impl RegiftError {
    /// Returns `true` for errors raised before any decode request was issued.
    pub fn is_sampling_error(&self) -> bool {
        matches!(
            self,
            RegiftError::InvalidFrameCount(_)
                | RegiftError::InvalidDuration(_)
                | RegiftError::InvalidDelay(_)
                | RegiftError::InvalidTimePoints(_)
        )
    }

    /// Returns `true` for errors raised while writing or finalizing the GIF.
    pub fn is_encode_error(&self) -> bool {
        matches!(
            self,
            RegiftError::GifEncode(_) | RegiftError::NoFramesWritten | RegiftError::Io(_)
        )
    }
}

/// Cloneable description of a decode failure, used when the same failure has
/// to be both logged and recorded on the output.
pub(crate) fn describe(error: &RegiftError) -> String {
    match error {
        RegiftError::VideoDecode { reason, .. } => reason.clone(),
        other => other.to_string(),
    }
}
