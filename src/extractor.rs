//! The frame extraction seam.
//!
//! A [`FrameExtractor`] turns a list of time points into one
//! [`FrameOutcome`] per point, delivered through a [`FrameSink`]. The sink is
//! the sending half of a single-consumer channel: extractors may decode on as
//! many threads as they like and deliver in any order, while the consumer
//! (the GIF orchestrator) sees outcomes one at a time and reorders them.
//!
//! [`FfmpegFrameExtractor`](crate::FfmpegFrameExtractor) is the production
//! implementation. Tests and embedders can provide their own.

use std::sync::mpsc::{Receiver, Sender};

use image::DynamicImage;

use crate::configuration::{MaxFrameSize, Tolerance};
use crate::error::RegiftError;
use crate::progress::CancellationToken;
use crate::time_point::TimePoint;

/// Decode parameters shared by every time point of one request.
#[derive(Debug, Clone, Default)]
pub struct ExtractionSettings {
    /// Allowed slack around each requested time point.
    pub tolerance: Tolerance,
    /// Output size bound; frames are scaled down to fit.
    pub max_size: MaxFrameSize,
    /// When set, undelivered time points are reported as cancelled.
    pub cancellation: CancellationToken,
}

impl ExtractionSettings {
    /// Returns `true` once the request's token has been cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }
}

/// Terminal status of one decode request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameStatus {
    /// An image was produced.
    Succeeded,
    /// The decoder could not produce an image.
    Failed,
    /// The request was cancelled or superseded before it ran.
    Cancelled,
}

/// What the decoder produced for one time point.
#[derive(Debug)]
pub enum FrameResult {
    /// A decoded, display-oriented, size-bounded image.
    Succeeded {
        /// The decoded frame.
        image: DynamicImage,
        /// Presentation time of the frame that was actually picked.
        actual_time: TimePoint,
    },
    /// Decoding failed.
    Failed(RegiftError),
    /// The request was cancelled. Not an error.
    Cancelled,
}

/// One delivered decode result.
#[derive(Debug)]
pub struct FrameOutcome {
    /// Position of the time point in the request list.
    pub index: usize,
    /// The time point that was requested.
    pub requested: TimePoint,
    /// The result.
    pub result: FrameResult,
}

impl FrameOutcome {
    /// A successful decode.
    pub fn succeeded(
        index: usize,
        requested: TimePoint,
        image: DynamicImage,
        actual_time: TimePoint,
    ) -> Self {
        Self {
            index,
            requested,
            result: FrameResult::Succeeded { image, actual_time },
        }
    }

    /// A failed decode.
    pub fn failed(index: usize, requested: TimePoint, error: RegiftError) -> Self {
        Self {
            index,
            requested,
            result: FrameResult::Failed(error),
        }
    }

    /// A cancelled decode.
    pub fn cancelled(index: usize, requested: TimePoint) -> Self {
        Self {
            index,
            requested,
            result: FrameResult::Cancelled,
        }
    }

    /// The status of this outcome.
    pub fn status(&self) -> FrameStatus {
        match self.result {
            FrameResult::Succeeded { .. } => FrameStatus::Succeeded,
            FrameResult::Failed(_) => FrameStatus::Failed,
            FrameResult::Cancelled => FrameStatus::Cancelled,
        }
    }

    /// The decoded image, if any.
    pub fn image(&self) -> Option<&DynamicImage> {
        match &self.result {
            FrameResult::Succeeded { image, .. } => Some(image),
            _ => None,
        }
    }

    /// The presentation time actually decoded, if any.
    pub fn actual_time(&self) -> Option<TimePoint> {
        match &self.result {
            FrameResult::Succeeded { actual_time, .. } => Some(*actual_time),
            _ => None,
        }
    }

    /// The decode error, if any.
    pub fn error(&self) -> Option<&RegiftError> {
        match &self.result {
            FrameResult::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Sending half of the outcome channel. Cheap to clone and [`Send`], so
/// worker threads can each hold one.
#[derive(Debug, Clone)]
pub struct FrameSink {
    sender: Sender<FrameOutcome>,
}

impl FrameSink {
    /// Create a sink and the receiver that consumes it.
    pub fn channel() -> (FrameSink, Receiver<FrameOutcome>) {
        let (sender, receiver) = std::sync::mpsc::channel();
        (FrameSink { sender }, receiver)
    }

    /// Deliver one outcome. Returns `false` once the consumer has stopped
    /// listening; extractors should stop decoding when that happens.
    pub fn deliver(&self, outcome: FrameOutcome) -> bool {
        self.sender.send(outcome).is_ok()
    }

    /// Report every point in `points` (paired with its request index) as
    /// cancelled. Stops early if the consumer is gone.
    pub fn cancel_remaining<I>(&self, points: I) -> bool
    where
        I: IntoIterator<Item = (usize, TimePoint)>,
    {
        points
            .into_iter()
            .all(|(index, requested)| self.deliver(FrameOutcome::cancelled(index, requested)))
    }
}

/// Produces decoded frames for a list of time points.
///
/// `extract` runs on a background thread owned by the orchestrator. It must
/// deliver at most one outcome per index and should deliver exactly one; any
/// index still missing when `extract` returns (and drops its sink) is treated
/// as a failed decode. Delivery order is free.
pub trait FrameExtractor: Send + Sync {
    /// Decode one image per time point from `source`.
    fn extract(
        &self,
        source: &str,
        time_points: &[TimePoint],
        settings: &ExtractionSettings,
        sink: FrameSink,
    );

    /// Length of `source`. Used to sample time points when the caller does
    /// not supply them.
    fn duration(&self, source: &str) -> Result<TimePoint, RegiftError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deliver_reports_closed_consumer() {
        let (sink, receiver) = FrameSink::channel();
        assert!(sink.deliver(FrameOutcome::cancelled(0, TimePoint::ZERO)));
        drop(receiver);
        assert!(!sink.deliver(FrameOutcome::cancelled(1, TimePoint::ZERO)));
    }

    #[test]
    fn cancel_remaining_marks_every_point() {
        let (sink, receiver) = FrameSink::channel();
        let points = vec![(2, TimePoint::new(1, 1)), (3, TimePoint::new(2, 1))];
        assert!(sink.cancel_remaining(points));
        drop(sink);

        let statuses: Vec<_> = receiver.iter().map(|o| (o.index, o.status())).collect();
        assert_eq!(
            statuses,
            vec![(2, FrameStatus::Cancelled), (3, FrameStatus::Cancelled)]
        );
    }

    #[test]
    fn accessors_follow_result() {
        let image = DynamicImage::new_rgba8(2, 2);
        let outcome = FrameOutcome::succeeded(0, TimePoint::ZERO, image, TimePoint::new(1, 30));
        assert_eq!(outcome.status(), FrameStatus::Succeeded);
        assert_eq!(outcome.actual_time(), Some(TimePoint::new(1, 30)));
        assert!(outcome.error().is_none());
        assert!(outcome.image().is_some());
    }
}
