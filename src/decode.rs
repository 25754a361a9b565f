//! FFmpeg-backed frame extraction.
//!
//! [`FfmpegFrameExtractor`] decodes the frame on display at each requested
//! time point. For every point it seeks to the nearest keyframe at or before
//! the target, decodes forward and picks a frame using the request's
//! [`Tolerance`](crate::Tolerance):
//!
//! 1. the first frame whose timestamp falls inside `[t - before, t + after]`
//!    is taken immediately;
//! 2. otherwise the last frame that starts at or before `t + after` (the
//!    frame a player would be showing at `t`);
//! 3. if `t` precedes every decodable frame, the first frame.
//!
//! Time points are relative to the first frame. Streams whose timestamps
//! start later (MPEG-TS, many Matroska files) are shifted by the stream's
//! start time before seeking, and reported times are shifted back.
//!
//! Frames are scaled into RGBA so the display-rotated size fits the
//! request's [`MaxFrameSize`](crate::MaxFrameSize), then rotated upright.

use ffmpeg_next::{
    Rational,
    codec::context::Context as CodecContext,
    decoder::Video as VideoDecoder,
    format::Pixel,
    frame::Video as VideoFrame,
    software::scaling::{Context as ScalingContext, Flags as ScalingFlags},
};
use image::{DynamicImage, RgbaImage};

use crate::configuration::{MaxFrameSize, Tolerance};
use crate::conversion::{self, Rotation};
use crate::error::RegiftError;
use crate::extractor::{ExtractionSettings, FrameExtractor, FrameOutcome, FrameSink};
use crate::source::MediaSource;
use crate::time_point::TimePoint;

/// Decodes frames with FFmpeg.
///
/// The default extractor decodes all time points sequentially on the
/// extraction thread. With the `rayon` feature,
/// [`parallel`](FfmpegFrameExtractor::parallel) splits them into contiguous
/// chunks decoded concurrently, each worker with its own demuxer.
#[derive(Debug, Clone, Default)]
pub struct FfmpegFrameExtractor {
    parallel: bool,
}

impl FfmpegFrameExtractor {
    /// Sequential extractor.
    pub fn new() -> Self {
        Self { parallel: false }
    }

    /// Extractor that decodes on the rayon thread pool.
    #[cfg(feature = "rayon")]
    pub fn parallel() -> Self {
        Self { parallel: true }
    }

    /// Whether this extractor decodes in parallel.
    pub fn is_parallel(&self) -> bool {
        self.parallel
    }
}

impl FrameExtractor for FfmpegFrameExtractor {
    fn extract(
        &self,
        source: &str,
        time_points: &[TimePoint],
        settings: &ExtractionSettings,
        sink: FrameSink,
    ) {
        let points: Vec<(usize, TimePoint)> = time_points.iter().copied().enumerate().collect();

        #[cfg(feature = "rayon")]
        if self.parallel {
            crate::parallel::extract_parallel(source, &points, settings, &sink);
            return;
        }

        decode_points(source, &points, settings, &sink);
    }

    fn duration(&self, source: &str) -> Result<TimePoint, RegiftError> {
        Ok(MediaSource::probe(source)?.duration)
    }
}

/// Decode `points` in order with a single demuxer, delivering each outcome
/// as soon as it is ready.
pub(crate) fn decode_points(
    source: &str,
    points: &[(usize, TimePoint)],
    settings: &ExtractionSettings,
    sink: &FrameSink,
) {
    let mut decoder = match PointDecoder::open(source, settings.max_size) {
        Ok(decoder) => decoder,
        Err(error) => {
            let reason = error.to_string();
            for &(index, time_point) in points {
                let error = RegiftError::VideoDecode {
                    time_point,
                    reason: reason.clone(),
                };
                if !sink.deliver(FrameOutcome::failed(index, time_point, error)) {
                    return;
                }
            }
            return;
        }
    };

    for (position, &(index, requested)) in points.iter().enumerate() {
        if settings.is_cancelled() {
            log::debug!(
                "Extraction cancelled with {} time point(s) left",
                points.len() - position
            );
            sink.cancel_remaining(points[position..].iter().copied());
            return;
        }

        let outcome = match decoder.frame_at(requested, settings.tolerance) {
            Ok((image, actual_time)) => {
                log::trace!("Decoded frame for {requested} at {actual_time}");
                FrameOutcome::succeeded(index, requested, image, actual_time)
            }
            Err(error) => FrameOutcome::failed(index, requested, error),
        };

        if !sink.deliver(outcome) {
            log::debug!("Frame consumer went away; stopping extraction");
            return;
        }
    }
}

/// A decoded frame together with its presentation time.
struct TimedFrame {
    frame: VideoFrame,
    time: TimePoint,
}

/// Seeks and decodes single frames from one opened source.
struct PointDecoder {
    source: MediaSource,
    decoder: VideoDecoder,
    scaler: ScalingContext,
    time_base: Rational,
    start_time: TimePoint,
    stream_index: usize,
    scaled_width: u32,
    scaled_height: u32,
    rotation: Rotation,
}

impl PointDecoder {
    fn open(source: &str, max_size: MaxFrameSize) -> Result<Self, RegiftError> {
        let source = MediaSource::open(source)?;
        let stream_index = source.metadata.stream_index;
        let start_time = source.metadata.start_time;
        let rotation = source.metadata.rotation();

        let stream = source
            .input_context
            .stream(stream_index)
            .ok_or(RegiftError::NoVideoStream)?;
        let time_base = stream.time_base();
        let decoder_context = CodecContext::from_parameters(stream.parameters())?;
        let decoder = decoder_context.decoder().video()?;

        // Fit the upright size, then express it in coded orientation for
        // the scaler; rotation happens after scaling.
        let (display_width, display_height) =
            rotation.rotated_size(decoder.width(), decoder.height());
        let (fitted_width, fitted_height) = max_size.fit(display_width, display_height);
        let (scaled_width, scaled_height) = rotation.rotated_size(fitted_width, fitted_height);

        let scaler = ScalingContext::get(
            decoder.format(),
            decoder.width(),
            decoder.height(),
            Pixel::RGBA,
            scaled_width,
            scaled_height,
            ScalingFlags::BILINEAR,
        )?;

        log::debug!(
            "Frame decoder ready: {}x{} -> {}x{} (rotation {:?})",
            decoder.width(),
            decoder.height(),
            fitted_width,
            fitted_height,
            rotation,
        );

        Ok(Self {
            source,
            decoder,
            scaler,
            time_base,
            start_time,
            stream_index,
            scaled_width,
            scaled_height,
            rotation,
        })
    }

    /// Decode the frame shown at `target`, a time point relative to the
    /// first frame. The returned time is relative as well.
    fn frame_at(
        &mut self,
        target: TimePoint,
        tolerance: Tolerance,
    ) -> Result<(DynamicImage, TimePoint), RegiftError> {
        let stream_target = to_stream_time(target, self.start_time);
        let picked = self.locate(stream_target, tolerance).map_err(|error| match error {
            RegiftError::VideoDecode { reason, .. } => RegiftError::VideoDecode {
                time_point: target,
                reason,
            },
            other => RegiftError::VideoDecode {
                time_point: target,
                reason: other.to_string(),
            },
        })?;
        let time = from_stream_time(picked.time, self.start_time);
        let image = self.convert(&picked.frame).map_err(|error| RegiftError::VideoDecode {
            time_point: target,
            reason: error.to_string(),
        })?;
        Ok((image, time))
    }

    /// Find the frame for `target` on the stream's own timeline.
    fn locate(
        &mut self,
        target: TimePoint,
        tolerance: Tolerance,
    ) -> Result<TimedFrame, RegiftError> {
        let (window_start, window_end) = tolerance_window(target, tolerance);

        let Self {
            source,
            decoder,
            time_base,
            stream_index,
            ..
        } = self;

        // Container-level seek, lands on the keyframe at or before target.
        let seek_timestamp = target.as_micros();
        source
            .input_context
            .seek(seek_timestamp, ..seek_timestamp)?;
        decoder.flush();

        let mut candidate: Option<TimedFrame> = None;
        let mut decoded = VideoFrame::empty();

        for (stream, packet) in source.input_context.packets() {
            if stream.index() != *stream_index {
                continue;
            }
            if let Err(error) = decoder.send_packet(&packet) {
                log::debug!("Skipping undecodable packet: {error}");
                continue;
            }

            while decoder.receive_frame(&mut decoded).is_ok() {
                if let Some(picked) =
                    pick(&decoded, *time_base, window_start, window_end, &mut candidate)
                {
                    return Ok(picked);
                }
            }
        }

        decoder.send_eof()?;
        while decoder.receive_frame(&mut decoded).is_ok() {
            if let Some(picked) =
                pick(&decoded, *time_base, window_start, window_end, &mut candidate)
            {
                return Ok(picked);
            }
        }

        candidate.ok_or_else(|| RegiftError::VideoDecode {
            time_point: target,
            reason: "no decodable frame at or near this time".to_string(),
        })
    }

    fn convert(&mut self, frame: &VideoFrame) -> Result<DynamicImage, RegiftError> {
        let mut rgba_frame = VideoFrame::empty();
        self.scaler.run(frame, &mut rgba_frame)?;

        let buffer =
            conversion::frame_to_buffer(&rgba_frame, self.scaled_width, self.scaled_height, 4);
        let image = RgbaImage::from_raw(self.scaled_width, self.scaled_height, buffer)
            .ok_or_else(|| {
                RegiftError::Ffmpeg("decoded frame buffer has an unexpected size".to_string())
            })?;

        Ok(self.rotation.apply(DynamicImage::ImageRgba8(image)))
    }
}

/// Map a time point relative to the first frame onto the stream timeline.
fn to_stream_time(time_point: TimePoint, start_time: TimePoint) -> TimePoint {
    time_point.checked_add(start_time).unwrap_or(time_point)
}

/// Inverse of [`to_stream_time`].
fn from_stream_time(stream_time: TimePoint, start_time: TimePoint) -> TimePoint {
    stream_time.checked_sub(start_time).unwrap_or(stream_time)
}

/// `[target - before, target + after]`.
fn tolerance_window(target: TimePoint, tolerance: Tolerance) -> (TimePoint, TimePoint) {
    let window_start = target.checked_sub(tolerance.before).unwrap_or(target);
    let window_end = target.checked_add(tolerance.after).unwrap_or(target);
    (window_start, window_end)
}

/// Decide what to do with one decoded frame. Returns the frame to use once
/// the choice is final, otherwise records it as the running candidate.
fn pick(
    decoded: &VideoFrame,
    time_base: Rational,
    window_start: TimePoint,
    window_end: TimePoint,
    candidate: &mut Option<TimedFrame>,
) -> Option<TimedFrame> {
    let Some(pts) = decoded.timestamp().or_else(|| decoded.pts()) else {
        // Untimed frames can only stand in when nothing better shows up.
        if candidate.is_none() {
            *candidate = Some(TimedFrame {
                frame: decoded.clone(),
                time: window_start,
            });
        }
        return None;
    };

    let time = conversion::pts_to_time_point(pts, time_base);
    let current = TimedFrame {
        frame: decoded.clone(),
        time,
    };

    if time >= window_start && time <= window_end {
        return Some(current);
    }

    if time > window_end {
        return Some(candidate.take().unwrap_or(current));
    }

    *candidate = Some(current);
    None
}
