//! Opening and probing video sources.
//!
//! [`MediaSource`] wraps an FFmpeg demuxer positioned on the best video
//! stream of a file or URI, together with the [`VideoMetadata`] read when it
//! was opened. The FFmpeg extractor opens one per worker; [`MediaSource::probe`]
//! opens, reads metadata and closes again.

use std::path::{Path, PathBuf};

use ffmpeg_next::{
    codec::context::Context as CodecContext, format::context::Input, format::stream::Stream,
    media::Type,
};
use ffmpeg_sys_next::{AVPacketSideDataType, av_packet_side_data_get};

use crate::conversion::{self, Rotation};
use crate::error::RegiftError;
use crate::time_point::TimePoint;

/// Container-level timestamps are in microseconds.
const AV_TIME_BASE: u64 = 1_000_000;

/// FFmpeg's marker for an unset timestamp.
const AV_NOPTS_VALUE: i64 = i64::MIN;

/// Metadata of the video stream a GIF is sampled from.
#[derive(Debug, Clone)]
#[must_use]
pub struct VideoMetadata {
    /// Duration of the stream (or of the container when the stream does not
    /// report one).
    pub duration: TimePoint,
    /// Presentation time of the first frame on the stream's own timeline.
    /// Time points are relative to it: time point zero is the first frame.
    pub start_time: TimePoint,
    /// Coded frame width in pixels.
    pub width: u32,
    /// Coded frame height in pixels.
    pub height: u32,
    /// Clockwise rotation applied for display: 0, 90, 180 or 270.
    pub rotation_degrees: u32,
    /// Average frame rate, 0.0 if unknown.
    pub frames_per_second: f64,
    /// Codec name (e.g. `"h264"`).
    pub codec: String,
    /// Container format name (e.g. `"mov,mp4,m4a,3gp,3g2,mj2"`).
    pub format: String,
    /// Index of the stream inside the container.
    pub stream_index: usize,
}

impl VideoMetadata {
    /// Frame size after the display rotation is applied.
    pub fn display_size(&self) -> (u32, u32) {
        self.rotation().rotated_size(self.width, self.height)
    }

    pub(crate) fn rotation(&self) -> Rotation {
        Rotation::from_degrees(self.rotation_degrees as f64)
    }
}

/// An opened video source.
pub struct MediaSource {
    pub(crate) input_context: Input,
    pub(crate) metadata: VideoMetadata,
    pub(crate) path: PathBuf,
}

impl MediaSource {
    /// Open a file path or URI and locate its best video stream.
    ///
    /// # Errors
    ///
    /// - [`RegiftError::FileOpen`] if FFmpeg cannot open or parse the source.
    /// - [`RegiftError::NoVideoStream`] if it has no video stream.
    pub fn open<P: AsRef<Path>>(source: P) -> Result<Self, RegiftError> {
        let path = source.as_ref().to_path_buf();
        log::debug!("Opening video source: {}", path.display());

        ffmpeg_next::init().map_err(|error| RegiftError::FileOpen {
            path: path.clone(),
            reason: format!("FFmpeg initialisation failed: {error}"),
        })?;

        let input_context =
            ffmpeg_next::format::input(&path).map_err(|error| RegiftError::FileOpen {
                path: path.clone(),
                reason: error.to_string(),
            })?;

        let stream = input_context
            .streams()
            .best(Type::Video)
            .ok_or(RegiftError::NoVideoStream)?;

        let decoder_context = CodecContext::from_parameters(stream.parameters()).map_err(
            |error| RegiftError::FileOpen {
                path: path.clone(),
                reason: format!("Failed to read video codec parameters: {error}"),
            },
        )?;
        let decoder = decoder_context
            .decoder()
            .video()
            .map_err(|error| RegiftError::FileOpen {
                path: path.clone(),
                reason: format!("Failed to create video decoder: {error}"),
            })?;

        let frame_rate = stream.avg_frame_rate();
        let frames_per_second = if frame_rate.denominator() != 0 {
            frame_rate.numerator() as f64 / frame_rate.denominator() as f64
        } else {
            0.0
        };

        let codec = decoder
            .codec()
            .map(|codec| codec.name().to_string())
            .unwrap_or_else(|| "unknown".to_string());

        let rotation = stream_rotation(&stream);
        let rotation_degrees = match rotation {
            Rotation::None => 0,
            Rotation::Clockwise90 => 90,
            Rotation::Clockwise180 => 180,
            Rotation::Clockwise270 => 270,
        };

        let metadata = VideoMetadata {
            duration: stream_duration(&stream, &input_context),
            start_time: stream_start_time(&stream, &input_context),
            width: decoder.width(),
            height: decoder.height(),
            rotation_degrees,
            frames_per_second,
            codec,
            format: input_context.format().name().to_string(),
            stream_index: stream.index(),
        };

        log::info!(
            "Opened video source: {} ({}x{}, rotation={}, {:.2} fps, codec={}, duration={}, start={})",
            path.display(),
            metadata.width,
            metadata.height,
            metadata.rotation_degrees,
            metadata.frames_per_second,
            metadata.codec,
            metadata.duration,
            metadata.start_time,
        );

        Ok(Self {
            input_context,
            metadata,
            path,
        })
    }

    /// Open a source, read its metadata and close it again.
    pub fn probe<P: AsRef<Path>>(source: P) -> Result<VideoMetadata, RegiftError> {
        Ok(Self::open(source)?.metadata)
    }

    /// Metadata read at open time.
    pub fn metadata(&self) -> &VideoMetadata {
        &self.metadata
    }

    /// The path or URI this source was opened from.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Prefer the stream's own duration (exact, in its time base) and fall back
/// to the container duration in microseconds.
fn stream_duration(stream: &Stream, input_context: &Input) -> TimePoint {
    let stream_duration = stream.duration();
    if stream_duration > 0 {
        return conversion::pts_to_time_point(stream_duration, stream.time_base());
    }

    let container_duration = input_context.duration();
    if container_duration > 0 {
        return TimePoint::new(container_duration, AV_TIME_BASE).reduced();
    }

    TimePoint::ZERO
}

/// Where the stream's timeline begins. Prefers the stream's own start time
/// and falls back to the container's; zero when neither is known.
fn stream_start_time(stream: &Stream, input_context: &Input) -> TimePoint {
    let stream_start = stream.start_time();
    if stream_start != AV_NOPTS_VALUE {
        return conversion::pts_to_time_point(stream_start, stream.time_base());
    }

    // SAFETY: `input_context` owns a live AVFormatContext for the duration of
    // this borrow.
    let container_start = unsafe { (*input_context.as_ptr()).start_time };
    if container_start != AV_NOPTS_VALUE {
        return TimePoint::new(container_start, AV_TIME_BASE).reduced();
    }

    TimePoint::ZERO
}

/// Read the display matrix attached to the stream's codec parameters.
fn stream_rotation(stream: &Stream) -> Rotation {
    let parameters = stream.parameters();

    // SAFETY: `parameters` borrows the stream's live AVCodecParameters; the
    // side-data array and its buffers are owned by it and outlive this call.
    let bytes = unsafe {
        let raw = parameters.as_ptr();
        let side_data = av_packet_side_data_get(
            (*raw).coded_side_data,
            (*raw).nb_coded_side_data,
            AVPacketSideDataType::AV_PKT_DATA_DISPLAYMATRIX,
        );
        if side_data.is_null() || (*side_data).data.is_null() {
            return Rotation::None;
        }
        std::slice::from_raw_parts((*side_data).data, (*side_data).size)
    };

    conversion::rotation_from_display_matrix(bytes).unwrap_or_default()
}
