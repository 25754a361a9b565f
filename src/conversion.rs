//! Internal conversion helpers.
//!
//! Pixel-plane copying, FFmpeg timestamp conversion and display-matrix
//! decoding shared by the probe and the FFmpeg extractor.

use ffmpeg_next::{Rational, frame::Video as VideoFrame};
use image::DynamicImage;

use crate::time_point::TimePoint;

/// Clockwise rotation to apply to decoded frames so they display upright.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Rotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
}

impl Rotation {
    /// Snap an angle in degrees (clockwise) to the nearest quarter turn.
    pub fn from_degrees(degrees: f64) -> Self {
        let quarter_turns = (degrees / 90.0).round() as i64;
        match quarter_turns.rem_euclid(4) {
            1 => Rotation::Clockwise90,
            2 => Rotation::Clockwise180,
            3 => Rotation::Clockwise270,
            _ => Rotation::None,
        }
    }

    /// Whether width and height trade places.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Rotation::Clockwise90 | Rotation::Clockwise270)
    }

    /// Size after rotation.
    pub fn rotated_size(self, width: u32, height: u32) -> (u32, u32) {
        if self.swaps_dimensions() {
            (height, width)
        } else {
            (width, height)
        }
    }

    /// Rotate a decoded image.
    pub fn apply(self, image: DynamicImage) -> DynamicImage {
        match self {
            Rotation::None => image,
            Rotation::Clockwise90 => image.rotate90(),
            Rotation::Clockwise180 => image.rotate180(),
            Rotation::Clockwise270 => image.rotate270(),
        }
    }
}

/// Decode a 3x3 display matrix (nine native-endian `i32`, 16.16 fixed point
/// for the first two columns) into the clockwise rotation it describes.
///
/// Returns `None` when the buffer is too short or degenerate.
pub fn rotation_from_display_matrix(data: &[u8]) -> Option<Rotation> {
    if data.len() < 9 * 4 {
        return None;
    }

    let entry = |index: usize| {
        let start = index * 4;
        let bytes = [data[start], data[start + 1], data[start + 2], data[start + 3]];
        i32::from_ne_bytes(bytes) as f64
    };

    let scale_0 = entry(0).hypot(entry(3));
    let scale_1 = entry(1).hypot(entry(4));
    if scale_0 == 0.0 || scale_1 == 0.0 {
        return None;
    }

    // Negated counter-clockwise angle of the matrix, i.e. the clockwise
    // turn needed to display the frame upright.
    let clockwise = (entry(1) / scale_1).atan2(entry(0) / scale_0).to_degrees();
    Some(Rotation::from_degrees(clockwise))
}

/// Copy pixel data from an FFmpeg video frame into a tightly-packed buffer,
/// dropping any per-row padding.
pub fn frame_to_buffer(
    video_frame: &VideoFrame,
    width: u32,
    height: u32,
    bytes_per_pixel: usize,
) -> Vec<u8> {
    let stride = video_frame.stride(0);
    let expected_stride = (width as usize) * bytes_per_pixel;
    let data = video_frame.data(0);

    if stride == expected_stride {
        data[..expected_stride * (height as usize)].to_vec()
    } else {
        let mut buffer = Vec::with_capacity(expected_stride * (height as usize));
        for row in 0..(height as usize) {
            let row_start = row * stride;
            buffer.extend_from_slice(&data[row_start..row_start + expected_stride]);
        }
        buffer
    }
}

/// Express a PTS in a stream's time base as an exact [`TimePoint`].
pub fn pts_to_time_point(pts: i64, time_base: Rational) -> TimePoint {
    let numerator = time_base.numerator() as i64;
    let denominator = time_base.denominator().max(1) as u64;
    TimePoint::new(pts.saturating_mul(numerator), denominator).reduced()
}
