//! Rational timestamps and evenly spaced sampling.
//!
//! A [`TimePoint`] is a position on a media timeline expressed as
//! `value / timescale` seconds. Keeping the rational form (instead of `f64`
//! seconds) means sampled points are exact and strictly ordered no matter how
//! short the clip or how many frames are requested.
//!
//! # Example
//!
//! ```
//! use regift::{TimePoint, sample_time_points};
//!
//! let duration = TimePoint::new(10, 1); // 10 seconds
//! let points = sample_time_points(duration, 4)?;
//! let seconds: Vec<f64> = points.iter().map(|t| t.as_secs_f64()).collect();
//! assert_eq!(seconds, vec![0.0, 2.5, 5.0, 7.5]);
//! # Ok::<(), regift::RegiftError>(())
//! ```

use std::cmp::Ordering;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::time::Duration;

use crate::error::RegiftError;

/// Timescale used when converting floating-point seconds, matching the
/// common 600-ticks-per-second convention of QuickTime-style timelines.
pub const DEFAULT_TIMESCALE: u64 = 600;

const NANOS_PER_SECOND: u64 = 1_000_000_000;

/// A timestamp on a media timeline: `value / timescale` seconds.
///
/// Comparison is by rational value, so `TimePoint::new(1, 2)` equals
/// `TimePoint::new(300, 600)`.
#[derive(Debug, Clone, Copy)]
pub struct TimePoint {
    value: i64,
    timescale: u64,
}

impl TimePoint {
    /// The start of the timeline.
    pub const ZERO: TimePoint = TimePoint {
        value: 0,
        timescale: 1,
    };

    /// Create a time point of `value / timescale` seconds.
    ///
    /// A zero timescale is treated as 1.
    pub fn new(value: i64, timescale: u64) -> Self {
        Self {
            value,
            timescale: timescale.max(1),
        }
    }

    /// Convert floating-point seconds, rounding to the nearest tick of
    /// `timescale`.
    pub fn from_seconds(seconds: f64, timescale: u64) -> Self {
        let timescale = timescale.max(1);
        let value = (seconds * timescale as f64).round() as i64;
        Self { value, timescale }
    }

    /// Convert a [`Duration`] at nanosecond precision.
    pub fn from_duration(duration: Duration) -> Self {
        let nanos = i64::try_from(duration.as_nanos()).unwrap_or(i64::MAX);
        Self::new(nanos, NANOS_PER_SECOND).reduced()
    }

    /// The numerator.
    pub fn value(&self) -> i64 {
        self.value
    }

    /// Ticks per second.
    pub fn timescale(&self) -> u64 {
        self.timescale
    }

    /// Seconds as `f64`.
    pub fn as_secs_f64(&self) -> f64 {
        self.value as f64 / self.timescale as f64
    }

    /// Convert to a [`Duration`]. Negative time points clamp to zero.
    pub fn to_duration(&self) -> Duration {
        if self.value <= 0 {
            return Duration::ZERO;
        }
        let nanos = self.value as i128 * NANOS_PER_SECOND as i128 / self.timescale as i128;
        Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
    }

    /// Microseconds since the start of the timeline, truncated. This is the
    /// unit FFmpeg container-level seeking expects.
    pub fn as_micros(&self) -> i64 {
        let micros = self.value as i128 * 1_000_000 / self.timescale as i128;
        micros.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }

    /// Returns `true` if this time point lies strictly after zero.
    pub fn is_positive(&self) -> bool {
        self.value > 0
    }

    /// The same instant with numerator and timescale divided by their GCD.
    pub fn reduced(&self) -> Self {
        let divisor = gcd(self.value.unsigned_abs(), self.timescale);
        if divisor <= 1 {
            return *self;
        }
        Self {
            value: self.value / divisor as i64,
            timescale: self.timescale / divisor,
        }
    }

    /// Exact sum, falling back to nanosecond precision if the common
    /// timescale would overflow.
    pub fn checked_add(&self, other: TimePoint) -> Option<TimePoint> {
        self.combine(other, |a, b| a.checked_add(b))
    }

    /// Exact difference, with the same overflow fallback as
    /// [`checked_add`](TimePoint::checked_add).
    pub fn checked_sub(&self, other: TimePoint) -> Option<TimePoint> {
        self.combine(other, |a, b| a.checked_sub(b))
    }

    fn combine(&self, other: TimePoint, op: impl Fn(i128, i128) -> Option<i128>) -> Option<TimePoint> {
        let divisor = gcd(self.timescale, other.timescale);
        let common = self.timescale as u128 / divisor as u128 * other.timescale as u128;
        let left = self.value as i128 * (common / self.timescale as u128) as i128;
        let right = other.value as i128 * (common / other.timescale as u128) as i128;
        let value = op(left, right)?;

        match (i64::try_from(value), u64::try_from(common)) {
            (Ok(value), Ok(timescale)) => Some(TimePoint::new(value, timescale).reduced()),
            _ => {
                let nanos = value.checked_mul(NANOS_PER_SECOND as i128)? / common as i128;
                Some(TimePoint::new(i64::try_from(nanos).ok()?, NANOS_PER_SECOND).reduced())
            }
        }
    }
}

impl Default for TimePoint {
    fn default() -> Self {
        Self::ZERO
    }
}

impl PartialEq for TimePoint {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for TimePoint {}

impl PartialOrd for TimePoint {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TimePoint {
    fn cmp(&self, other: &Self) -> Ordering {
        let left = self.value as i128 * other.timescale as i128;
        let right = other.value as i128 * self.timescale as i128;
        left.cmp(&right)
    }
}

impl Display for TimePoint {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

impl From<Duration> for TimePoint {
    fn from(duration: Duration) -> Self {
        Self::from_duration(duration)
    }
}

/// Compute `frame_count` evenly spaced time points across `duration`.
///
/// Point `i` is exactly `duration * i / frame_count` for
/// `i in 0..frame_count`; the duration itself is never included.
///
/// # Errors
///
/// - [`RegiftError::InvalidFrameCount`] if `frame_count` is zero.
/// - [`RegiftError::InvalidDuration`] if `duration` is not positive.
pub fn sample_time_points(
    duration: TimePoint,
    frame_count: u32,
) -> Result<Vec<TimePoint>, RegiftError> {
    if frame_count == 0 {
        return Err(RegiftError::InvalidFrameCount(frame_count));
    }
    if !duration.is_positive() {
        return Err(RegiftError::InvalidDuration(duration));
    }

    let duration = duration.reduced();
    let timescale = u64::try_from(duration.timescale as u128 * frame_count as u128)
        .map_err(|_| RegiftError::InvalidDuration(duration))?;

    (0..frame_count)
        .map(|index| {
            let value = i64::try_from(duration.value as i128 * index as i128)
                .map_err(|_| RegiftError::InvalidDuration(duration))?;
            Ok(TimePoint::new(value, timescale).reduced())
        })
        .collect()
}

/// Check that caller-supplied time points are non-empty, non-negative and
/// strictly increasing.
pub(crate) fn validate_time_points(points: &[TimePoint]) -> Result<(), RegiftError> {
    let Some(first) = points.first() else {
        return Err(RegiftError::InvalidTimePoints(
            "at least one time point is required".to_string(),
        ));
    };
    if *first < TimePoint::ZERO {
        return Err(RegiftError::InvalidTimePoints(format!(
            "{first} is before the start of the video"
        )));
    }
    if let Some(window) = points.windows(2).find(|pair| pair[0] >= pair[1]) {
        return Err(RegiftError::InvalidTimePoints(format!(
            "{} is not after {}",
            window[1], window[0]
        )));
    }
    Ok(())
}

fn gcd(mut a: u64, mut b: u64) -> u64 {
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a
}
