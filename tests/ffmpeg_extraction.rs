//! FFmpeg-backed extraction tests.
//!
//! Tests require fixture files from `tests/fixtures/generate_fixtures.sh`
//! and are skipped when they are missing.

mod common;

use std::path::Path;
use std::time::Duration;

use common::read_gif;
use regift::{
    ExtractionSettings, FfmpegFrameExtractor, FrameExtractor, FrameSink, FrameStatus, GifOptions,
    MaxFrameSize, MediaSource, Regift, RegiftError, TimePoint, sample_time_points,
};

fn sample_video_path() -> &'static str {
    "tests/fixtures/sample_video.mp4"
}

fn rotated_video_path() -> &'static str {
    "tests/fixtures/rotated_video.mp4"
}

fn offset_video_path() -> &'static str {
    "tests/fixtures/offset_video.mkv"
}

fn fixture(path: &'static str) -> Option<&'static str> {
    Path::new(path).exists().then_some(path)
}

#[test]
fn probe_reads_stream_metadata() {
    let Some(path) = fixture(sample_video_path()) else {
        return;
    };

    let metadata = MediaSource::probe(path).unwrap();
    assert_eq!((metadata.width, metadata.height), (640, 360));
    assert_eq!(metadata.rotation_degrees, 0);
    assert!((metadata.duration.as_secs_f64() - 5.0).abs() < 0.1);
    assert!((metadata.frames_per_second - 30.0).abs() < 0.01);
}

#[test]
fn missing_file_fails_to_open() {
    let result = MediaSource::probe("tests/fixtures/does_not_exist.mp4");
    assert!(matches!(result, Err(RegiftError::FileOpen { .. })));
}

#[test]
fn extractor_delivers_one_outcome_per_time_point() {
    let Some(path) = fixture(sample_video_path()) else {
        return;
    };

    let extractor = FfmpegFrameExtractor::new();
    let duration = extractor.duration(path).unwrap();
    let points = sample_time_points(duration, 6).unwrap();
    let (sink, receiver) = FrameSink::channel();

    extractor.extract(path, &points, &ExtractionSettings::default(), sink);
    let outcomes: Vec<_> = receiver.iter().collect();

    assert_eq!(outcomes.len(), 6);
    for (index, outcome) in outcomes.iter().enumerate() {
        assert_eq!(outcome.index, index);
        assert_eq!(outcome.status(), FrameStatus::Succeeded);
        let actual = outcome.actual_time().unwrap();
        let drift = (actual.as_secs_f64() - points[index].as_secs_f64()).abs();
        assert!(drift <= 1.0 / 30.0 + 0.011, "frame {index} drifted {drift}s");
        let image = outcome.image().unwrap();
        assert_eq!((image.width(), image.height()), (640, 360));
    }
}

#[test]
fn extractor_fits_frames_inside_max_size() {
    let Some(path) = fixture(sample_video_path()) else {
        return;
    };

    let settings = ExtractionSettings {
        max_size: MaxFrameSize::new(160, 160),
        ..ExtractionSettings::default()
    };
    let (sink, receiver) = FrameSink::channel();
    FfmpegFrameExtractor::new().extract(path, &[TimePoint::new(1, 1)], &settings, sink);

    let outcome = receiver.recv().unwrap();
    let image = outcome.image().unwrap();
    assert_eq!((image.width(), image.height()), (160, 90));
}

#[test]
fn cancelled_settings_report_every_point_cancelled() {
    let Some(path) = fixture(sample_video_path()) else {
        return;
    };

    let settings = ExtractionSettings::default();
    settings.cancellation.cancel();
    let points = [TimePoint::new(0, 1), TimePoint::new(1, 1)];
    let (sink, receiver) = FrameSink::channel();
    FfmpegFrameExtractor::new().extract(path, &points, &settings, sink);

    let statuses: Vec<_> = receiver.iter().map(|outcome| outcome.status()).collect();
    assert_eq!(statuses, vec![FrameStatus::Cancelled, FrameStatus::Cancelled]);
}

#[test]
fn time_point_past_the_end_uses_the_last_frame() {
    let Some(path) = fixture(sample_video_path()) else {
        return;
    };

    let (sink, receiver) = FrameSink::channel();
    let settings = ExtractionSettings::default();
    FfmpegFrameExtractor::new().extract(path, &[TimePoint::new(60, 1)], &settings, sink);

    let outcome = receiver.recv().unwrap();
    assert_eq!(outcome.status(), FrameStatus::Succeeded);
    assert!(outcome.actual_time().unwrap() < TimePoint::new(5, 1));
}

#[test]
fn rotated_video_is_displayed_upright() {
    let Some(path) = fixture(rotated_video_path()) else {
        return;
    };

    let metadata = MediaSource::probe(path).unwrap();
    assert!(matches!(metadata.rotation_degrees, 90 | 270));
    assert_eq!(metadata.display_size(), (metadata.height, metadata.width));

    let (sink, receiver) = FrameSink::channel();
    let settings = ExtractionSettings::default();
    FfmpegFrameExtractor::new().extract(path, &[TimePoint::ZERO], &settings, sink);
    let outcome = receiver.recv().unwrap();
    let image = outcome.image().unwrap();
    assert_eq!((image.width(), image.height()), metadata.display_size());
}

#[test]
fn offset_stream_reports_its_start_time() {
    let Some(path) = fixture(offset_video_path()) else {
        return;
    };

    let metadata = MediaSource::probe(path).unwrap();
    assert!(metadata.start_time.as_secs_f64() >= 1.9);
    assert!((metadata.duration.as_secs_f64() - 5.0).abs() < 0.2);
}

#[test]
fn offset_stream_time_points_are_relative_to_the_first_frame() {
    let Some(path) = fixture(offset_video_path()) else {
        return;
    };

    let extractor = FfmpegFrameExtractor::new();
    let duration = extractor.duration(path).unwrap();
    let points = sample_time_points(duration, 5).unwrap();
    let (sink, receiver) = FrameSink::channel();

    extractor.extract(path, &points, &ExtractionSettings::default(), sink);
    let outcomes: Vec<_> = receiver.iter().collect();

    assert_eq!(outcomes.len(), 5);
    for outcome in &outcomes {
        let requested = points[outcome.index].as_secs_f64();
        let actual = outcome.actual_time().unwrap().as_secs_f64();
        assert!(
            (actual - requested).abs() <= 1.0 / 30.0 + 0.011,
            "frame {} at {actual}s for {requested}s",
            outcome.index
        );
    }
}

#[test]
fn video_converts_to_gif() {
    let Some(path) = fixture(sample_video_path()) else {
        return;
    };

    let directory = tempfile::tempdir().unwrap();
    let options = GifOptions::new(5)
        .with_delay(0.25)
        .with_max_size(128, 0)
        .with_timeout(Duration::from_secs(60))
        .with_output_dir(directory.path());

    let output = Regift::new().create_gif(path, &options).unwrap();
    assert_eq!(output.frames_written, 5);

    let summary = read_gif(&output.path);
    assert_eq!(summary.frame_count(), 5);
    assert_eq!((summary.width, summary.height), (128, 72));
    assert!(summary.delays.iter().all(|&delay| delay == 25));
}

#[cfg(feature = "rayon")]
#[test]
fn parallel_extractor_matches_sequential_count() {
    let Some(path) = fixture(sample_video_path()) else {
        return;
    };

    let directory = tempfile::tempdir().unwrap();
    let options = GifOptions::new(12)
        .with_max_size(96, 96)
        .with_output_dir(directory.path());

    let regift = Regift::with_extractor(FfmpegFrameExtractor::parallel());
    assert!(regift.extractor().is_parallel());
    let output = regift.create_gif(path, &options).unwrap();
    assert_eq!(output.frames_written, 12);
    assert_eq!(read_gif(&output.path).frame_count(), 12);
}
