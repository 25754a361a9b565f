//! End-to-end generation tests against a scripted extractor.

mod common;

use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use common::{Delivery, ScriptedExtractor, Step, read_gif};
use image::DynamicImage;
use regift::{
    CancellationToken, GifOptions, ProgressInfo, Regift, RegiftError, SkipReason, TimePoint,
};

fn recorded_progress(options: GifOptions) -> (GifOptions, Arc<Mutex<Vec<ProgressInfo>>>) {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let callback = move |_: &DynamicImage, info: &ProgressInfo| {
        sink.lock().unwrap().push(info.clone());
    };
    (options.with_progress(Arc::new(callback)), seen)
}

// ── Happy path ─────────────────────────────────────────────────────

#[test]
fn all_frames_are_encoded_with_delay_and_loop_count() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("five.gif");
    let regift = Regift::with_extractor(ScriptedExtractor::new(10));
    let options = GifOptions::new(5)
        .with_delay(0.2)
        .with_loop_count(3)
        .with_output_path(&path);

    let output = regift.create_gif("clip.mp4", &options).unwrap();

    assert_eq!(output.path, path);
    assert_eq!(output.frames_requested, 5);
    assert_eq!(output.frames_written, 5);
    assert!(output.skipped.is_empty());
    assert!(!output.is_partial());

    let summary = read_gif(&path);
    assert_eq!(summary.frame_count(), 5);
    assert!(summary.delays.iter().all(|&delay| delay == 20));
    assert!(matches!(summary.repeat, gif::Repeat::Finite(3)));
    assert_eq!((summary.width, summary.height), (8, 6));
}

#[test]
fn zero_loop_count_loops_forever() {
    let directory = tempfile::tempdir().unwrap();
    let regift = Regift::with_extractor(ScriptedExtractor::new(2));
    let options = GifOptions::new(2).with_output_dir(directory.path());

    let output = regift.create_gif("clip.mp4", &options).unwrap();
    assert!(output.path.starts_with(directory.path()));
    assert!(matches!(read_gif(&output.path).repeat, gif::Repeat::Infinite));
}

#[test]
fn extractor_receives_evenly_spaced_time_points() {
    let regift = Regift::with_extractor(ScriptedExtractor::new(10));
    let directory = tempfile::tempdir().unwrap();
    let options = GifOptions::new(4).with_output_dir(directory.path());

    regift.create_gif("clip.mp4", &options).unwrap();

    let requests = regift.extractor().requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(
        requests[0],
        vec![
            TimePoint::new(0, 1),
            TimePoint::new(5, 2),
            TimePoint::new(5, 1),
            TimePoint::new(15, 2),
        ]
    );
}

#[test]
fn progress_is_monotonic_and_ends_at_one() {
    let directory = tempfile::tempdir().unwrap();
    let regift = Regift::with_extractor(ScriptedExtractor::new(8));
    let (options, seen) = recorded_progress(GifOptions::new(4).with_output_dir(directory.path()));

    regift.create_gif("clip.mp4", &options).unwrap();

    let seen = seen.lock().unwrap();
    let fractions: Vec<f64> = seen.iter().map(|info| info.fraction).collect();
    assert_eq!(fractions, vec![0.25, 0.5, 0.75, 1.0]);
    assert!(seen.windows(2).all(|pair| pair[0].time_point < pair[1].time_point));
    assert_eq!(seen.last().map(|info| info.completed), Some(4));
}

#[test]
fn canvas_takes_the_decoded_frame_size() {
    let directory = tempfile::tempdir().unwrap();
    let regift = Regift::with_extractor(ScriptedExtractor::new(3).with_frame_size(12, 10));
    let options = GifOptions::new(3).with_output_dir(directory.path());

    let output = regift.create_gif("clip.mp4", &options).unwrap();
    let summary = read_gif(&output.path);
    assert_eq!((summary.width, summary.height), (12, 10));
    assert_eq!(summary.frame_count(), 3);
}

// ── Ordering ───────────────────────────────────────────────────────

#[test]
fn reversed_delivery_is_appended_in_time_order() {
    let directory = tempfile::tempdir().unwrap();
    let regift =
        Regift::with_extractor(ScriptedExtractor::new(6).with_delivery(Delivery::Reversed));
    let (options, seen) = recorded_progress(GifOptions::new(6).with_output_dir(directory.path()));

    let output = regift.create_gif("clip.mp4", &options).unwrap();
    assert_eq!(output.frames_written, 6);

    let times: Vec<TimePoint> = seen.lock().unwrap().iter().map(|i| i.time_point).collect();
    let expected: Vec<TimePoint> = (0..6).map(|second| TimePoint::new(second, 1)).collect();
    assert_eq!(times, expected);
}

#[test]
fn delivery_from_many_threads_is_serialized() {
    let directory = tempfile::tempdir().unwrap();
    let regift =
        Regift::with_extractor(ScriptedExtractor::new(12).with_delivery(Delivery::Threads(4)));
    let (options, seen) = recorded_progress(GifOptions::new(12).with_output_dir(directory.path()));

    let output = regift.create_gif("clip.mp4", &options).unwrap();
    assert_eq!(output.frames_written, 12);

    let seen = seen.lock().unwrap();
    assert_eq!(seen.len(), 12);
    assert!(seen.windows(2).all(|pair| pair[0].time_point < pair[1].time_point));
    assert_eq!(read_gif(&output.path).frame_count(), 12);
}

#[test]
fn duplicate_outcomes_are_ignored() {
    let directory = tempfile::tempdir().unwrap();
    let regift = Regift::with_extractor(ScriptedExtractor::new(4).duplicating());
    let options = GifOptions::new(4).with_output_dir(directory.path());

    let output = regift.create_gif("clip.mp4", &options).unwrap();
    assert_eq!(output.frames_written, 4);
    assert_eq!(read_gif(&output.path).frame_count(), 4);
}

// ── Explicit time points ───────────────────────────────────────────

#[test]
fn explicit_time_points_are_used_verbatim() {
    let directory = tempfile::tempdir().unwrap();
    let regift = Regift::with_extractor(ScriptedExtractor::new(10));
    let points = [
        TimePoint::new(0, 1),
        TimePoint::new(3, 2),
        TimePoint::new(7, 1),
    ];
    let options = GifOptions::new(99).with_output_dir(directory.path());

    let output = regift
        .create_gif_for_time_points("clip.mp4", &points, &options)
        .unwrap();

    assert_eq!(output.frames_requested, 3);
    assert_eq!(regift.extractor().requests(), vec![points.to_vec()]);
}

#[test]
fn explicit_time_points_must_increase() {
    let regift = Regift::with_extractor(ScriptedExtractor::new(10));
    let options = GifOptions::new(2);

    let unordered = [TimePoint::new(2, 1), TimePoint::new(1, 1)];
    let result = regift.create_gif_for_time_points("clip.mp4", &unordered, &options);
    assert!(matches!(result, Err(RegiftError::InvalidTimePoints(_))));

    let result = regift.create_gif_for_time_points("clip.mp4", &[], &options);
    assert!(matches!(result, Err(RegiftError::InvalidTimePoints(_))));
    assert!(regift.extractor().requests().is_empty());
}

// ── Concurrency ────────────────────────────────────────────────────

#[test]
fn concurrent_requests_write_distinct_files() {
    let directory = tempfile::tempdir().unwrap();
    let regift = Regift::with_extractor(ScriptedExtractor::new(4));

    let paths: Vec<_> = thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let regift = regift.clone();
                let options = GifOptions::new(3).with_output_dir(directory.path());
                scope.spawn(move || regift.create_gif("clip.mp4", &options).unwrap().into_path())
            })
            .collect();
        handles.into_iter().map(|handle| handle.join().unwrap()).collect()
    });

    for (index, path) in paths.iter().enumerate() {
        assert!(path.exists());
        assert!(paths[index + 1..].iter().all(|other| other != path));
        assert_eq!(read_gif(path).frame_count(), 3);
    }
}

// ── Cancellation ───────────────────────────────────────────────────

#[test]
fn cancelled_point_is_skipped_without_failing() {
    let directory = tempfile::tempdir().unwrap();
    let regift = Regift::with_extractor(ScriptedExtractor::new(5).with_step(1, Step::Cancel));
    let options = GifOptions::new(5).with_output_dir(directory.path());

    let output = regift.create_gif("clip.mp4", &options).unwrap();
    assert_eq!(output.frames_written, 4);
    assert_eq!(output.skipped.len(), 1);
    assert_eq!(output.skipped[0].index, 1);
    assert_eq!(output.skipped[0].reason, SkipReason::Cancelled);
}

#[test]
fn cancelling_mid_run_removes_the_file() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("cancelled.gif");
    let token = CancellationToken::new();
    let canceller = token.clone();
    let callback = move |_: &DynamicImage, _: &ProgressInfo| canceller.cancel();

    let regift = Regift::with_extractor(ScriptedExtractor::new(5));
    let options = GifOptions::new(5)
        .with_output_path(&path)
        .with_cancellation(token)
        .with_progress(Arc::new(callback));

    let result = regift.create_gif("clip.mp4", &options);
    assert!(matches!(result, Err(RegiftError::Cancelled)));
    assert!(!path.exists());
}

#[test]
fn cancelled_before_start_reports_cancelled() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("never.gif");
    let token = CancellationToken::new();
    token.cancel();

    let regift = Regift::with_extractor(ScriptedExtractor::new(5));
    let options = GifOptions::new(3)
        .with_output_path(&path)
        .with_cancellation(token);

    assert!(matches!(
        regift.create_gif("clip.mp4", &options),
        Err(RegiftError::Cancelled)
    ));
    assert!(!path.exists());
}

// ── Timeout ────────────────────────────────────────────────────────

#[test]
fn stalled_extractor_times_out_without_cancelling_the_caller_token() {
    let directory = tempfile::tempdir().unwrap();
    let path = directory.path().join("slow.gif");
    let token = CancellationToken::new();

    let regift =
        Regift::with_extractor(ScriptedExtractor::new(5).with_stall(Duration::from_secs(3)));
    let options = GifOptions::new(3)
        .with_output_path(&path)
        .with_timeout(Duration::from_millis(50))
        .with_cancellation(token.clone());

    let result = regift.create_gif("clip.mp4", &options);
    assert!(matches!(
        result,
        Err(RegiftError::Timeout(timeout)) if timeout == Duration::from_millis(50)
    ));
    assert!(!token.is_cancelled());
    assert!(!path.exists());
}
