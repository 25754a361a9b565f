//! Shared helpers for integration tests: a scripted in-memory extractor and
//! a GIF reader.

#![allow(dead_code)]

use std::collections::HashMap;
use std::fs::File;
use std::path::Path;
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

use image::{DynamicImage, Rgba, RgbaImage};
use regift::{
    ExtractionSettings, FrameExtractor, FrameOutcome, FrameSink, RegiftError, TimePoint,
};

/// What the scripted extractor does for one time point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Deliver a solid frame.
    Frame,
    /// Deliver a decode failure.
    Fail,
    /// Deliver a cancellation.
    Cancel,
    /// Deliver nothing.
    Missing,
}

/// Order in which outcomes are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    InOrder,
    Reversed,
    /// Round-robin across this many threads.
    Threads(usize),
}

/// An extractor that follows a script instead of decoding video.
pub struct ScriptedExtractor {
    duration: Option<TimePoint>,
    steps: HashMap<usize, Step>,
    delivery: Delivery,
    stall: Option<Duration>,
    wait_for_cancel: bool,
    duplicate: bool,
    frame_size: (u32, u32),
    requests: Mutex<Vec<Vec<TimePoint>>>,
}

impl ScriptedExtractor {
    /// Every time point succeeds; the video lasts `seconds`.
    pub fn new(seconds: i64) -> Self {
        Self {
            duration: Some(TimePoint::new(seconds, 1)),
            steps: HashMap::new(),
            delivery: Delivery::InOrder,
            stall: None,
            wait_for_cancel: false,
            duplicate: false,
            frame_size: (8, 6),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// `duration` reports an unreadable source.
    pub fn without_video() -> Self {
        let mut extractor = Self::new(1);
        extractor.duration = None;
        extractor
    }

    pub fn with_duration(mut self, duration: TimePoint) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_step(mut self, index: usize, step: Step) -> Self {
        self.steps.insert(index, step);
        self
    }

    pub fn with_delivery(mut self, delivery: Delivery) -> Self {
        self.delivery = delivery;
        self
    }

    /// Sleep before delivering anything.
    pub fn with_stall(mut self, stall: Duration) -> Self {
        self.stall = Some(stall);
        self
    }

    /// Block until the request is cancelled, then report every point as
    /// cancelled.
    pub fn waiting_for_cancel(mut self) -> Self {
        self.wait_for_cancel = true;
        self
    }

    /// Deliver every outcome twice.
    pub fn duplicating(mut self) -> Self {
        self.duplicate = true;
        self
    }

    pub fn with_frame_size(mut self, width: u32, height: u32) -> Self {
        self.frame_size = (width, height);
        self
    }

    /// Time points of every `extract` call so far.
    pub fn requests(&self) -> Vec<Vec<TimePoint>> {
        self.requests.lock().unwrap().clone()
    }

    fn outcome(&self, index: usize, time_point: TimePoint) -> Option<FrameOutcome> {
        match self.steps.get(&index).copied().unwrap_or(Step::Frame) {
            Step::Frame => Some(FrameOutcome::succeeded(
                index,
                time_point,
                solid_frame(self.frame_size, index),
                time_point,
            )),
            Step::Fail => Some(FrameOutcome::failed(
                index,
                time_point,
                RegiftError::VideoDecode {
                    time_point,
                    reason: "scripted failure".to_string(),
                },
            )),
            Step::Cancel => Some(FrameOutcome::cancelled(index, time_point)),
            Step::Missing => None,
        }
    }

    fn send(&self, sink: &FrameSink, index: usize, time_point: TimePoint) {
        if let Some(outcome) = self.outcome(index, time_point) {
            sink.deliver(outcome);
            if self.duplicate {
                if let Some(again) = self.outcome(index, time_point) {
                    sink.deliver(again);
                }
            }
        }
    }
}

impl FrameExtractor for ScriptedExtractor {
    fn extract(
        &self,
        _source: &str,
        time_points: &[TimePoint],
        settings: &ExtractionSettings,
        sink: FrameSink,
    ) {
        self.requests.lock().unwrap().push(time_points.to_vec());

        if let Some(stall) = self.stall {
            thread::sleep(stall);
        }

        if self.wait_for_cancel {
            let deadline = Instant::now() + Duration::from_secs(10);
            while !settings.is_cancelled() && Instant::now() < deadline {
                thread::sleep(Duration::from_millis(5));
            }
        }

        let points: Vec<(usize, TimePoint)> = time_points.iter().copied().enumerate().collect();
        if settings.is_cancelled() {
            sink.cancel_remaining(points);
            return;
        }

        match self.delivery {
            Delivery::InOrder => {
                for (index, time_point) in points {
                    self.send(&sink, index, time_point);
                }
            }
            Delivery::Reversed => {
                for (index, time_point) in points.into_iter().rev() {
                    self.send(&sink, index, time_point);
                }
            }
            Delivery::Threads(count) => {
                let count = count.max(1);
                thread::scope(|scope| {
                    for worker in 0..count {
                        let sink = sink.clone();
                        let points = &points;
                        scope.spawn(move || {
                            for &(index, time_point) in
                                points.iter().skip(worker).step_by(count)
                            {
                                self.send(&sink, index, time_point);
                            }
                        });
                    }
                });
            }
        }
    }

    fn duration(&self, _source: &str) -> Result<TimePoint, RegiftError> {
        self.duration.ok_or(RegiftError::NoVideoStream)
    }
}

/// A solid frame whose shade depends on its index.
pub fn solid_frame((width, height): (u32, u32), index: usize) -> DynamicImage {
    let shade = (index as u8).wrapping_mul(40);
    DynamicImage::ImageRgba8(RgbaImage::from_pixel(
        width,
        height,
        Rgba([shade, 255 - shade, 128, 255]),
    ))
}

/// What a GIF file on disk contains.
#[derive(Debug)]
pub struct GifSummary {
    pub width: u16,
    pub height: u16,
    pub delays: Vec<u16>,
    pub repeat: gif::Repeat,
}

impl GifSummary {
    pub fn frame_count(&self) -> usize {
        self.delays.len()
    }
}

/// Decode a GIF and summarise it.
pub fn read_gif(path: &Path) -> GifSummary {
    let file = File::open(path).unwrap();
    let mut options = gif::DecodeOptions::new();
    options.set_color_output(gif::ColorOutput::RGBA);
    let mut decoder = options.read_info(file).unwrap();

    let mut delays = Vec::new();
    while let Some(frame) = decoder.read_next_frame().unwrap() {
        delays.push(frame.delay);
    }

    GifSummary {
        width: decoder.width(),
        height: decoder.height(),
        delays,
        repeat: decoder.repeat(),
    }
}
