//! The GIF generation pipeline.
//!
//! [`Regift`] wires the sampler, a [`FrameExtractor`] and the [`GifMuxer`]
//! together. The extractor runs on its own thread and may deliver decoded
//! frames in any order; the orchestrator owns the muxer, consumes outcomes
//! one at a time from the extractor's channel, and appends them strictly in
//! time-point order.
//!
//! # Example
//!
//! ```no_run
//! use regift::{GifOptions, Regift, RegiftError};
//!
//! let output = Regift::new().create_gif("input.mp4", &GifOptions::new(24).with_delay(0.08))?;
//! println!("wrote {} frames to {}", output.frames_written, output.path.display());
//! # Ok::<(), RegiftError>(())
//! ```

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::thread::{self, JoinHandle};

use crate::configuration::{GifOptions, LastFramePolicy};
use crate::decode::FfmpegFrameExtractor;
use crate::error::{RegiftError, describe};
use crate::extractor::{ExtractionSettings, FrameExtractor, FrameOutcome, FrameResult, FrameSink};
use crate::muxer::GifMuxer;
use crate::output::{GifOutput, SkipReason, SkippedFrame};
use crate::progress::{CancellationToken, ProgressTracker};
use crate::time_point::{TimePoint, sample_time_points, validate_time_points};

/// Lifecycle of one generation request, logged at debug level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum GenerationState {
    Idle,
    Sampling,
    Extracting,
    Finalizing,
    Completed,
    Failed,
}

impl GenerationState {
    fn advance(&mut self, next: GenerationState) {
        log::debug!("Generation state: {:?} -> {:?}", self, next);
        *self = next;
    }
}

/// Creates animated GIFs from videos.
///
/// Generic over the [`FrameExtractor`] so decoding can be swapped out; the
/// default decodes with FFmpeg. `Regift` is cheap to clone and can serve any
/// number of concurrent requests: each request gets its own extraction
/// thread, channel, muxer and output file.
pub struct Regift<E: FrameExtractor = FfmpegFrameExtractor> {
    extractor: Arc<E>,
}

impl<E: FrameExtractor> Clone for Regift<E> {
    fn clone(&self) -> Self {
        Self {
            extractor: Arc::clone(&self.extractor),
        }
    }
}

impl Regift<FfmpegFrameExtractor> {
    /// A pipeline backed by the sequential FFmpeg extractor.
    pub fn new() -> Self {
        Self::with_extractor(FfmpegFrameExtractor::new())
    }
}

impl Default for Regift<FfmpegFrameExtractor> {
    fn default() -> Self {
        Self::new()
    }
}

impl<E: FrameExtractor + 'static> Regift<E> {
    /// A pipeline backed by a custom extractor.
    pub fn with_extractor(extractor: E) -> Self {
        Self {
            extractor: Arc::new(extractor),
        }
    }

    /// The extractor in use.
    pub fn extractor(&self) -> &E {
        &self.extractor
    }

    /// Sample `options.frame_count()` evenly spaced frames from `source` and
    /// encode them as a GIF. Blocks until the file is finalized.
    ///
    /// # Errors
    ///
    /// - Sampling errors ([`RegiftError::InvalidFrameCount`],
    ///   [`RegiftError::InvalidDuration`], [`RegiftError::InvalidDelay`])
    ///   before any decode is attempted.
    /// - [`RegiftError::FileOpen`] / [`RegiftError::NoVideoStream`] if the
    ///   source cannot be probed.
    /// - [`RegiftError::LastFrameFailed`] under
    ///   [`LastFramePolicy::Strict`].
    /// - [`RegiftError::Cancelled`], [`RegiftError::Timeout`], or an encode
    ///   error. No file is left behind on any error.
    pub fn create_gif(&self, source: &str, options: &GifOptions) -> Result<GifOutput, RegiftError> {
        let mut state = GenerationState::Idle;
        options.validate()?;

        state.advance(GenerationState::Sampling);
        let duration = self.extractor.duration(source)?;
        let time_points = sample_time_points(duration, options.frame_count)?;
        log::debug!(
            "Sampled {} time point(s) over {} of {}",
            time_points.len(),
            duration,
            source
        );

        self.run(source, &time_points, options, state)
    }

    /// Encode the frames at exactly `time_points`. The options' frame count
    /// is ignored; one frame is requested per point.
    ///
    /// # Errors
    ///
    /// [`RegiftError::InvalidTimePoints`] if `time_points` is empty, starts
    /// before zero, or is not strictly increasing. Otherwise as
    /// [`create_gif`](Regift::create_gif).
    pub fn create_gif_for_time_points(
        &self,
        source: &str,
        time_points: &[TimePoint],
        options: &GifOptions,
    ) -> Result<GifOutput, RegiftError> {
        validate_time_points(time_points)?;
        options.validate_delay()?;
        self.run(source, time_points, options, GenerationState::Idle)
    }

    /// Run [`create_gif`](Regift::create_gif) on a background thread and
    /// hand the result to `on_complete`, which is called exactly once.
    ///
    /// The returned [`GenerationTask`] can cancel or join the request. If
    /// `options` carries no cancellation token one is attached.
    ///
    /// # Errors
    ///
    /// [`RegiftError::Io`] if the background thread cannot be spawned. Every
    /// other failure goes to `on_complete`.
    pub fn create_gif_with_callback<F>(
        &self,
        source: impl Into<String>,
        options: GifOptions,
        on_complete: F,
    ) -> Result<GenerationTask, RegiftError>
    where
        F: FnOnce(Result<GifOutput, RegiftError>) + Send + 'static,
    {
        let source = source.into();
        let regift = self.clone();
        spawn_task(options, on_complete, move |options| {
            regift.create_gif(&source, options)
        })
    }

    /// Background counterpart of
    /// [`create_gif_for_time_points`](Regift::create_gif_for_time_points).
    /// Invalid time points are reported through `on_complete`.
    ///
    /// # Errors
    ///
    /// [`RegiftError::Io`] if the background thread cannot be spawned.
    pub fn create_gif_for_time_points_with_callback<F>(
        &self,
        source: impl Into<String>,
        time_points: Vec<TimePoint>,
        options: GifOptions,
        on_complete: F,
    ) -> Result<GenerationTask, RegiftError>
    where
        F: FnOnce(Result<GifOutput, RegiftError>) + Send + 'static,
    {
        let source = source.into();
        let regift = self.clone();
        spawn_task(options, on_complete, move |options| {
            regift.create_gif_for_time_points(&source, &time_points, options)
        })
    }

    /// Run [`create_gif`](Regift::create_gif) on a Tokio blocking thread.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(feature = "async")]
    pub fn create_gif_async(
        &self,
        source: impl Into<String>,
        options: GifOptions,
    ) -> crate::future::GifFuture {
        let source = source.into();
        let regift = self.clone();
        crate::future::create_gif_future(options, move |options| {
            regift.create_gif(&source, options)
        })
    }

    /// Run [`create_gif_for_time_points`](Regift::create_gif_for_time_points)
    /// on a Tokio blocking thread.
    ///
    /// Must be called from within a Tokio runtime.
    #[cfg(feature = "async")]
    pub fn create_gif_for_time_points_async(
        &self,
        source: impl Into<String>,
        time_points: Vec<TimePoint>,
        options: GifOptions,
    ) -> crate::future::GifFuture {
        let source = source.into();
        let regift = self.clone();
        crate::future::create_gif_future(options, move |options| {
            regift.create_gif_for_time_points(&source, &time_points, options)
        })
    }

    fn run(
        &self,
        source: &str,
        time_points: &[TimePoint],
        options: &GifOptions,
        mut state: GenerationState,
    ) -> Result<GifOutput, RegiftError> {
        let result = self.assemble(source, time_points, options, &mut state);
        if let Err(error) = &result {
            log::debug!("Generation of {source} failed: {error}");
            state.advance(GenerationState::Failed);
        }
        result
    }

    fn assemble(
        &self,
        source: &str,
        time_points: &[TimePoint],
        options: &GifOptions,
        state: &mut GenerationState,
    ) -> Result<GifOutput, RegiftError> {
        let requested = u32::try_from(time_points.len()).map_err(|_| {
            RegiftError::InvalidTimePoints(format!("too many time points: {}", time_points.len()))
        })?;

        let path = options.output.resolve();
        let muxer = GifMuxer::open(&path, requested, options.loop_count)?
            .with_speed(options.quantizer_speed);

        let token = options
            .cancellation
            .as_ref()
            .map(CancellationToken::child_token)
            .unwrap_or_default();
        let settings = ExtractionSettings {
            tolerance: options.tolerance,
            max_size: options.max_size,
            cancellation: token.clone(),
        };

        state.advance(GenerationState::Extracting);
        let receiver = self.spawn_extraction(source, time_points, settings)?;

        let mut assembler = FrameAssembler::new(muxer, time_points, options);
        while !assembler.is_complete() {
            match receiver.recv_timeout(options.timeout) {
                Ok(outcome) => assembler.accept(outcome)?,
                Err(RecvTimeoutError::Timeout) => {
                    log::warn!(
                        "No decoded frame from {source} within {:?}; giving up",
                        options.timeout
                    );
                    token.cancel();
                    return Err(RegiftError::Timeout(options.timeout));
                }
                Err(RecvTimeoutError::Disconnected) => {
                    log::debug!("Extractor finished without delivering every frame");
                    assembler.fail_missing()?;
                }
            }
        }
        drop(receiver);

        state.advance(GenerationState::Finalizing);
        let output = assembler.finish(&token)?;
        state.advance(GenerationState::Completed);

        log::info!(
            "Created GIF {} ({}/{} frames)",
            output.path.display(),
            output.frames_written,
            output.frames_requested,
        );
        Ok(output)
    }

    /// Start the extractor on its own thread. The thread is detached: once
    /// the receiver is dropped its sink stops accepting outcomes and it winds
    /// down on its own.
    fn spawn_extraction(
        &self,
        source: &str,
        time_points: &[TimePoint],
        settings: ExtractionSettings,
    ) -> Result<Receiver<FrameOutcome>, RegiftError> {
        let (sink, receiver) = FrameSink::channel();
        let extractor = Arc::clone(&self.extractor);
        let source = source.to_string();
        let time_points = time_points.to_vec();

        thread::Builder::new()
            .name("regift-extractor".to_string())
            .spawn(move || extractor.extract(&source, &time_points, &settings, sink))?;

        Ok(receiver)
    }
}

/// Run `generate` on a named background thread and pass its result to
/// `on_complete`.
fn spawn_task<G, F>(
    options: GifOptions,
    on_complete: F,
    generate: G,
) -> Result<GenerationTask, RegiftError>
where
    G: FnOnce(&GifOptions) -> Result<GifOutput, RegiftError> + Send + 'static,
    F: FnOnce(Result<GifOutput, RegiftError>) + Send + 'static,
{
    let token = options.cancellation.clone().unwrap_or_default();
    let options = options.with_cancellation(token.clone());

    let handle = thread::Builder::new()
        .name("regift-generation".to_string())
        .spawn(move || on_complete(generate(&options)))?;

    Ok(GenerationTask { handle, token })
}

/// Handle to a generation started with
/// [`create_gif_with_callback`](Regift::create_gif_with_callback) or
/// [`create_gif_for_time_points_with_callback`](Regift::create_gif_for_time_points_with_callback).
#[derive(Debug)]
pub struct GenerationTask {
    handle: JoinHandle<()>,
    token: CancellationToken,
}

impl GenerationTask {
    /// Request cancellation. The completion callback still runs, with
    /// [`RegiftError::Cancelled`] unless the GIF was already finished.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The token that cancels this task.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns `true` once the completion callback has returned.
    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Wait for the completion callback to return.
    ///
    /// # Errors
    ///
    /// [`RegiftError::TaskFailed`] if the generation or the callback panicked.
    pub fn join(self) -> Result<(), RegiftError> {
        self.handle.join().map_err(|panic| {
            let message = panic
                .downcast_ref::<&str>()
                .map(|message| message.to_string())
                .or_else(|| panic.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "generation thread panicked".to_string());
            RegiftError::TaskFailed(message)
        })
    }
}

/// Reorders outcomes and feeds them to the muxer in time-point order.
struct FrameAssembler<'a> {
    time_points: &'a [TimePoint],
    pending: BTreeMap<usize, FrameOutcome>,
    next_index: usize,
    muxer: GifMuxer,
    delay: f32,
    policy: LastFramePolicy,
    progress: ProgressTracker,
    skipped: Vec<SkippedFrame>,
}

impl<'a> FrameAssembler<'a> {
    fn new(muxer: GifMuxer, time_points: &'a [TimePoint], options: &GifOptions) -> Self {
        Self {
            time_points,
            pending: BTreeMap::new(),
            next_index: 0,
            muxer,
            delay: options.delay,
            policy: options.last_frame_policy,
            progress: ProgressTracker::new(Arc::clone(&options.progress), time_points.len() as u32),
            skipped: Vec::new(),
        }
    }

    fn is_complete(&self) -> bool {
        self.next_index >= self.time_points.len()
    }

    fn last_index(&self) -> usize {
        self.time_points.len().saturating_sub(1)
    }

    /// Take one outcome in any order and process everything that is now
    /// contiguous.
    fn accept(&mut self, outcome: FrameOutcome) -> Result<(), RegiftError> {
        let index = outcome.index;
        if index >= self.time_points.len()
            || index < self.next_index
            || self.pending.contains_key(&index)
        {
            log::debug!("Ignoring unexpected or duplicate outcome for index {index}");
            return Ok(());
        }

        if self.policy == LastFramePolicy::Strict
            && index == self.last_index()
            && let FrameResult::Failed(error) = &outcome.result
        {
            return Err(RegiftError::LastFrameFailed {
                time_point: self.time_points[index],
                reason: describe(error),
            });
        }

        self.pending.insert(index, outcome);
        while let Some(outcome) = self.pending.remove(&self.next_index) {
            self.process(outcome)?;
            self.next_index += 1;
        }
        Ok(())
    }

    fn process(&mut self, outcome: FrameOutcome) -> Result<(), RegiftError> {
        let time_point = self.time_points[outcome.index];
        match outcome.result {
            FrameResult::Succeeded { image, actual_time } => {
                log::trace!(
                    "Appending frame {} (requested {time_point}, got {actual_time})",
                    outcome.index
                );
                self.muxer.append_frame(&image, self.delay)?;
                self.progress.advance(&image, time_point);
            }
            FrameResult::Failed(error) => {
                log::warn!("Skipping frame at {time_point}: {error}");
                self.skipped.push(SkippedFrame {
                    index: outcome.index,
                    time_point,
                    reason: SkipReason::Failed(describe(&error)),
                });
            }
            FrameResult::Cancelled => {
                self.skipped.push(SkippedFrame {
                    index: outcome.index,
                    time_point,
                    reason: SkipReason::Cancelled,
                });
            }
        }
        Ok(())
    }

    /// The extractor hung up early: treat every point it never reported as a
    /// failed decode.
    fn fail_missing(&mut self) -> Result<(), RegiftError> {
        let missing: Vec<usize> = (self.next_index..self.time_points.len())
            .filter(|index| !self.pending.contains_key(index))
            .collect();

        for index in missing {
            let time_point = self.time_points[index];
            let error = RegiftError::VideoDecode {
                time_point,
                reason: "extractor stopped before delivering this frame".to_string(),
            };
            self.accept(FrameOutcome::failed(index, time_point, error))?;
        }
        Ok(())
    }

    fn finish(self, token: &CancellationToken) -> Result<GifOutput, RegiftError> {
        if token.is_cancelled() {
            log::info!(
                "GIF generation cancelled after {} frame(s)",
                self.progress.completed()
            );
            self.muxer.abandon();
            return Err(RegiftError::Cancelled);
        }

        let frames_written = self.muxer.frames_written();
        let path = self.muxer.finalize()?;
        Ok(GifOutput {
            path,
            frames_requested: self.time_points.len() as u32,
            frames_written,
            skipped: self.skipped,
        })
    }
}
