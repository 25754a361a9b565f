//! Incremental animated-GIF writer.
//!
//! [`GifMuxer`] creates the output file up front, appends frames one at a
//! time as they arrive, and writes the trailer exactly once in
//! [`finalize`](GifMuxer::finalize). A muxer that is dropped without being
//! finalized deletes its partial file, so a failed generation never leaves
//! a truncated GIF behind.
//!
//! # Example
//!
//! ```no_run
//! use image::DynamicImage;
//! use regift::{GifMuxer, RegiftError};
//!
//! let mut muxer = GifMuxer::open("out.gif", 2, 0)?;
//! muxer.append_frame(&DynamicImage::new_rgba8(64, 64), 0.1)?;
//! muxer.append_frame(&DynamicImage::new_rgba8(64, 64), 0.1)?;
//! let path = muxer.finalize()?;
//! # Ok::<(), RegiftError>(())
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use gif::{Encoder, Frame, Repeat};
use image::{DynamicImage, imageops::FilterType};

use crate::configuration::DEFAULT_QUANTIZER_SPEED;
use crate::error::RegiftError;

/// Convert a delay in seconds to GIF hundredths of a second.
pub fn delay_to_hundredths(seconds: f32) -> u16 {
    (seconds * 100.0).round().clamp(0.0, u16::MAX as f32) as u16
}

/// Map a loop count to the GIF repeat extension. `0` loops forever.
pub fn repeat_for_loop_count(loop_count: u16) -> Repeat {
    match loop_count {
        0 => Repeat::Infinite,
        n => Repeat::Finite(n),
    }
}

/// Writes an animated GIF one frame at a time.
pub struct GifMuxer {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    encoder: Option<Encoder<BufWriter<File>>>,
    canvas: Option<(u16, u16)>,
    frame_capacity: u32,
    frames_written: u32,
    repeat: Repeat,
    speed: i32,
    finished: bool,
}

impl GifMuxer {
    /// Create the output file for a GIF of at most `frame_count` frames.
    ///
    /// The canvas size is taken from the first appended frame.
    ///
    /// # Errors
    ///
    /// [`RegiftError::Io`] if the file cannot be created.
    pub fn open<P: AsRef<Path>>(
        path: P,
        frame_count: u32,
        loop_count: u16,
    ) -> Result<Self, RegiftError> {
        let path = path.as_ref().to_path_buf();
        let file = File::create(&path)?;

        log::debug!(
            "Opened GIF output {} (frames<={}, loop_count={})",
            path.display(),
            frame_count,
            loop_count,
        );

        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            encoder: None,
            canvas: None,
            frame_capacity: frame_count,
            frames_written: 0,
            repeat: repeat_for_loop_count(loop_count),
            speed: DEFAULT_QUANTIZER_SPEED,
            finished: false,
        })
    }

    /// Set the quantizer speed (1 = best quality, 30 = fastest).
    #[must_use]
    pub fn with_speed(mut self, speed: i32) -> Self {
        self.speed = speed.clamp(1, 30);
        self
    }

    /// Append one frame shown for `delay` seconds.
    ///
    /// Frames whose size differs from the first frame are resized to the
    /// canvas.
    ///
    /// # Errors
    ///
    /// - [`RegiftError::GifEncode`] if more than `frame_count` frames are
    ///   appended, the first frame is larger than 65535 pixels on a side, or
    ///   the encoder rejects the frame.
    /// - [`RegiftError::Io`] on write failure.
    pub fn append_frame(&mut self, image: &DynamicImage, delay: f32) -> Result<(), RegiftError> {
        if self.frames_written >= self.frame_capacity {
            return Err(RegiftError::GifEncode(format!(
                "frame capacity of {} exceeded",
                self.frame_capacity
            )));
        }

        let (width, height) = match self.canvas {
            Some(canvas) => canvas,
            None => self.start_encoder(image.width(), image.height())?,
        };

        let rgba = if image.width() == width as u32 && image.height() == height as u32 {
            image.to_rgba8()
        } else {
            log::debug!(
                "Resizing {}x{} frame to {}x{} canvas",
                image.width(),
                image.height(),
                width,
                height,
            );
            image
                .resize_exact(width as u32, height as u32, FilterType::Triangle)
                .to_rgba8()
        };
        let mut pixels = rgba.into_raw();

        let mut frame = Frame::from_rgba_speed(width, height, &mut pixels, self.speed);
        frame.delay = delay_to_hundredths(delay);

        let encoder = self
            .encoder
            .as_mut()
            .ok_or_else(|| RegiftError::GifEncode("encoder was not initialised".to_string()))?;
        encoder.write_frame(&frame)?;
        self.frames_written += 1;
        Ok(())
    }

    fn start_encoder(&mut self, width: u32, height: u32) -> Result<(u16, u16), RegiftError> {
        let too_large = || {
            RegiftError::GifEncode(format!(
                "frame of {width}x{height} exceeds the GIF size limit"
            ))
        };
        let canvas_width = u16::try_from(width).map_err(|_| too_large())?;
        let canvas_height = u16::try_from(height).map_err(|_| too_large())?;

        let writer = self
            .writer
            .take()
            .ok_or_else(|| RegiftError::GifEncode("output writer already consumed".to_string()))?;

        let mut encoder = Encoder::new(writer, canvas_width, canvas_height, &[])?;
        encoder.set_repeat(self.repeat)?;

        log::debug!(
            "Started GIF encoder {}x{} (repeat={:?}, speed={})",
            canvas_width,
            canvas_height,
            self.repeat,
            self.speed,
        );

        self.encoder = Some(encoder);
        self.canvas = Some((canvas_width, canvas_height));
        Ok((canvas_width, canvas_height))
    }

    /// Write the trailer, flush and close the file.
    ///
    /// # Errors
    ///
    /// - [`RegiftError::NoFramesWritten`] if no frame was appended.
    /// - [`RegiftError::Io`] if flushing or syncing fails.
    ///
    /// The output file is removed on error.
    pub fn finalize(mut self) -> Result<PathBuf, RegiftError> {
        let encoder = self.encoder.take().ok_or(RegiftError::NoFramesWritten)?;

        let mut writer = encoder.into_inner()?;
        writer.flush()?;
        let file = writer.into_inner().map_err(|error| error.into_error())?;
        file.sync_all()?;

        self.finished = true;
        log::debug!(
            "Finalized GIF {} with {} frame(s)",
            self.path.display(),
            self.frames_written,
        );
        Ok(self.path.clone())
    }

    /// Discard the output without finalizing. The partial file is removed.
    pub fn abandon(self) {
        log::debug!("Abandoning GIF output {}", self.path.display());
    }

    /// Frames appended so far.
    pub fn frames_written(&self) -> u32 {
        self.frames_written
    }

    /// Canvas size, once the first frame has been appended.
    pub fn canvas_size(&self) -> Option<(u16, u16)> {
        self.canvas
    }

    /// Output path.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for GifMuxer {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.encoder = None;
        self.writer = None;
        if let Err(error) = std::fs::remove_file(&self.path) {
            log::debug!(
                "Could not remove unfinished GIF {}: {error}",
                self.path.display()
            );
        }
    }
}
