//! Async GIF generation.
//!
//! [`GifFuture`] runs a blocking generation on Tokio's blocking pool so that
//! CPU-heavy decoding and quantization never stall the async runtime.
//!
//! # Example
//!
//! ```no_run
//! use regift::{GifOptions, Regift, RegiftError};
//!
//! # async fn example() -> Result<(), RegiftError> {
//! let output = Regift::new()
//!     .create_gif_async("input.mp4", GifOptions::new(20))
//!     .await?;
//! println!("{}", output.path.display());
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use tokio::task::JoinHandle;

use crate::configuration::GifOptions;
use crate::error::RegiftError;
use crate::output::GifOutput;
use crate::progress::CancellationToken;

/// A GIF being generated on a blocking thread.
///
/// Dropping the future does not stop the work; call
/// [`cancel`](GifFuture::cancel) first.
pub struct GifFuture {
    handle: JoinHandle<Result<GifOutput, RegiftError>>,
    token: CancellationToken,
}

impl GifFuture {
    /// Request cancellation. The future then resolves to
    /// [`RegiftError::Cancelled`].
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// The token that cancels this generation.
    pub fn cancellation_token(&self) -> &CancellationToken {
        &self.token
    }
}

impl Future for GifFuture {
    type Output = Result<GifOutput, RegiftError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.handle).poll(cx).map(|result| {
            result.unwrap_or_else(|error| Err(RegiftError::TaskFailed(error.to_string())))
        })
    }
}

pub(crate) fn create_gif_future<G>(options: GifOptions, generate: G) -> GifFuture
where
    G: FnOnce(&GifOptions) -> Result<GifOutput, RegiftError> + Send + 'static,
{
    let token = options.cancellation.clone().unwrap_or_default();
    let options = options.with_cancellation(token.clone());

    let handle = tokio::task::spawn_blocking(move || generate(&options));

    GifFuture { handle, token }
}
