//! Async utilities for cancellation-aware futures and owned timers.
//!
//! Provides the `OrCancelExt` trait for racing a future against a
//! `CancellationToken`, and [`RepeatingTask`], a periodic job whose lifetime
//! is tied to the handle that spawned it.

mod repeating;

pub use repeating::{RepeatingTask, TickFlow};

use async_trait::async_trait;
use std::future::Future;
use tokio_util::sync::CancellationToken;

/// Error returned when a future is cancelled.
#[derive(Debug, PartialEq, Eq)]
pub enum CancelErr {
    Cancelled,
}

/// Extension trait for making futures cancellable.
///
/// Cancellation wins ties: if the token is already cancelled when the race
/// starts, the wrapped future is never polled.
#[async_trait]
pub trait OrCancelExt: Sized {
    type Output;

    /// Race this future against the cancellation token.
    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr>;
}

#[async_trait]
impl<F> OrCancelExt for F
where
    F: Future + Send,
    F::Output: Send,
{
    type Output = F::Output;

    async fn or_cancel(self, token: &CancellationToken) -> Result<Self::Output, CancelErr> {
        tokio::select! {
            biased;
            _ = token.cancelled() => Err(CancelErr::Cancelled),
            res = self => Ok(res),
        }
    }
}
