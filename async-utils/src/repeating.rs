//! Periodic task with a single cancellation entry point.

use std::future::Future;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::OrCancelExt;

/// What a tick wants the schedule to do next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickFlow {
    Continue,
    Stop,
}

/// A job that runs every `period` until it returns [`TickFlow::Stop`] or the
/// owner cancels it.
///
/// The first tick fires one full period after spawning. Cancelling is
/// idempotent and dropping the handle cancels, so the job never outlives its
/// owner. A tick that is in flight when cancellation arrives is abandoned at
/// its next await point.
pub struct RepeatingTask {
    token: CancellationToken,
    handle: Option<JoinHandle<()>>,
}

impl RepeatingTask {
    /// Spawn onto the current tokio runtime.
    pub fn spawn<F, Fut>(period: Duration, tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickFlow> + Send + 'static,
    {
        Self::spawn_with_token(CancellationToken::new(), period, tick)
    }

    /// Spawn under an existing token, so cancelling `token` from elsewhere
    /// stops this schedule too.
    pub fn spawn_with_token<F, Fut>(token: CancellationToken, period: Duration, mut tick: F) -> Self
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = TickFlow> + Send + 'static,
    {
        let task_token = token.clone();

        let handle = tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                if interval.tick().or_cancel(&task_token).await.is_err() {
                    break;
                }
                if task_token.is_cancelled() {
                    break;
                }
                match tick().or_cancel(&task_token).await {
                    Ok(TickFlow::Continue) => {}
                    Ok(TickFlow::Stop) => {
                        task_token.cancel();
                        break;
                    }
                    Err(_) => break,
                }
            }
            tracing::trace!("repeating task finished");
        });

        Self {
            token,
            handle: Some(handle),
        }
    }

    /// Stop the schedule. Safe to call any number of times.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// True once cancelled, either by the owner or by a tick returning `Stop`.
    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// True once the background job has exited.
    pub fn is_finished(&self) -> bool {
        self.handle.as_ref().is_none_or(JoinHandle::is_finished)
    }

    /// Wait for the background job to exit without cancelling it.
    pub async fn join(mut self) {
        if let Some(handle) = self.handle.take()
            && let Err(err) = handle.await
        {
            tracing::warn!("repeating task ended abnormally: {err}");
        }
    }
}

impl Drop for RepeatingTask {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
