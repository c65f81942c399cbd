//! Watermark waits.
//!
//! A [`WatermarkWait`] owns one watermark subscription and resolves exactly
//! once when the observed value reaches its target. The subscription is
//! torn down the moment the wait resolves, rejects, or is cancelled.

use crate::error::{WatcherError, WatcherResult};
use chain_client::{BlockNumber, ChainClient, Watermark};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace};

/// A single-resolution wait for the watermark to reach a target height.
///
/// Concurrent waits on independent targets share no mutable state; each
/// owns its own subscription and background task.
pub struct WatermarkWait {
    done: oneshot::Receiver<WatcherResult<Watermark>>,
    task: JoinHandle<()>,
}

impl WatermarkWait {
    /// Start waiting for the watermark to reach `target`.
    ///
    /// The subscription delivers the current value immediately, so a target
    /// that is already satisfied resolves on the very first notification.
    pub fn spawn<C: ChainClient + 'static>(client: Arc<C>, target: BlockNumber) -> Self {
        let (done_tx, done_rx) = oneshot::channel();
        let task = tokio::spawn(async move {
            let result = watch_until(client.as_ref(), target).await;
            // The receiver may be gone (wait dropped); nothing to do then.
            let _ = done_tx.send(result);
        });
        Self {
            done: done_rx,
            task,
        }
    }

    /// Await resolution: the first observed watermark at or above the
    /// target, or the subscription failure that ended the wait.
    pub async fn wait(self) -> WatcherResult<Watermark> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(WatcherError::WaitAbandoned),
        }
    }

    /// Like [`Self::wait`], bounded by an explicit caller deadline.
    ///
    /// This wrapper is the only place a timeout is ever raised; the wait
    /// itself has no internal deadline.
    pub async fn wait_with_deadline(self, deadline: Duration) -> WatcherResult<Watermark> {
        let secs = deadline.as_secs();
        let task = self.task.abort_handle();
        match tokio::time::timeout(deadline, self.done).await {
            Ok(Ok(result)) => result,
            Ok(Err(_)) => Err(WatcherError::WaitAbandoned),
            Err(_) => {
                task.abort();
                Err(WatcherError::Chain(chain_client::ChainError::Timeout {
                    secs,
                }))
            }
        }
    }

    /// Silently tear the wait down: the subscription is released and the
    /// caller-visible future is neither resolved nor rejected.
    pub fn cancel(self) {
        self.task.abort();
    }
}

/// Read the watermark current right now, through a short-lived
/// subscription (the first delivered value is the current one).
pub async fn current_watermark<C: ChainClient + ?Sized>(client: &C) -> WatcherResult<Watermark> {
    let mut sub = client.subscribe_watermark().await?;
    match sub.next().await {
        Some(Ok(watermark)) => Ok(watermark),
        Some(Err(e)) => Err(e.into()),
        None => Err(WatcherError::SubscriptionClosed),
    }
}

async fn watch_until<C: ChainClient + ?Sized>(
    client: &C,
    target: BlockNumber,
) -> WatcherResult<Watermark> {
    let mut sub = client.subscribe_watermark().await?;
    loop {
        match sub.next().await {
            Some(Ok(watermark)) => {
                if watermark.satisfies(target) {
                    debug!(%watermark, target, "watermark reached target");
                    return Ok(watermark);
                }
                trace!(%watermark, target, "watermark below target, waiting");
            }
            Some(Err(e)) => return Err(e.into()),
            None => return Err(WatcherError::SubscriptionClosed),
        }
    }
}
