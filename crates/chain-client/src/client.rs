//! The chain access port.
//!
//! `ChainClient` is the single outbound dependency of the watcher. Real
//! implementations wrap an RPC transport; tests use [`crate::MockChainClient`].

use crate::error::{ChainError, ChainResult};
use crate::status::TxStatus;
use crate::types::{BlockHeader, BlockNumber, BlockRef, PrivilegedCall, SignedPayload, Watermark};
use async_trait::async_trait;
use tokio::sync::mpsc;

/// Live feed of watermark values.
///
/// The first delivered value is the watermark current at subscribe time;
/// every subsequent value is a change notification. Dropping the handle
/// unsubscribes.
pub struct WatermarkSubscription {
    rx: mpsc::Receiver<ChainResult<Watermark>>,
}

impl WatermarkSubscription {
    /// Create a subscription plus the sender half an implementation feeds.
    #[must_use]
    pub fn channel(buffer: usize) -> (mpsc::Sender<ChainResult<Watermark>>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    /// Next watermark value, or `None` once the feed ends.
    pub async fn next(&mut self) -> Option<ChainResult<Watermark>> {
        self.rx.recv().await
    }
}

/// Live feed of lifecycle statuses for one submitted transaction.
///
/// Dropping the handle stops delivery; the feed ends on its own after the
/// terminal `Finalized` status.
pub struct TxStatusStream {
    rx: mpsc::Receiver<TxStatus>,
}

impl TxStatusStream {
    /// Create a stream plus the sender half an implementation feeds.
    #[must_use]
    pub fn channel(buffer: usize) -> (mpsc::Sender<TxStatus>, Self) {
        let (tx, rx) = mpsc::channel(buffer);
        (tx, Self { rx })
    }

    /// Next status, or `None` once the feed ends.
    pub async fn next(&mut self) -> Option<TxStatus> {
        self.rx.recv().await
    }
}

/// Abstract chain connection: reads, storage subscriptions, and
/// transaction submission.
///
/// The connection is shared across watcher components and must support
/// concurrent read/subscribe/submit calls.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Highest block number irreversibly committed by consensus.
    ///
    /// Fails with [`ChainError::Connection`] on transport failure.
    async fn finalized_height(&self) -> ChainResult<BlockNumber>;

    /// Header of the referenced block.
    ///
    /// Fails with [`ChainError::NotFound`] if the node does not know the
    /// block.
    async fn header(&self, block: &BlockRef) -> ChainResult<BlockHeader>;

    /// Subscribe to watermark updates.
    ///
    /// Implementations MUST deliver the current value immediately upon
    /// establishment, not only on future changes; a waiter whose target is
    /// already satisfied must resolve on the first notification instead of
    /// deadlocking on a change that may never occur.
    async fn subscribe_watermark(&self) -> ChainResult<WatermarkSubscription>;

    /// Submit a signed transaction and stream its lifecycle.
    async fn submit_transaction(&self, payload: SignedPayload) -> ChainResult<TxStatusStream>;

    /// Submit a privileged call (watermark advancement) and stream its
    /// lifecycle. Same shape as ordinary submission.
    async fn submit_privileged(&self, call: PrivilegedCall) -> ChainResult<TxStatusStream>;
}
