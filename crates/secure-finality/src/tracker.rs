//! Transaction lifecycle tracking with a secure-finality phase.
//!
//! [`SecureTracker`] drives one submitted transaction through the ordinary
//! lifecycle and, after native finalization, through a second wait until
//! the verification watermark passes the inclusion block. The caller sees
//! a single chronological event feed that ends with exactly one
//! [`LifecycleEvent::SecureFinalized`] on the success path.

use crate::error::{WatcherError, WatcherResult};
use crate::waiter::WatermarkWait;
use chain_client::{
    BlockNumber, BlockRef, ChainClient, DispatchError, DispatchOutcome, SignedPayload, TxStatus,
    TxStatusStream,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

/// Caller-facing lifecycle notification.
///
/// `SecureFinalized` is synthetic: the chain never emits it, the tracker
/// does, strictly after `Finalized` and exactly once.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Accepted into the transaction pool.
    Ready,
    /// Gossiped to peers.
    Broadcast,
    /// Included in a block.
    InBlock(BlockRef),
    /// The inclusion block was finalized by consensus.
    Finalized {
        /// The inclusion block.
        block: BlockRef,
        /// Its resolved height.
        number: BlockNumber,
    },
    /// The dispatch was rejected on-chain. Terminal.
    Failed(DispatchError),
    /// The verification watermark passed the inclusion block. Terminal.
    SecureFinalized(BlockNumber),
}

/// Tracker phase. Transitions are strictly forward and non-repeating;
/// duplicate or regressing chain notifications are dropped.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum TxPhase {
    /// Submitted, no notification yet.
    Submitted,
    /// Pool accepted.
    Ready,
    /// Gossiped.
    Broadcast,
    /// In a block.
    InBlock,
    /// Inclusion block finalized.
    Finalized,
    /// Waiting for the watermark to pass the inclusion block.
    AwaitingSecure,
    /// Watermark passed the inclusion block. Terminal.
    SecureFinalized,
    /// Dispatch rejected. Terminal.
    Failed,
}

impl TxPhase {
    /// Whether no further transition can occur.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::SecureFinalized | Self::Failed)
    }

    /// Attempt a forward transition. Returns `false` (and leaves the phase
    /// untouched) for repeats, regressions, or transitions out of a
    /// terminal phase.
    pub fn advance(&mut self, next: TxPhase) -> bool {
        if self.is_terminal() || next <= *self {
            return false;
        }
        *self = next;
        true
    }
}

/// Drives submitted transactions to secure finality.
pub struct SecureTracker<C: ChainClient + 'static> {
    client: Arc<C>,
}

impl<C: ChainClient + 'static> SecureTracker<C> {
    /// Create a tracker over the shared chain connection.
    pub fn new(client: Arc<C>) -> Self {
        Self { client }
    }

    /// Submit a signed payload and follow it to secure finality.
    ///
    /// `on_event` is invoked once per event in chronological order. On the
    /// success path the last invocation is `SecureFinalized` carrying the
    /// inclusion block number; on dispatch failure it is `Failed` and the
    /// watermark phase is never entered.
    pub async fn submit_and_watch<F>(
        &self,
        payload: SignedPayload,
        on_event: F,
    ) -> WatcherResult<TxHandle>
    where
        F: FnMut(LifecycleEvent) + Send + 'static,
    {
        let statuses = self.client.submit_transaction(payload).await?;
        Ok(self.watch(statuses, on_event))
    }

    fn watch<F>(&self, statuses: TxStatusStream, mut on_event: F) -> TxHandle
    where
        F: FnMut(LifecycleEvent) + Send + 'static,
    {
        let events_on = Arc::new(AtomicBool::new(true));
        let flag = events_on.clone();
        let client = self.client.clone();
        let (done_tx, done_rx) = oneshot::channel();

        let task = tokio::spawn(async move {
            let mut emit = move |event: LifecycleEvent| {
                if flag.load(Ordering::Acquire) {
                    on_event(event);
                }
            };
            let result = drive(client, statuses, &mut emit).await;
            let _ = done_tx.send(result);
        });

        TxHandle {
            events_on,
            done: done_rx,
            _task: task,
        }
    }
}

/// Handle to one tracked transaction.
pub struct TxHandle {
    events_on: Arc<AtomicBool>,
    done: oneshot::Receiver<WatcherResult<BlockNumber>>,
    _task: JoinHandle<()>,
}

impl TxHandle {
    /// Stop receiving lifecycle notifications.
    ///
    /// Deliberately asymmetric: an already-started secure-wait is NOT
    /// cancelled — the tracker keeps following the watermark and
    /// [`Self::secure_finalized`] still resolves.
    pub fn unsubscribe(&self) {
        self.events_on.store(false, Ordering::Release);
    }

    /// Await the terminal outcome: the inclusion block number once it is
    /// secure-finalized, [`WatcherError::Dispatch`] if the call was
    /// rejected on-chain, or a transport error if the connection died
    /// during the wait.
    pub async fn secure_finalized(self) -> WatcherResult<BlockNumber> {
        match self.done.await {
            Ok(result) => result,
            Err(_) => Err(WatcherError::WaitAbandoned),
        }
    }
}

async fn drive<C, F>(
    client: Arc<C>,
    mut statuses: TxStatusStream,
    emit: &mut F,
) -> WatcherResult<BlockNumber>
where
    C: ChainClient + 'static,
    F: FnMut(LifecycleEvent),
{
    let mut phase = TxPhase::Submitted;

    // Ordinary lifecycle: consume chain statuses until finalization.
    let (block, outcome) = loop {
        match statuses.next().await {
            Some(TxStatus::Ready) => {
                if phase.advance(TxPhase::Ready) {
                    emit(LifecycleEvent::Ready);
                }
            }
            Some(TxStatus::Broadcast) => {
                if phase.advance(TxPhase::Broadcast) {
                    emit(LifecycleEvent::Broadcast);
                }
            }
            Some(TxStatus::InBlock(block)) => {
                if phase.advance(TxPhase::InBlock) {
                    emit(LifecycleEvent::InBlock(block));
                }
            }
            Some(TxStatus::Finalized { block, outcome }) => {
                if phase.advance(TxPhase::Finalized) {
                    break (block, outcome);
                }
                trace!(?block, "duplicate finalization notification dropped");
            }
            None => {
                warn!("status stream ended before finalization");
                return Err(WatcherError::SubscriptionClosed);
            }
        }
    };
    // The chain-side status subscription is done; release it before the
    // (potentially long) watermark phase.
    drop(statuses);

    if let DispatchOutcome::Failed(error) = outcome {
        phase.advance(TxPhase::Failed);
        debug!(%error, "dispatch failed in finalized block");
        emit(LifecycleEvent::Failed(error.clone()));
        return Err(WatcherError::Dispatch(error));
    }

    let number = client.header(&block).await?.number;
    emit(LifecycleEvent::Finalized { block, number });

    phase.advance(TxPhase::AwaitingSecure);
    debug!(inclusion = number, "finalized, awaiting secure watermark");
    let watermark = WatermarkWait::spawn(client.clone(), number).wait().await?;
    trace!(%watermark, inclusion = number, "secure wait resolved");

    phase.advance(TxPhase::SecureFinalized);
    emit(LifecycleEvent::SecureFinalized(number));
    Ok(number)
}
