//! In-memory chain client for tests.
//!
//! Scriptable along every axis the watcher exercises: finalized-height
//! sequences, watermark updates with immediate replay, transaction
//! progressions, and hold-and-release finalization of privileged calls.

use crate::client::{ChainClient, TxStatusStream, WatermarkSubscription};
use crate::error::{ChainError, ChainResult};
use crate::status::{DispatchOutcome, TxStatus};
use crate::types::{BlockHeader, BlockNumber, BlockRef, PrivilegedCall, SignedPayload, Watermark};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};

/// A privileged call whose finalization the test controls.
struct HeldPrivileged {
    target: BlockNumber,
    block: BlockRef,
    status_tx: mpsc::Sender<TxStatus>,
}

#[derive(Default)]
struct MockState {
    finalized: BlockNumber,
    finalized_script: VecDeque<BlockNumber>,
    watermark: Watermark,
    headers: HashMap<BlockRef, BlockNumber>,
    tx_scripts: VecDeque<Vec<TxStatus>>,
    submitted: Vec<SignedPayload>,
    privileged: Vec<PrivilegedCall>,
    held: VecDeque<HeldPrivileged>,
    hold_privileged: bool,
    fail_subscribe: bool,
    fail_finalized_height: bool,
    subscriptions_opened: usize,
}

/// Scriptable in-memory [`ChainClient`].
pub struct MockChainClient {
    state: Arc<Mutex<MockState>>,
    watermark_tx: broadcast::Sender<Watermark>,
}

impl Default for MockChainClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockChainClient {
    /// Fresh mock with height 0 and watermark 0.
    #[must_use]
    pub fn new() -> Self {
        let (watermark_tx, _) = broadcast::channel(64);
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            watermark_tx,
        }
    }

    /// Set the finalized height returned by every subsequent read.
    pub fn set_finalized(&self, height: BlockNumber) {
        self.state.lock().finalized = height;
    }

    /// Script the answers of successive `finalized_height` calls. Once the
    /// script runs dry the last value keeps being returned.
    pub fn script_finalized(&self, heights: impl IntoIterator<Item = BlockNumber>) {
        self.state.lock().finalized_script.extend(heights);
    }

    /// Move the watermark and notify live subscriptions.
    pub fn set_watermark(&self, height: BlockNumber) {
        self.state.lock().watermark = Watermark(height);
        let _ = self.watermark_tx.send(Watermark(height));
    }

    /// Register a header so `header` can resolve the block's number.
    pub fn insert_header(&self, block: BlockRef, number: BlockNumber) {
        self.state.lock().headers.insert(block, number);
    }

    /// Queue the status progression replayed by the next
    /// `submit_transaction` call.
    pub fn script_transaction(&self, statuses: Vec<TxStatus>) {
        self.state.lock().tx_scripts.push_back(statuses);
    }

    /// When enabled, privileged calls stall at `InBlock` until
    /// [`Self::release_privileged`] supplies their outcome.
    pub fn set_hold_privileged(&self, hold: bool) {
        self.state.lock().hold_privileged = hold;
    }

    /// Finalize the oldest held privileged call with the given outcome.
    /// A success also advances the watermark to the call's target.
    pub fn release_privileged(&self, outcome: DispatchOutcome) {
        let (held, success_target) = {
            let mut state = self.state.lock();
            let Some(held) = state.held.pop_front() else {
                panic!("release_privileged called with no held call");
            };
            let target = outcome.is_success().then_some(held.target);
            (held, target)
        };
        let _ = held.status_tx.try_send(TxStatus::Finalized {
            block: held.block,
            outcome,
        });
        if let Some(target) = success_target {
            self.set_watermark(target);
        }
    }

    /// Make `subscribe_watermark` fail with a connection error.
    pub fn fail_watermark_subscription(&self, fail: bool) {
        self.state.lock().fail_subscribe = fail;
    }

    /// Make `finalized_height` fail with a connection error.
    pub fn fail_finalized_height(&self, fail: bool) {
        self.state.lock().fail_finalized_height = fail;
    }

    /// Payloads submitted so far.
    #[must_use]
    pub fn submitted(&self) -> Vec<SignedPayload> {
        self.state.lock().submitted.clone()
    }

    /// Privileged calls submitted so far.
    #[must_use]
    pub fn privileged_calls(&self) -> Vec<PrivilegedCall> {
        self.state.lock().privileged.clone()
    }

    /// Privileged calls currently awaiting release.
    #[must_use]
    pub fn pending_privileged(&self) -> usize {
        self.state.lock().held.len()
    }

    /// How many watermark subscriptions were ever opened.
    #[must_use]
    pub fn watermark_subscriptions_opened(&self) -> usize {
        self.state.lock().subscriptions_opened
    }

    /// Live watermark subscriber tasks (drops to zero once every
    /// subscription handle is gone and a notification has flushed them).
    #[must_use]
    pub fn watermark_receiver_count(&self) -> usize {
        self.watermark_tx.receiver_count()
    }

    fn privileged_block(target: BlockNumber) -> BlockRef {
        let mut bytes = [0xee; 32];
        bytes[..8].copy_from_slice(&target.to_be_bytes());
        BlockRef::from_bytes(bytes)
    }

    fn replay(statuses: Vec<TxStatus>) -> TxStatusStream {
        let (tx, stream) = TxStatusStream::channel(statuses.len().max(1));
        for status in statuses {
            let _ = tx.try_send(status);
        }
        stream
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    async fn finalized_height(&self) -> ChainResult<BlockNumber> {
        let mut state = self.state.lock();
        if state.fail_finalized_height {
            return Err(ChainError::connection("finalized head unavailable"));
        }
        if let Some(next) = state.finalized_script.pop_front() {
            state.finalized = next;
        }
        Ok(state.finalized)
    }

    async fn header(&self, block: &BlockRef) -> ChainResult<BlockHeader> {
        let state = self.state.lock();
        state
            .headers
            .get(block)
            .map(|number| BlockHeader { number: *number })
            .ok_or(ChainError::NotFound { block: *block })
    }

    async fn subscribe_watermark(&self) -> ChainResult<WatermarkSubscription> {
        // Subscribe to the broadcast before reading the current value so an
        // update between the two cannot be missed; a duplicate first value
        // is harmless to comparison-driven consumers.
        let mut updates = self.watermark_tx.subscribe();
        let current = {
            let mut state = self.state.lock();
            state.subscriptions_opened += 1;
            if state.fail_subscribe {
                return Err(ChainError::connection("watermark subscription refused"));
            }
            state.watermark
        };

        let (tx, sub) = WatermarkSubscription::channel(16);
        let _ = tx.try_send(Ok(current));
        tokio::spawn(async move {
            loop {
                match updates.recv().await {
                    Ok(watermark) => {
                        if tx.send(Ok(watermark)).await.is_err() {
                            break; // subscriber dropped its handle
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(_)) => continue,
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(sub)
    }

    async fn submit_transaction(&self, payload: SignedPayload) -> ChainResult<TxStatusStream> {
        let script = {
            let mut state = self.state.lock();
            state.submitted.push(payload);
            state.tx_scripts.pop_front().unwrap_or_default()
        };
        Ok(Self::replay(script))
    }

    async fn submit_privileged(&self, call: PrivilegedCall) -> ChainResult<TxStatusStream> {
        let block = Self::privileged_block(call.target);
        let target = call.target;
        let hold = {
            let mut state = self.state.lock();
            state.privileged.push(call);
            state.hold_privileged
        };

        let (tx, stream) = TxStatusStream::channel(8);
        let _ = tx.try_send(TxStatus::Ready);
        let _ = tx.try_send(TxStatus::InBlock(block));
        if hold {
            self.state.lock().held.push_back(HeldPrivileged {
                target,
                block,
                status_tx: tx,
            });
        } else {
            let _ = tx.try_send(TxStatus::Finalized {
                block,
                outcome: DispatchOutcome::Success,
            });
            self.set_watermark(target);
        }
        Ok(stream)
    }
}
