//! Transaction progress notifications delivered by the chain.

use crate::error::DispatchError;
use crate::types::BlockRef;
use serde::{Deserialize, Serialize};

/// Block-scoped outcome of a dispatched call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum DispatchOutcome {
    /// The call executed successfully in its block.
    Success,
    /// The call was included but its dispatch was rejected.
    Failed(DispatchError),
}

impl DispatchOutcome {
    /// Whether the dispatch succeeded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success)
    }
}

/// Lifecycle notification for one submitted transaction, delivered in
/// chain-state order: `Ready` before `Broadcast` before `InBlock` before
/// `Finalized`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TxStatus {
    /// Accepted into the node's transaction pool.
    Ready,
    /// Gossiped to peers.
    Broadcast,
    /// Included in a (not yet finalized) block.
    InBlock(BlockRef),
    /// The inclusion block was finalized. Carries the block-scoped
    /// dispatch outcome for this transaction.
    Finalized {
        /// The finalized inclusion block.
        block: BlockRef,
        /// How the dispatch went inside that block.
        outcome: DispatchOutcome,
    },
}
