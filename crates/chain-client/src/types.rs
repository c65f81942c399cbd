//! Core chain primitives.
//!
//! Everything the watcher reads from the chain is converted into these
//! types at the client boundary; nothing downstream touches raw wire
//! representations.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Monotonically non-decreasing block height.
pub type BlockNumber = u64;

/// Last-observed verification-progress value.
///
/// The producer is expected to advance this monotonically, but the watcher
/// only ever compares it against targets and never enforces monotonicity.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub struct Watermark(pub BlockNumber);

impl Watermark {
    /// Whether this watermark has reached the given target height.
    #[must_use]
    pub fn satisfies(&self, target: BlockNumber) -> bool {
        self.0 >= target
    }
}

impl From<BlockNumber> for Watermark {
    fn from(height: BlockNumber) -> Self {
        Self(height)
    }
}

impl fmt::Display for Watermark {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to a block by hash.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockRef(pub [u8; 32]);

impl BlockRef {
    /// Build a reference from raw hash bytes.
    #[must_use]
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Display for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for BlockRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Short form: enough hex to identify a block in logs
        write!(f, "BlockRef(0x{}..)", hex::encode(&self.0[..4]))
    }
}

/// The slice of a block header the watcher cares about.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Height of the block.
    pub number: BlockNumber,
}

/// An opaque, already-signed transaction payload.
///
/// Signing and address encoding happen outside this system; the watcher
/// only carries the bytes to the submission endpoint.
#[derive(Clone, PartialEq, Eq)]
pub struct SignedPayload(Vec<u8>);

impl SignedPayload {
    /// Wrap signed transaction bytes.
    #[must_use]
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self(bytes)
    }

    /// The raw payload bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Debug for SignedPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SignedPayload({} bytes)", self.0.len())
    }
}

/// A privileged call that records the verified height, advancing the
/// watermark. Restricted to an authorized key on the chain side.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrivilegedCall {
    /// Pallet exposing the watermark surface.
    pub pallet: String,
    /// Height the call asserts as verified.
    pub target: BlockNumber,
}

impl PrivilegedCall {
    /// Build a record-verified-height call for the given pallet.
    #[must_use]
    pub fn record_verified_height(pallet: impl Into<String>, target: BlockNumber) -> Self {
        Self {
            pallet: pallet.into(),
            target,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn watermark_satisfies_at_and_above_target() {
        assert!(Watermark(100).satisfies(100));
        assert!(Watermark(105).satisfies(100));
        assert!(!Watermark(99).satisfies(100));
    }

    #[test]
    fn block_ref_displays_full_hex() {
        let mut bytes = [0u8; 32];
        bytes[0] = 0xab;
        let block = BlockRef::from_bytes(bytes);
        let shown = block.to_string();
        assert!(shown.starts_with("0xab00"));
        assert_eq!(shown.len(), 2 + 64);
    }

    #[test]
    fn signed_payload_hides_bytes_in_debug() {
        let payload = SignedPayload::from_bytes(vec![1, 2, 3]);
        assert_eq!(format!("{payload:?}"), "SignedPayload(3 bytes)");
    }
}
