//! Error taxonomy for chain access.

use crate::types::BlockRef;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Transport and setup errors from the chain client.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Transport failure. Retryable by the caller or loop.
    #[error("connection failed: {reason}")]
    Connection { reason: String },

    /// The referenced block is unknown to the node.
    #[error("block not found: {block}")]
    NotFound { block: BlockRef },

    /// The expected storage/call surface is missing or the configuration
    /// is unusable. Fatal at startup.
    #[error("configuration error: {reason}")]
    Configuration { reason: String },

    /// A caller-supplied deadline elapsed. Never raised internally.
    #[error("timed out after {secs}s")]
    Timeout { secs: u64 },
}

impl ChainError {
    /// Shorthand for a connection failure.
    pub fn connection(reason: impl Into<String>) -> Self {
        Self::Connection {
            reason: reason.into(),
        }
    }

    /// Shorthand for a configuration failure.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }
}

/// Decoded on-chain rejection of a dispatched call.
///
/// Not retryable for the same payload. Carries the error's origin pallet,
/// variant name, and any documentation text the node supplied.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("dispatch failed: {pallet}.{name}")]
pub struct DispatchError {
    /// Pallet (namespace) the error originates from.
    pub pallet: String,
    /// Error variant name.
    pub name: String,
    /// Human-readable documentation lines, when available.
    pub docs: Vec<String>,
}

impl DispatchError {
    /// Build a dispatch error without documentation.
    pub fn new(pallet: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            pallet: pallet.into(),
            name: name.into(),
            docs: Vec::new(),
        }
    }

    /// Attach documentation lines.
    #[must_use]
    pub fn with_docs(mut self, docs: Vec<String>) -> Self {
        self.docs = docs;
        self
    }

    /// Documentation joined into one human-readable line.
    #[must_use]
    pub fn description(&self) -> String {
        self.docs.join(" ")
    }
}

/// Result type for chain client operations.
pub type ChainResult<T> = Result<T, ChainError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dispatch_error_display_names_pallet_and_variant() {
        let err = DispatchError::new("secureFinality", "WatermarkRegression");
        assert_eq!(
            err.to_string(),
            "dispatch failed: secureFinality.WatermarkRegression"
        );
    }

    #[test]
    fn dispatch_error_description_joins_docs() {
        let err = DispatchError::new("system", "BadOrigin")
            .with_docs(vec!["Bad origin.".into(), "Caller lacks privilege.".into()]);
        assert_eq!(err.description(), "Bad origin. Caller lacks privilege.");
    }
}
