//! Error types for the watcher services.

use chain_client::{ChainError, DispatchError};
use thiserror::Error;

/// Watcher service errors.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum WatcherError {
    /// Transport or setup failure from the chain client. Retryable.
    #[error(transparent)]
    Chain(#[from] ChainError),

    /// The tracked call was rejected on-chain. Kept distinct from
    /// transport failure so callers can tell a dead connection from a
    /// dead transaction.
    #[error(transparent)]
    Dispatch(#[from] DispatchError),

    /// A subscription or status stream ended before delivering what the
    /// consumer was waiting for.
    #[error("subscription closed before delivering a value")]
    SubscriptionClosed,

    /// The background wait task went away without resolving.
    #[error("wait abandoned before resolution")]
    WaitAbandoned,
}

impl WatcherError {
    /// Whether this error is a decoded on-chain rejection.
    #[must_use]
    pub fn is_dispatch(&self) -> bool {
        matches!(self, Self::Dispatch(_))
    }
}

/// Result type for watcher operations.
pub type WatcherResult<T> = Result<T, WatcherError>;
