//! # chain-client
//!
//! Typed access to the chain for the secure-finality watcher.
//!
//! ## Overview
//!
//! This crate owns the boundary between the watcher and the chain node:
//!
//! - **Primitives**: [`BlockNumber`], [`Watermark`], [`BlockRef`],
//!   [`BlockHeader`] — raw wire types are converted here and nowhere else
//! - **Port**: the [`ChainClient`] trait covering reads, the watermark
//!   storage subscription, and transaction/privileged submission
//! - **Streams**: [`WatermarkSubscription`] and [`TxStatusStream`], where
//!   dropping the handle is the unsubscribe
//! - **Errors**: [`ChainError`] (transport/setup) and [`DispatchError`]
//!   (decoded on-chain rejection)
//! - **Test double**: [`MockChainClient`], scriptable along every axis the
//!   watcher exercises
//!
//! ## Subscription contract
//!
//! Watermark subscriptions deliver the current value immediately on
//! establishment. Consumers rely on this to resolve targets that are
//! already satisfied at subscribe time; see
//! [`ChainClient::subscribe_watermark`].

pub mod client;
pub mod error;
pub mod mock;
pub mod status;
pub mod types;

pub use client::{ChainClient, TxStatusStream, WatermarkSubscription};
pub use error::{ChainError, ChainResult, DispatchError};
pub use mock::MockChainClient;
pub use status::{DispatchOutcome, TxStatus};
pub use types::{BlockHeader, BlockNumber, BlockRef, PrivilegedCall, SignedPayload, Watermark};
