//! # secure-finality
//!
//! Layers a "secure finalized" guarantee on top of the chain's native
//! finality: a transaction counts as secure-finalized once a separate,
//! slower verification watermark has advanced past its inclusion block.
//!
//! ## Components
//!
//! ```text
//!                       ┌────────────────┐
//!   submit_and_watch ──→│ SecureTracker  │── lifecycle events ──→ caller
//!                       │  (per tx)      │
//!                       └──────┬─────────┘
//!                              │ inclusion height
//!                              ↓
//!                       ┌────────────────┐
//!                       │ WatermarkWait  │←── watermark subscription
//!                       │  (per wait)    │
//!                       └────────────────┘
//!
//!                       ┌──────────────────┐
//!   interval ticks ────→│ WatermarkAdvancer│── record-verified-height ──→ chain
//!                       │  (single-flight) │
//!                       └──────────────────┘
//! ```
//!
//! All three run against the shared [`chain_client::ChainClient`]
//! connection and own no other shared state. Trackers for different
//! transactions are fully independent; the advancer's single-flight guard
//! lives inside its own loop task.
//!
//! ## Example
//!
//! ```rust,ignore
//! use secure_finality::{SecureTracker, WatcherConfig, WatermarkAdvancer};
//!
//! let tracker = SecureTracker::new(client.clone());
//! let handle = tracker
//!     .submit_and_watch(payload, |event| println!("{event:?}"))
//!     .await?;
//! let inclusion = handle.secure_finalized().await?;
//!
//! let advancer = WatermarkAdvancer::spawn(client, WatcherConfig::default());
//! ```

pub mod advancer;
pub mod config;
pub mod error;
pub mod tracker;
pub mod waiter;

pub use advancer::{
    AdvancementAttempt, AdvancerHandle, AdvancerStats, AttemptOutcome, WatermarkAdvancer,
};
pub use config::WatcherConfig;
pub use error::{WatcherError, WatcherResult};
pub use tracker::{LifecycleEvent, SecureTracker, TxHandle, TxPhase};
pub use waiter::{current_watermark, WatermarkWait};
