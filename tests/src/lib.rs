//! # Secure-Finality Watcher Test Suite
//!
//! Unified test crate for flows that span more than one crate.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/      # Tracker + advancer + waiter over one mock chain
//!     └── flows.rs
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p sf-tests
//! ```
//!
//! Component-level tests live beside the code in `crates/*/src`.

#[cfg(test)]
mod integration;
