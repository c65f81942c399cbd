//! Watcher configuration.
//!
//! The watermark and advancement surface is resolved by pallet name once,
//! at startup, and validated here; nothing probes the chain at runtime.

use chain_client::{BlockNumber, ChainError, ChainResult};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the watcher services and the CLI.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// JSON-RPC endpoint of the chain node.
    pub endpoint: String,

    /// Signing credential (SURI), consumed opaquely by the transport.
    pub signer_suri: String,

    /// Pallet exposing the watermark storage and the record-verified-height
    /// call.
    pub pallet: String,

    /// Advancement loop tick interval in seconds.
    pub poll_interval_secs: u64,

    /// Cooldown after a failed tick or advancement, in seconds.
    pub failure_cooldown_secs: u64,

    /// Grace period for an outstanding advancement at shutdown, in seconds.
    pub stop_grace_secs: u64,

    /// Log intended advancements instead of submitting them.
    pub dry_run: bool,

    /// Watch-only mode: skip submission entirely and wait for the
    /// watermark to reach this block.
    pub watch_target: Option<BlockNumber>,
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9933".to_string(),
            signer_suri: "//Alice".to_string(),
            pallet: "secureFinality".to_string(),
            poll_interval_secs: 6,
            failure_cooldown_secs: 30,
            stop_grace_secs: 10,
            dry_run: false,
            watch_target: None,
        }
    }
}

impl WatcherConfig {
    /// Create a config for testing (small values).
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            endpoint: "http://127.0.0.1:9933".to_string(),
            signer_suri: "//Alice".to_string(),
            pallet: "secureFinality".to_string(),
            poll_interval_secs: 1,
            failure_cooldown_secs: 5,
            stop_grace_secs: 1,
            dry_run: false,
            watch_target: None,
        }
    }

    /// Tick interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    /// Failure cooldown as a [`Duration`].
    #[must_use]
    pub fn failure_cooldown(&self) -> Duration {
        Duration::from_secs(self.failure_cooldown_secs)
    }

    /// Shutdown grace as a [`Duration`].
    #[must_use]
    pub fn stop_grace(&self) -> Duration {
        Duration::from_secs(self.stop_grace_secs)
    }

    /// Fail fast on configuration the watcher cannot run with.
    pub fn validate(&self) -> ChainResult<()> {
        if self.endpoint.is_empty() {
            return Err(ChainError::configuration("endpoint must not be empty"));
        }
        if self.pallet.is_empty() {
            return Err(ChainError::configuration(
                "watermark pallet name must not be empty",
            ));
        }
        if self.poll_interval_secs == 0 {
            return Err(ChainError::configuration(
                "poll interval must be at least one second",
            ));
        }
        if !self.dry_run && self.watch_target.is_none() && self.signer_suri.is_empty() {
            return Err(ChainError::configuration(
                "a signer is required unless running dry-run or watch-only",
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_validates() {
        assert!(WatcherConfig::default().validate().is_ok());
    }

    #[test]
    fn empty_pallet_is_a_configuration_error() {
        let config = WatcherConfig {
            pallet: String::new(),
            ..WatcherConfig::for_testing()
        };
        assert!(matches!(
            config.validate(),
            Err(ChainError::Configuration { .. })
        ));
    }

    #[test]
    fn zero_interval_is_rejected() {
        let config = WatcherConfig {
            poll_interval_secs: 0,
            ..WatcherConfig::for_testing()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn missing_signer_allowed_in_dry_run() {
        let config = WatcherConfig {
            signer_suri: String::new(),
            dry_run: true,
            ..WatcherConfig::for_testing()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn missing_signer_rejected_for_submission() {
        let config = WatcherConfig {
            signer_suri: String::new(),
            ..WatcherConfig::for_testing()
        };
        assert!(config.validate().is_err());
    }
}
