//! Bridge behaviour settings

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::core::errors::{BridgeError, BridgeResult};

/// Default interval between download completion checks
pub const DEFAULT_POLL_INTERVAL_MS: u64 = 1000;

/// Bridge configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Milliseconds to sleep between download completion checks
    pub poll_interval_ms: u64,

    /// Whether folder listings include dot-files
    pub include_hidden: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            include_hidden: false,
        }
    }
}

impl BridgeConfig {
    /// Poll interval as a Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Builder-style override of the poll interval
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn validate(&self) -> BridgeResult<()> {
        if self.poll_interval_ms == 0 {
            return Err(BridgeError::InvalidConfig {
                field: "poll_interval_ms".to_string(),
                reason: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }
}
