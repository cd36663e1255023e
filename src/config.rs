//! Dispatcher configuration

use crate::error::ConfigError;
use lithium_shared::defaults;
use serde::{Deserialize, Deserializer};
use std::time::Duration;

/// Process-wide dispatcher tunables
///
/// Every field is optional when deserialized; missing fields take the
/// defaults from [`lithium_shared::defaults`]. The timeout is read from
/// `default_timeout_ms`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatcherConfig {
    /// Payloads kept per command identifier (oldest evicted first)
    pub max_history_size: usize,
    /// Deadline for commands without a per-identifier override
    #[serde(rename = "default_timeout_ms", deserialize_with = "duration_from_ms")]
    pub default_timeout: Duration,
    /// Running executions allowed at once, across all identifiers
    pub max_concurrent_commands: usize,
    /// When false, every request is treated as equal priority and served FIFO
    pub enable_priority: bool,
}

impl Default for DispatcherConfig {
    fn default() -> Self {
        Self {
            max_history_size: defaults::MAX_HISTORY_SIZE,
            default_timeout: Duration::from_millis(defaults::DEFAULT_TIMEOUT_MS),
            max_concurrent_commands: defaults::MAX_CONCURRENT_COMMANDS,
            enable_priority: true,
        }
    }
}

impl DispatcherConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_concurrent_commands == 0 {
            return Err(ConfigError::ZeroConcurrency);
        }
        Ok(())
    }
}

fn duration_from_ms<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
    u64::deserialize(deserializer).map(Duration::from_millis)
}
