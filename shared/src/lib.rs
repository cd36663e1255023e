//! Lithium Shared Types
//!
//! This crate provides the status, result and wire types shared between the
//! command dispatcher and the transports that expose it to clients.

pub mod codec;
pub mod protocol;
pub mod response;
pub mod state_machine;

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

pub use response::CommandResponse;
pub use state_machine::{CommandStatus, ExecutionEvent, TransitionResult};

/// Get current timestamp in milliseconds since Unix epoch
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Default tunables for the dispatcher
pub mod defaults {
    /// Maximum number of payloads kept per command identifier
    pub const MAX_HISTORY_SIZE: usize = 100;

    /// Maximum execution time before a running command is failed
    pub const DEFAULT_TIMEOUT_MS: u64 = 5000;

    /// Maximum number of simultaneously running commands, across all identifiers
    pub const MAX_CONCURRENT_COMMANDS: usize = 100;

    /// Priority used when the caller does not pick one
    pub const DEFAULT_PRIORITY: i32 = 0;
}

/// Externally visible outcome of the most recent execution of a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult<T = serde_json::Value> {
    pub status: CommandStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Milliseconds since Unix epoch of the last status change
    pub timestamp: u64,
}

impl<T> CommandResult<T> {
    /// Result for a command that has never been dispatched
    pub fn unknown() -> Self {
        Self {
            status: CommandStatus::Unknown,
            result: None,
            error: None,
            timestamp: now_ms(),
        }
    }

    /// Convert the carried value, keeping status, error and timestamp
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> CommandResult<U> {
        CommandResult {
            status: self.status,
            result: self.result.map(f),
            error: self.error,
            timestamp: self.timestamp,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_unknown_result() {
        let result: CommandResult = CommandResult::unknown();
        assert_eq!(result.status, CommandStatus::Unknown);
        assert!(result.result.is_none());
        assert!(result.timestamp > 0);
    }

    #[test]
    fn test_result_serialization_skips_absent_fields() {
        let result = CommandResult {
            status: CommandStatus::Completed,
            result: Some(json!({"position": 1200})),
            error: None,
            timestamp: 42,
        };

        let value = serde_json::to_value(&result).expect("serialize failed");
        assert_eq!(value["status"], "completed");
        assert_eq!(value["result"]["position"], 1200);
        assert!(value.get("error").is_none());
    }

    #[test]
    fn test_result_map() {
        let result = CommandResult {
            status: CommandStatus::Completed,
            result: Some(21),
            error: None,
            timestamp: 1,
        };
        let mapped = result.map(|v| v * 2);
        assert_eq!(mapped.result, Some(42));
        assert_eq!(mapped.status, CommandStatus::Completed);
    }
}
