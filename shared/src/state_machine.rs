//! Command Execution State Machine
//!
//! Defines the valid lifecycle transitions of a single command execution:
//!
//! ```text
//! PENDING -> RUNNING -> { COMPLETED | FAILED | CANCELLED }
//! PENDING -> CANCELLED
//! ```
//!
//! The three right-hand states are terminal and accept no further events.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a command execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommandStatus {
    /// Never dispatched (or the record is gone)
    Unknown,
    /// Admitted, waiting for readiness or a concurrency slot
    Pending,
    /// Handler has been handed to the event loop
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl CommandStatus {
    /// Check if no further transitions are possible
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Check if the execution is pending or running
    pub fn is_active(self) -> bool {
        matches!(self, Self::Pending | Self::Running)
    }

    /// Apply an event and return the transition result
    pub fn apply(self, event: ExecutionEvent) -> TransitionResult {
        use CommandStatus::*;
        use ExecutionEvent::*;

        let next = match (self, event) {
            (Pending, Start) => Some(Running),
            (Pending, Cancel) => Some(Cancelled),

            (Running, Complete) => Some(Completed),
            (Running, Fail) => Some(Failed),
            (Running, Cancel) => Some(Cancelled),

            _ => None,
        };

        match next {
            Some(state) => TransitionResult::Success(state),
            None => TransitionResult::Invalid { from: self, event },
        }
    }
}

impl fmt::Display for CommandStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Unknown => "UNKNOWN",
            Self::Pending => "PENDING",
            Self::Running => "RUNNING",
            Self::Completed => "COMPLETED",
            Self::Failed => "FAILED",
            Self::Cancelled => "CANCELLED",
        };
        f.write_str(name)
    }
}

/// Events that drive an execution through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionEvent {
    /// Concurrency slot granted, handler posted
    Start,
    /// Handler returned normally
    Complete,
    /// Handler raised an error or the deadline passed
    Fail,
    /// Cancellation requested
    Cancel,
}

/// Result of a state transition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransitionResult {
    /// Transition was valid
    Success(CommandStatus),
    /// Transition was invalid from current state
    Invalid {
        from: CommandStatus,
        event: ExecutionEvent,
    },
}

impl TransitionResult {
    /// The new state, if the transition was valid
    pub fn state(self) -> Option<CommandStatus> {
        match self {
            Self::Success(state) => Some(state),
            Self::Invalid { .. } => None,
        }
    }
}
