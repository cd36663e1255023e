//! Error types for the dispatcher

use std::time::Duration;
use thiserror::Error;

/// Errors reported by the dispatcher, either synchronously at the call site
/// or as the stored outcome of an execution
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DispatchError {
    #[error("Command not registered: {0}")]
    UnregisteredCommand(String),

    #[error("Invalid command identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("Payload type mismatch for {command}: expected {expected}, got {found}")]
    TypeMismatch {
        command: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Command {command} timed out after {}ms", timeout.as_millis())]
    Timeout { command: String, timeout: Duration },

    #[error("Command {0} was cancelled")]
    Cancelled(String),

    #[error("Command {command} failed: {message}")]
    HandlerFailure { command: String, message: String },

    #[error("No undo handler registered for {0}")]
    NoUndoHandler(String),

    /// The dispatcher was dropped before the execution finished
    #[error("Command {0} was abandoned before completion")]
    Abandoned(String),
}

impl DispatchError {
    /// Identifier of the command this error refers to
    pub fn command(&self) -> &str {
        match self {
            Self::UnregisteredCommand(command)
            | Self::InvalidIdentifier(command)
            | Self::Cancelled(command)
            | Self::NoUndoHandler(command)
            | Self::Abandoned(command) => command,
            Self::TypeMismatch { command, .. }
            | Self::Timeout { command, .. }
            | Self::HandlerFailure { command, .. } => command,
        }
    }

    /// Check if the error was produced at the call site, before queueing
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            Self::UnregisteredCommand(_) | Self::InvalidIdentifier(_) | Self::TypeMismatch { .. }
        )
    }
}

/// Invalid dispatcher configuration
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("max_concurrent_commands must be at least 1")]
    ZeroConcurrency,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timeout_message() {
        let err = DispatchError::Timeout {
            command: "focuser.move".into(),
            timeout: Duration::from_millis(50),
        };
        assert_eq!(err.to_string(), "Command focuser.move timed out after 50ms");
        assert_eq!(err.command(), "focuser.move");
        assert!(!err.is_rejection());
    }

    #[test]
    fn test_rejections() {
        assert!(DispatchError::UnregisteredCommand("x".into()).is_rejection());
        assert!(DispatchError::TypeMismatch {
            command: "x".into(),
            expected: "i32",
            found: "alloc::string::String",
        }
        .is_rejection());
        assert!(!DispatchError::Cancelled("x".into()).is_rejection());
    }
}
