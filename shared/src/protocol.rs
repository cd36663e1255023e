//! Client/server messages carried in codec frames

use crate::{CommandResult, CommandStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Requests sent by a client
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Dispatch a command; the reply is a `Result` with the same request id
    Dispatch {
        request_id: u64,
        command: String,
        #[serde(default)]
        payload: Value,
        #[serde(default)]
        priority: i32,
        #[serde(default)]
        delay_ms: u64,
    },
    Cancel {
        command: String,
    },
    Status {
        command: String,
    },
    History {
        command: String,
    },
    Active,
    Subscribe {
        command: String,
    },
    Unsubscribe {
        command: String,
        token: u64,
    },
}

/// Replies and notifications sent by the server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Result {
        request_id: u64,
        command: String,
        execution_id: u64,
        result: CommandResult,
    },
    Cancelled {
        command: String,
        cancelled: bool,
    },
    Status {
        command: String,
        status: CommandStatus,
    },
    History {
        command: String,
        entries: Vec<Value>,
    },
    Active {
        commands: Vec<String>,
    },
    Subscribed {
        command: String,
        token: u64,
    },
    Unsubscribed {
        command: String,
        token: u64,
        removed: bool,
    },
    /// Pushed to subscribers once per finished dispatch
    Event {
        command: String,
        payload: Value,
    },
    /// A request was rejected before it reached the dispatcher queue
    Error {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        request_id: Option<u64>,
        message: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_dispatch_defaults() {
        let msg: ClientMessage =
            serde_json::from_value(json!({"type": "dispatch", "request_id": 7, "command": "mount.park"}))
                .expect("parse failed");

        assert_eq!(
            msg,
            ClientMessage::Dispatch {
                request_id: 7,
                command: "mount.park".into(),
                payload: Value::Null,
                priority: 0,
                delay_ms: 0,
            }
        );
    }

    #[test]
    fn test_server_message_tagging() {
        let msg = ServerMessage::Status {
            command: "dome.shutter".into(),
            status: CommandStatus::Running,
        };
        let value = serde_json::to_value(&msg).expect("serialize failed");
        assert_eq!(value["type"], "status");
        assert_eq!(value["status"], "running");
    }
}
