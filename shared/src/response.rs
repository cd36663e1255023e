//! Command response envelopes
//!
//! Handlers reply with a JSON document in one of two shapes:
//!
//! ```text
//! { "status": "success", "data": { ... } }
//! { "status": "error", "error": { "code": "...", "message": "...", "details": { ... } } }
//! ```

use serde_json::{json, Map, Value};

/// Builders for the standard reply envelopes
pub struct CommandResponse;

impl CommandResponse {
    /// Success envelope wrapping `data`
    pub fn success(data: Value) -> Value {
        json!({ "status": "success", "data": data })
    }

    /// Success envelope with an empty data object
    pub fn ok() -> Value {
        Self::success(Value::Object(Map::new()))
    }

    /// Error envelope with an optional details object
    ///
    /// Empty or null details are omitted.
    pub fn error(code: &str, message: &str, details: Option<Value>) -> Value {
        let mut error = Map::new();
        error.insert("code".into(), Value::from(code));
        error.insert("message".into(), Value::from(message));

        if let Some(details) = details {
            let empty = match &details {
                Value::Null => true,
                Value::Object(map) => map.is_empty(),
                _ => false,
            };
            if !empty {
                error.insert("details".into(), details);
            }
        }

        json!({ "status": "error", "error": Value::Object(error) })
    }

    pub fn device_not_found(device_id: &str, device_type: &str) -> Value {
        Self::error(
            "device_not_found",
            &format!("{} not found: {}", device_type, device_id),
            Some(json!({ "deviceId": device_id, "deviceType": device_type })),
        )
    }

    pub fn missing_parameter(param: &str) -> Value {
        Self::error(
            "missing_parameter",
            &format!("Missing required parameter: {}", param),
            Some(json!({ "param": param })),
        )
    }

    pub fn invalid_parameter(param: &str, reason: &str) -> Value {
        Self::error(
            "invalid_parameter",
            &format!("Invalid parameter '{}': {}", param, reason),
            Some(json!({ "param": param, "reason": reason })),
        )
    }

    pub fn service_unavailable(service: &str) -> Value {
        Self::error(
            "service_unavailable",
            &format!("Service unavailable: {}", service),
            Some(json!({ "service": service })),
        )
    }

    pub fn operation_failed(operation: &str, reason: &str) -> Value {
        Self::error(
            "operation_failed",
            &format!("Operation '{}' failed: {}", operation, reason),
            Some(json!({ "operation": operation, "reason": reason })),
        )
    }

    pub fn timeout(operation: &str) -> Value {
        Self::error(
            "timeout",
            &format!("Operation '{}' timed out", operation),
            Some(json!({ "operation": operation })),
        )
    }

    /// Device is busy, optionally naming the operation in progress
    pub fn device_busy(device_id: &str, operation: Option<&str>) -> Value {
        let mut details = json!({ "deviceId": device_id });
        let message = match operation.filter(|op| !op.is_empty()) {
            Some(op) => {
                details["operation"] = Value::from(op);
                format!("Device {} is busy ({})", device_id, op)
            }
            None => format!("Device {} is busy", device_id),
        };
        Self::error("device_busy", &message, Some(details))
    }

    pub fn not_connected(device_id: &str) -> Value {
        Self::error(
            "not_connected",
            &format!("Device not connected: {}", device_id),
            Some(json!({ "deviceId": device_id })),
        )
    }

    /// Check whether a reply is an error envelope
    pub fn is_error(response: &Value) -> bool {
        response.get("status").and_then(Value::as_str) == Some("error")
    }
}
