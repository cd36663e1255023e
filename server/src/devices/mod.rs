//! Simulated device command sets
//!
//! Each module registers its commands on the dispatcher at startup. Payloads
//! are JSON documents carrying a `deviceId` plus operation parameters, and
//! handlers reply with a [`CommandResponse`] envelope. Parameter problems are
//! reported in the envelope; only internal faults fail the dispatch.
//!
//! [`CommandResponse`]: lithium_shared::CommandResponse

pub mod filterwheel;
pub mod focuser;
pub mod mount;

use lithium_dispatch::{CommandDispatcher, DispatchError};
use lithium_shared::CommandResponse;
use serde_json::Value;

/// Register every simulated device with default settings
pub fn register_all(dispatcher: &CommandDispatcher) -> Result<(), DispatchError> {
    focuser::register(dispatcher, focuser::Focuser::shared(Default::default()))?;
    filterwheel::register(dispatcher, filterwheel::FilterWheel::shared(Default::default()))?;
    mount::register(dispatcher, mount::Mount::shared(Default::default()))?;
    Ok(())
}

/// A parameter value, or the error envelope to reply with
type Param<T> = Result<T, Value>;

/// Check that the payload addresses the device with id `expected`
fn require_device(payload: &Value, expected: &str, device_type: &str) -> Param<()> {
    match payload.get("deviceId").and_then(Value::as_str) {
        None | Some("") => Err(CommandResponse::missing_parameter("deviceId")),
        Some(id) if id != expected => Err(CommandResponse::device_not_found(id, device_type)),
        Some(_) => Ok(()),
    }
}

fn require_i64(payload: &Value, param: &str) -> Param<i64> {
    match payload.get(param) {
        None | Some(Value::Null) => Err(CommandResponse::missing_parameter(param)),
        Some(value) => value
            .as_i64()
            .ok_or_else(|| CommandResponse::invalid_parameter(param, "expected an integer")),
    }
}

fn require_f64(payload: &Value, param: &str) -> Param<f64> {
    match payload.get(param) {
        None | Some(Value::Null) => Err(CommandResponse::missing_parameter(param)),
        Some(value) => value
            .as_f64()
            .ok_or_else(|| CommandResponse::invalid_parameter(param, "expected a number")),
    }
}

/// Unwrap a parameter or return its error envelope from the handler
macro_rules! param {
    ($expr:expr) => {
        match $expr {
            Ok(value) => value,
            Err(reply) => return anyhow::Ok(reply),
        }
    };
}
pub(crate) use param;
