//! Type-erased payloads
//!
//! Payloads are typed at the public API and erased to `Arc<dyn Any>` inside
//! the engine, so one scheduler can carry every command's payload type.

use crate::error::DispatchError;
use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

/// Anything that can be dispatched to a command handler
pub trait Payload: Clone + Send + Sync + 'static {}

impl<T: Clone + Send + Sync + 'static> Payload for T {}

pub(crate) type ErasedPayload = Arc<dyn Any + Send + Sync>;

pub(crate) fn erase<T: Payload>(value: T) -> ErasedPayload {
    Arc::new(value)
}

/// Take the value back out, cloning only if the payload is still shared
pub(crate) fn recover<T: Payload>(value: ErasedPayload) -> Option<T> {
    value
        .downcast::<T>()
        .ok()
        .map(|arc| Arc::try_unwrap(arc).unwrap_or_else(|shared| (*shared).clone()))
}

pub(crate) fn peek<T: Payload>(value: &ErasedPayload) -> Option<&T> {
    (**value).downcast_ref::<T>()
}

/// Payload shape a handler was registered with
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PayloadType {
    id: TypeId,
    name: &'static str,
}

impl PayloadType {
    pub(crate) fn of<T: Payload>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        self.name
    }

    /// Reject a dispatch whose payload type differs from the registered one
    pub(crate) fn check<T: Payload>(&self, command: &str) -> Result<(), DispatchError> {
        if self.id == TypeId::of::<T>() {
            Ok(())
        } else {
            Err(DispatchError::TypeMismatch {
                command: command.to_string(),
                expected: self.name,
                found: type_name::<T>(),
            })
        }
    }
}
