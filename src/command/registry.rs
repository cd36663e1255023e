//! Command registry: identifier -> forward handler and optional undo handler

use super::context::CommandContext;
use super::payload::{erase, recover, ErasedPayload, Payload, PayloadType};
use crate::error::DispatchError;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

pub(crate) type HandlerFuture = BoxFuture<'static, anyhow::Result<ErasedPayload>>;

pub(crate) type ErasedHandler =
    Arc<dyn Fn(ErasedPayload, CommandContext) -> HandlerFuture + Send + Sync>;

/// Wrap a typed async handler so the engine can call it with erased payloads
pub(crate) fn erase_handler<T, F, Fut>(handler: F) -> ErasedHandler
where
    T: Payload,
    F: Fn(T, CommandContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    Arc::new(move |payload: ErasedPayload, ctx: CommandContext| {
        match recover::<T>(payload) {
            Some(payload) => handler(payload, ctx).map(|result| result.map(erase)).boxed(),
            None => {
                let expected = std::any::type_name::<T>();
                async move { Err(anyhow::anyhow!("payload is not a {}", expected)) }.boxed()
            }
        }
    })
}

/// Handlers bound to one command identifier
#[derive(Clone)]
pub(crate) struct RegisteredCommand {
    pub payload_type: PayloadType,
    pub handler: ErasedHandler,
    pub undo: Option<ErasedHandler>,
}

impl RegisteredCommand {
    pub(crate) fn new<T: Payload>(handler: ErasedHandler, undo: Option<ErasedHandler>) -> Self {
        Self {
            payload_type: PayloadType::of::<T>(),
            handler,
            undo,
        }
    }
}

/// Identifiers are dotted names such as `mount.slew`: non-empty, no
/// whitespace or control characters.
pub(crate) fn validate_identifier(command: &str) -> Result<(), DispatchError> {
    let valid = !command.is_empty()
        && !command
            .chars()
            .any(|c| c.is_whitespace() || c.is_control());

    if valid {
        Ok(())
    } else {
        Err(DispatchError::InvalidIdentifier(command.to_string()))
    }
}

#[derive(Default)]
pub(crate) struct CommandRegistry {
    commands: HashMap<String, RegisteredCommand>,
}

impl CommandRegistry {
    /// Store a handler pair, replacing any previous registration
    ///
    /// Returns true if an existing registration was overwritten.
    pub(crate) fn register(&mut self, command: &str, registered: RegisteredCommand) -> bool {
        self.commands
            .insert(command.to_string(), registered)
            .is_some()
    }

    pub(crate) fn unregister(&mut self, command: &str) -> bool {
        self.commands.remove(command).is_some()
    }

    pub(crate) fn is_registered(&self, command: &str) -> bool {
        self.commands.contains_key(command)
    }

    pub(crate) fn get(&self, command: &str) -> Option<&RegisteredCommand> {
        self.commands.get(command)
    }

    /// Look up a command, failing if it is unknown or takes another payload type
    pub(crate) fn resolve<T: Payload>(
        &self,
        command: &str,
    ) -> Result<&RegisteredCommand, DispatchError> {
        let registered = self
            .get(command)
            .ok_or_else(|| DispatchError::UnregisteredCommand(command.to_string()))?;
        registered.payload_type.check::<T>(command)?;
        Ok(registered)
    }

    /// Registered identifiers, sorted
    pub(crate) fn commands(&self) -> Vec<String> {
        let mut commands: Vec<String> = self.commands.keys().cloned().collect();
        commands.sort();
        commands
    }
}
