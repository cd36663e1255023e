//! Lithium command dispatch engine
//!
//! A concurrent scheduler for typed command handlers. Callers register a
//! handler per command identifier, then dispatch payloads with a priority and
//! optional delay. The engine orders pending work, enforces a global
//! concurrency budget and per-command timeouts, supports cooperative
//! cancellation, keeps a bounded payload history for undo/redo and auditing,
//! and notifies per-command subscribers once per dispatch.
//!
//! Handler execution is delegated to an [`EventLoop`]; the dispatcher only
//! does admission control, ordering and bookkeeping.

pub mod command;
pub mod config;
pub mod error;
pub mod event_loop;

pub use command::{
    CommandContext, CommandDispatcher, DispatchOptions, ExecutionId, Payload, ResultHandle,
    SubscriptionToken,
};
pub use config::DispatcherConfig;
pub use error::{ConfigError, DispatchError};
pub use event_loop::{EventLoop, TokioEventLoop};
pub use lithium_shared::{CommandResult, CommandStatus};
