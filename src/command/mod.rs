//! Command dispatch engine
//!
//! This module handles:
//! - Registering typed handlers (and optional undo handlers) per identifier
//! - Ordering pending dispatches by priority and submission order
//! - Enforcing the concurrency budget and per-command timeouts
//! - Tracking execution status, payload history and subscriptions

mod context;
mod dispatcher;
mod events;
mod handle;
mod history;
mod payload;
mod registry;
mod scheduler;
mod status;
mod timeout;


pub use context::{CommandContext, ExecutionId};
pub use dispatcher::CommandDispatcher;
pub use events::SubscriptionToken;
pub use handle::{CompletionCallback, DispatchOptions, ResultHandle};
pub use payload::Payload;
