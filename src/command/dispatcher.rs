//! Command dispatcher - admission control, scheduling and bookkeeping
//!
//! All mutable state lives behind a single reader/writer lock. Status and
//! history reads share the lock; registration, admission, status updates and
//! queue changes take it exclusively. Handlers never run under the lock: they
//! are posted to the event loop after the lock is released, and their
//! completions re-enter through [`Shared::on_handler_done`].

use super::context::{CancelSignal, CommandContext, ExecutionId};
use super::events::{ErasedSubscriber, EventBus, SubscriptionToken};
use super::handle::{DispatchOptions, ResultHandle};
use super::history::HistoryStore;
use super::payload::{erase, peek, recover, ErasedPayload, Payload};
use super::registry::{
    erase_handler, validate_identifier, CommandRegistry, ErasedHandler, RegisteredCommand,
};
use super::scheduler::PriorityScheduler;
use super::status::StatusTracker;
use super::timeout::TimeoutManager;
use crate::config::DispatcherConfig;
use crate::error::{ConfigError, DispatchError};
use crate::event_loop::EventLoop;
use futures::FutureExt;
use lithium_shared::{defaults, CommandResult, CommandStatus, ExecutionEvent};
use std::any::type_name;
use std::collections::HashMap;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::{Duration, Instant};
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

type Outcome = Result<ErasedPayload, DispatchError>;

/// Resolves the caller's result handle and runs its callback, once
struct Completion(Mutex<Box<dyn FnOnce(Outcome) + Send>>);

impl Completion {
    fn new(resolve: impl FnOnce(Outcome) + Send + 'static) -> Self {
        Self(Mutex::new(Box::new(resolve)))
    }

    fn resolve(self, outcome: Outcome) {
        let resolve = self.0.into_inner().unwrap_or_else(|e| e.into_inner());
        resolve(outcome);
    }
}

/// A request waiting in the scheduler
struct Job {
    command: String,
    payload: ErasedPayload,
    handler: ErasedHandler,
    cancel: CancelSignal,
    context: CommandContext,
    completion: Completion,
}

/// A request whose handler has been posted
struct InFlight {
    command: String,
    payload: ErasedPayload,
    cancel: CancelSignal,
    completion: Completion,
    timeout: Option<Duration>,
}

/// Work to post to the event loop once the lock is released
struct Launch {
    execution_id: ExecutionId,
    handler: ErasedHandler,
    payload: ErasedPayload,
    context: CommandContext,
    timeout: Option<Duration>,
}

/// A terminal outcome to deliver once the lock is released
struct Settled {
    completion: Completion,
    outcome: Outcome,
}

impl Settled {
    fn deliver(self) {
        self.completion.resolve(self.outcome);
    }
}

struct State {
    registry: CommandRegistry,
    history: HistoryStore,
    events: EventBus,
    status: StatusTracker,
    timeouts: TimeoutManager,
    scheduler: PriorityScheduler<Job>,
    running: HashMap<ExecutionId, InFlight>,
}

impl State {
    fn new(config: &DispatcherConfig) -> Self {
        Self {
            registry: CommandRegistry::default(),
            history: HistoryStore::new(config.max_history_size),
            events: EventBus::default(),
            status: StatusTracker::default(),
            timeouts: TimeoutManager::new(config.default_timeout),
            scheduler: PriorityScheduler::new(config.enable_priority),
            running: HashMap::new(),
        }
    }

    /// Start ready requests while concurrency slots are free
    fn start_ready(&mut self, max_concurrent: usize) -> Vec<Launch> {
        let mut launches = Vec::new();

        while self.status.running_count() < max_concurrent {
            let Some((execution_id, job)) = self.scheduler.pop_next() else {
                break;
            };

            if self
                .status
                .transition(execution_id, ExecutionEvent::Start)
                .is_none()
            {
                continue;
            }

            let timeout = self
                .timeouts
                .arm(execution_id, &job.command, Instant::now());

            debug!("Starting {} {}", job.command, execution_id);

            launches.push(Launch {
                execution_id,
                handler: job.handler,
                payload: job.payload.clone(),
                context: job.context,
                timeout,
            });
            self.running.insert(
                execution_id,
                InFlight {
                    command: job.command,
                    payload: job.payload,
                    cancel: job.cancel,
                    completion: job.completion,
                    timeout,
                },
            );
        }

        launches
    }

    /// Terminal bookkeeping shared by every outcome
    ///
    /// History gets the submitted payload; subscribers get the handler's
    /// result on success and the submitted payload otherwise.
    fn record_outcome(
        &mut self,
        execution_id: ExecutionId,
        command: &str,
        payload: &ErasedPayload,
        event: ExecutionEvent,
        outcome: &Outcome,
    ) {
        self.status.finish(execution_id, event, outcome);
        self.timeouts.disarm(execution_id);
        self.history.record(command, execution_id, payload.clone());

        let notified = match outcome {
            Ok(value) => value,
            Err(_) => payload,
        };
        self.events.notify(command, notified);
    }

    /// Finish a RUNNING execution
    fn settle_running(
        &mut self,
        execution_id: ExecutionId,
        event: ExecutionEvent,
        outcome: impl FnOnce(&InFlight) -> Outcome,
    ) -> Option<Settled> {
        let in_flight = self.running.remove(&execution_id)?;
        let outcome = outcome(&in_flight);

        if event != ExecutionEvent::Complete {
            in_flight.cancel.cancel();
        }

        self.record_outcome(
            execution_id,
            &in_flight.command,
            &in_flight.payload,
            event,
            &outcome,
        );

        Some(Settled {
            completion: in_flight.completion,
            outcome,
        })
    }

    /// Cancel a PENDING execution before its handler ever starts
    fn cancel_pending(&mut self, execution_id: ExecutionId) -> Option<Settled> {
        let job = self.scheduler.remove(execution_id)?;
        job.cancel.cancel();

        let outcome = Err(DispatchError::Cancelled(job.command.clone()));
        self.record_outcome(
            execution_id,
            &job.command,
            &job.payload,
            ExecutionEvent::Cancel,
            &outcome,
        );

        Some(Settled {
            completion: job.completion,
            outcome,
        })
    }
}

struct Shared {
    config: DispatcherConfig,
    event_loop: Arc<dyn EventLoop>,
    next_execution: AtomicU64,
    state: RwLock<State>,
}

impl Shared {
    // Poison is recovered; state updates never leave it half-applied.
    fn read(&self) -> RwLockReadGuard<'_, State> {
        self.state.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, State> {
        self.state.write().unwrap_or_else(|e| e.into_inner())
    }

    fn next_execution_id(&self) -> ExecutionId {
        ExecutionId(self.next_execution.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Post started handlers and arm their deadline watchers
    fn launch(self: &Arc<Self>, launches: Vec<Launch>) {
        for launch in launches {
            let Launch {
                execution_id,
                handler,
                payload,
                context,
                timeout,
            } = launch;

            if let Some(timeout) = timeout {
                self.watch_deadline(execution_id, timeout);
            }

            let weak = Arc::downgrade(self);
            self.event_loop.post(
                async move {
                    if context.is_cancelled() {
                        debug!("{} cancelled before its handler ran", execution_id);
                        return;
                    }

                    let result = invoke(handler, payload, context).await;

                    if let Some(shared) = weak.upgrade() {
                        shared.on_handler_done(execution_id, result);
                    }
                }
                .boxed(),
            );
        }
    }

    fn watch_deadline(self: &Arc<Self>, execution_id: ExecutionId, after: Duration) {
        let weak = Arc::downgrade(self);
        self.event_loop.post_delayed(
            after,
            async move {
                if let Some(shared) = weak.upgrade() {
                    shared.on_deadline(execution_id);
                }
            }
            .boxed(),
        );
    }

    fn on_handler_done(
        self: &Arc<Self>,
        execution_id: ExecutionId,
        result: anyhow::Result<ErasedPayload>,
    ) {
        let (settled, launches) = {
            let mut state = self.write();

            if state.status.status(execution_id) != CommandStatus::Running {
                debug!("{} finished after reaching a terminal state", execution_id);
                return;
            }

            let settled = match result {
                Ok(value) => {
                    state.settle_running(execution_id, ExecutionEvent::Complete, |_| Ok(value))
                }
                Err(err) => state.settle_running(execution_id, ExecutionEvent::Fail, |in_flight| {
                    Err(DispatchError::HandlerFailure {
                        command: in_flight.command.clone(),
                        message: format!("{:#}", err),
                    })
                }),
            };
            let launches = state.start_ready(self.config.max_concurrent_commands);
            (settled, launches)
        };

        if let Some(settled) = settled {
            match &settled.outcome {
                Ok(_) => debug!("{} completed", execution_id),
                Err(err) => warn!("{} failed: {}", execution_id, err),
            }
            settled.deliver();
        }
        self.launch(launches);
    }

    fn on_deadline(self: &Arc<Self>, execution_id: ExecutionId) {
        let (settled, launches) = {
            let mut state = self.write();

            if state.status.status(execution_id) != CommandStatus::Running {
                return;
            }

            let now = Instant::now();
            if !state.timeouts.is_expired(execution_id, now) {
                // Timer fired early; wait out the rest
                let remaining = state.timeouts.remaining(execution_id, now);
                drop(state);
                if let Some(remaining) = remaining {
                    self.watch_deadline(execution_id, remaining);
                }
                return;
            }

            let settled = state.settle_running(execution_id, ExecutionEvent::Fail, |in_flight| {
                Err(DispatchError::Timeout {
                    command: in_flight.command.clone(),
                    timeout: in_flight.timeout.unwrap_or_default(),
                })
            });
            let launches = state.start_ready(self.config.max_concurrent_commands);
            (settled, launches)
        };

        if let Some(settled) = settled {
            warn!("{} timed out", execution_id);
            settled.deliver();
        }
        self.launch(launches);
    }

    /// A delayed request reached its readiness time
    fn on_ready(self: &Arc<Self>, execution_id: ExecutionId) {
        let launches = {
            let mut state = self.write();
            if !state.scheduler.promote(execution_id) {
                return;
            }
            state.start_ready(self.config.max_concurrent_commands)
        };
        self.launch(launches);
    }

    fn cancel(self: &Arc<Self>, execution_id: ExecutionId) -> bool {
        let (settled, launches) = {
            let mut state = self.write();

            let settled = match state.status.status(execution_id) {
                CommandStatus::Pending => state.cancel_pending(execution_id),
                CommandStatus::Running => {
                    state.settle_running(execution_id, ExecutionEvent::Cancel, |in_flight| {
                        Err(DispatchError::Cancelled(in_flight.command.clone()))
                    })
                }
                _ => None,
            };

            let Some(settled) = settled else {
                return false;
            };
            (settled, state.start_ready(self.config.max_concurrent_commands))
        };

        info!("Cancelled {}", execution_id);
        settled.deliver();
        self.launch(launches);
        true
    }
}

/// Call a handler, turning a panic into an ordinary handler error
async fn invoke(
    handler: ErasedHandler,
    payload: ErasedPayload,
    context: CommandContext,
) -> anyhow::Result<ErasedPayload> {
    AssertUnwindSafe(async move { handler(payload, context).await })
        .catch_unwind()
        .await
        .unwrap_or_else(|_| Err(anyhow::anyhow!("handler panicked")))
}

/// Concurrent command dispatcher
///
/// Cheap to clone: clones share one registry, queue, history and event bus.
/// Build one per process and hand it to every module that registers
/// commands.
///
/// # Reentrancy
///
/// Subscriber callbacks run while the dispatcher's lock is held. They must
/// not call back into the dispatcher; defer such work to the event loop.
/// Likewise, never block on a result ([`quick_dispatch`], [`ResultHandle::wait`])
/// from inside a handler running on the same event loop.
///
/// [`quick_dispatch`]: CommandDispatcher::quick_dispatch
#[derive(Clone)]
pub struct CommandDispatcher {
    shared: Arc<Shared>,
}

impl CommandDispatcher {
    /// Create a dispatcher that posts handler invocations to `event_loop`
    pub fn new(event_loop: Arc<dyn EventLoop>, config: DispatcherConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        info!(
            "Command dispatcher ready: max_concurrent={} default_timeout={}ms history={} priority={}",
            config.max_concurrent_commands,
            config.default_timeout.as_millis(),
            config.max_history_size,
            config.enable_priority
        );

        Ok(Self {
            shared: Arc::new(Shared {
                state: RwLock::new(State::new(&config)),
                config,
                event_loop,
                next_execution: AtomicU64::new(0),
            }),
        })
    }

    pub fn config(&self) -> &DispatcherConfig {
        &self.shared.config
    }

    // ------------------------------------------------------------------
    // Registry
    // ------------------------------------------------------------------

    /// Register the handler for `command`
    ///
    /// Registering an identifier that already exists replaces the previous
    /// handler (and drops its undo handler); it is not an error. Requests
    /// already queued keep the handler they were admitted with.
    pub fn register<T, F, Fut>(&self, command: &str, handler: F) -> Result<(), DispatchError>
    where
        T: Payload,
        F: Fn(T, CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert_command(
            command,
            RegisteredCommand::new::<T>(erase_handler(handler), None),
        )
    }

    /// Register a handler together with its inverse
    pub fn register_with_undo<T, F, Fut, U, UFut>(
        &self,
        command: &str,
        handler: F,
        undo: U,
    ) -> Result<(), DispatchError>
    where
        T: Payload,
        F: Fn(T, CommandContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        U: Fn(T, CommandContext) -> UFut + Send + Sync + 'static,
        UFut: Future<Output = anyhow::Result<T>> + Send + 'static,
    {
        self.insert_command(
            command,
            RegisteredCommand::new::<T>(erase_handler(handler), Some(erase_handler(undo))),
        )
    }

    fn insert_command(&self, command: &str, registered: RegisteredCommand) -> Result<(), DispatchError> {
        validate_identifier(command)?;

        let payload_type = registered.payload_type.name();
        let replaced = self.shared.write().registry.register(command, registered);

        if replaced {
            warn!("Command {} re-registered; previous handler replaced", command);
        } else {
            info!("Registered command {} ({})", command, payload_type);
        }
        Ok(())
    }

    /// Remove a command's handlers; no-op if absent
    pub fn unregister(&self, command: &str) -> bool {
        let removed = self.shared.write().registry.unregister(command);
        if removed {
            info!("Unregistered command {}", command);
        }
        removed
    }

    pub fn is_registered(&self, command: &str) -> bool {
        self.shared.read().registry.is_registered(command)
    }

    /// Registered identifiers, sorted
    pub fn registered_commands(&self) -> Vec<String> {
        self.shared.read().registry.commands()
    }

    // ------------------------------------------------------------------
    // Dispatch
    // ------------------------------------------------------------------

    /// Dispatch `payload` to the handler of `command`
    ///
    /// Unknown commands and payload type mismatches are rejected here, before
    /// anything is queued. Everything that happens afterwards, including
    /// handler errors, timeouts and cancellation, is reported through the
    /// returned handle.
    pub fn dispatch<T: Payload>(
        &self,
        command: &str,
        payload: T,
        priority: i32,
    ) -> Result<ResultHandle<T>, DispatchError> {
        self.dispatch_with(command, payload, DispatchOptions::new().priority(priority))
    }

    /// Dispatch with a delay and/or completion callback
    pub fn dispatch_with<T: Payload>(
        &self,
        command: &str,
        payload: T,
        options: DispatchOptions<T>,
    ) -> Result<ResultHandle<T>, DispatchError> {
        let DispatchOptions {
            priority,
            delay,
            callback,
        } = options;
        let delay = delay.filter(|d| !d.is_zero());

        let (tx, rx) = oneshot::channel();
        let name = command.to_string();
        let completion = Completion::new(move |outcome: Outcome| {
            let result = outcome.and_then(|value| {
                recover::<T>(value).ok_or(DispatchError::TypeMismatch {
                    command: name,
                    expected: type_name::<T>(),
                    found: "unknown",
                })
            });
            if let Some(callback) = callback {
                callback(&result);
            }
            // The caller may have dropped the handle
            let _ = tx.send(result);
        });

        let (execution_id, launches) = {
            let mut state = self.shared.write();

            let handler = Arc::clone(&state.registry.resolve::<T>(command)?.handler);
            let execution_id = self.shared.next_execution_id();

            let (cancel, cancel_rx) = CancelSignal::new();
            let job = Job {
                command: command.to_string(),
                payload: erase(payload),
                handler,
                cancel,
                context: CommandContext::new(execution_id, command, cancel_rx),
                completion,
            };

            state.status.insert_pending(execution_id, command);
            if delay.is_some() {
                state.scheduler.defer(execution_id, priority, job);
            } else {
                state.scheduler.enqueue(execution_id, priority, job);
            }

            let launches = state.start_ready(self.shared.config.max_concurrent_commands);
            (execution_id, launches)
        };

        debug!(
            "Dispatched {} {} (priority={}, delay={:?})",
            command, execution_id, priority, delay
        );

        if let Some(delay) = delay {
            let weak = Arc::downgrade(&self.shared);
            self.shared.event_loop.post_delayed(
                delay,
                async move {
                    if let Some(shared) = weak.upgrade() {
                        shared.on_ready(execution_id);
                    }
                }
                .boxed(),
            );
        }
        self.shared.launch(launches);

        Ok(ResultHandle::new(execution_id, command, rx))
    }

    /// Dispatch each entry independently at a shared priority
    ///
    /// There is no atomicity across the batch: each entry is admitted,
    /// rejected, ordered and executed on its own.
    pub fn batch_dispatch<T, S, I>(
        &self,
        entries: I,
        priority: i32,
    ) -> Vec<Result<ResultHandle<T>, DispatchError>>
    where
        T: Payload,
        S: AsRef<str>,
        I: IntoIterator<Item = (S, T)>,
    {
        entries
            .into_iter()
            .map(|(command, payload)| self.dispatch(command.as_ref(), payload, priority))
            .collect()
    }

    /// Dispatch at default priority and block until the outcome is known
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context. Call it from
    /// a plain thread (e.g. `spawn_blocking`), never from a handler.
    pub fn quick_dispatch<T: Payload>(&self, command: &str, payload: T) -> Result<T, DispatchError> {
        self.dispatch(command, payload, defaults::DEFAULT_PRIORITY)?
            .wait()
    }

    /// Cancel the most recent execution of `command`
    ///
    /// A PENDING execution is removed and its handler never runs. A RUNNING
    /// execution is marked CANCELLED and its handle resolves immediately;
    /// the handler only sees the signal on its [`CommandContext`] and any
    /// result it produces later is discarded. Returns false if the most
    /// recent execution is not active.
    pub fn cancel_command(&self, command: &str) -> bool {
        let latest = self.shared.read().status.latest(command);
        match latest {
            Some(execution_id) => self.shared.cancel(execution_id),
            None => false,
        }
    }

    /// Cancel one specific execution
    pub fn cancel_execution(&self, execution_id: ExecutionId) -> bool {
        self.shared.cancel(execution_id)
    }

    /// Override the default timeout for future executions of `command`
    ///
    /// `Duration::ZERO` disables the deadline.
    pub fn set_timeout(&self, command: &str, timeout: Duration) {
        self.shared.write().timeouts.set_timeout(command, timeout);
        debug!("Timeout for {} set to {}ms", command, timeout.as_millis());
    }

    pub fn timeout_for(&self, command: &str) -> Duration {
        self.shared.read().timeouts.timeout_for(command)
    }

    // ------------------------------------------------------------------
    // Status
    // ------------------------------------------------------------------

    /// Status of the most recent execution of `command`
    pub fn get_command_status(&self, command: &str) -> CommandStatus {
        self.shared.read().status.command_status(command)
    }

    pub fn get_execution_status(&self, execution_id: ExecutionId) -> CommandStatus {
        self.shared.read().status.status(execution_id)
    }

    /// Commands with a PENDING or RUNNING execution, sorted
    pub fn get_active_commands(&self) -> Vec<String> {
        self.shared.read().status.active_commands()
    }

    /// Outcome of the most recent execution of `command`
    ///
    /// `result` is empty unless the execution completed with a `T`.
    pub fn get_command_result<T: Payload>(&self, command: &str) -> Option<CommandResult<T>> {
        let state = self.shared.read();
        let record = state.status.latest_record(command)?;

        Some(CommandResult {
            status: record.status,
            result: record.result.as_ref().and_then(|v| peek::<T>(v).cloned()),
            error: record.error.as_ref().map(ToString::to_string),
            timestamp: record.timestamp,
        })
    }

    pub fn running_count(&self) -> usize {
        self.shared.read().status.running_count()
    }

    /// Requests waiting for a slot or for their delay to elapse
    pub fn pending_count(&self) -> usize {
        let state = self.shared.read();
        state.scheduler.ready_len() + state.scheduler.delayed_len()
    }

    // ------------------------------------------------------------------
    // History
    // ------------------------------------------------------------------

    /// Append a payload to the history of a registered command
    pub fn record_history<T: Payload>(&self, command: &str, payload: T) -> Result<(), DispatchError> {
        let sequence = self.shared.next_execution_id();
        let mut state = self.shared.write();
        state.registry.resolve::<T>(command)?;
        state.history.record(command, sequence, erase(payload));
        Ok(())
    }

    /// Payloads recorded for `command`, oldest first
    pub fn get_command_history<T: Payload>(&self, command: &str) -> Result<Vec<T>, DispatchError> {
        let state = self.shared.read();

        if let Some(registered) = state.registry.get(command) {
            registered.payload_type.check::<T>(command)?;
        }

        state
            .history
            .entries(command)
            .map(|entry| {
                peek::<T>(entry)
                    .cloned()
                    .ok_or_else(|| DispatchError::TypeMismatch {
                        command: command.to_string(),
                        expected: type_name::<T>(),
                        found: "unknown",
                    })
            })
            .collect()
    }

    pub fn clear_history(&self) {
        self.shared.write().history.clear();
    }

    pub fn clear_command_history(&self, command: &str) -> bool {
        self.shared.write().history.clear_command(command)
    }

    // ------------------------------------------------------------------
    // Undo / redo
    // ------------------------------------------------------------------

    /// Run the undo handler of `command` inline on the caller's task
    ///
    /// Unlike dispatch, this bypasses the scheduler, the concurrency budget
    /// and the timeout manager, and does not touch status tracking. On
    /// success the payload is recorded in the command's history.
    pub async fn undo<T: Payload>(&self, command: &str, payload: T) -> Result<T, DispatchError> {
        let handler = self.inline_handler::<T>(command, true)?;
        info!("Undo {}", command);
        self.run_inline(command, handler, payload).await
    }

    /// Re-run the forward handler of `command` inline, like [`undo`](Self::undo)
    pub async fn redo<T: Payload>(&self, command: &str, payload: T) -> Result<T, DispatchError> {
        let handler = self.inline_handler::<T>(command, false)?;
        info!("Redo {}", command);
        self.run_inline(command, handler, payload).await
    }

    fn inline_handler<T: Payload>(&self, command: &str, undo: bool) -> Result<ErasedHandler, DispatchError> {
        let state = self.shared.read();
        let registered = state.registry.resolve::<T>(command)?;

        if undo {
            registered
                .undo
                .clone()
                .ok_or_else(|| DispatchError::NoUndoHandler(command.to_string()))
        } else {
            Ok(Arc::clone(&registered.handler))
        }
    }

    async fn run_inline<T: Payload>(
        &self,
        command: &str,
        handler: ErasedHandler,
        payload: T,
    ) -> Result<T, DispatchError> {
        let execution_id = self.shared.next_execution_id();
        let (_cancel, cancel_rx) = CancelSignal::new();
        let context = CommandContext::new(execution_id, command, cancel_rx);
        let submitted = erase(payload);

        let value = invoke(handler, submitted.clone(), context)
            .await
            .map_err(|err| DispatchError::HandlerFailure {
                command: command.to_string(),
                message: format!("{:#}", err),
            })?;

        self.shared.write().history.record(command, execution_id, submitted);

        recover::<T>(value).ok_or(DispatchError::TypeMismatch {
            command: command.to_string(),
            expected: type_name::<T>(),
            found: "unknown",
        })
    }

    // ------------------------------------------------------------------
    // Events
    // ------------------------------------------------------------------

    /// Observe every finished dispatch of `command`
    ///
    /// The callback runs once per dispatch, synchronously, while the
    /// dispatcher's lock is held; see the reentrancy note on
    /// [`CommandDispatcher`].
    pub fn subscribe<T, F>(&self, command: &str, callback: F) -> SubscriptionToken
    where
        T: Payload,
        F: Fn(&T) + Send + Sync + 'static,
    {
        let subscriber: ErasedSubscriber = Arc::new(move |payload: &ErasedPayload| {
            match peek::<T>(payload) {
                Some(value) => {
                    callback(value);
                    true
                }
                None => false,
            }
        });

        let token = self.shared.write().events.subscribe(command, subscriber);
        debug!("Subscription {} added on {}", token, command);
        token
    }

    pub fn unsubscribe(&self, command: &str, token: SubscriptionToken) -> bool {
        let removed = self.shared.write().events.unsubscribe(command, token);
        if removed {
            debug!("Subscription {} removed from {}", token, command);
        }
        removed
    }

    /// Push a payload to the subscribers of `command` outside of a dispatch
    ///
    /// Returns the number of subscribers that received it.
    pub fn notify_subscribers<T: Payload>(&self, command: &str, payload: &T) -> usize {
        let payload = erase(payload.clone());
        self.shared.read().events.notify(command, &payload)
    }

    pub fn subscriber_count(&self, command: &str) -> usize {
        self.shared.read().events.subscriber_count(command)
    }
}
