//! Result handles and per-dispatch options

use super::context::ExecutionId;
use crate::error::DispatchError;
use lithium_shared::defaults;
use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;

/// Callback invoked with the outcome of a dispatch
pub type CompletionCallback<T> = Box<dyn FnOnce(&Result<T, DispatchError>) + Send>;

/// Optional parameters of a dispatch
pub struct DispatchOptions<T> {
    pub(crate) priority: i32,
    pub(crate) delay: Option<Duration>,
    pub(crate) callback: Option<CompletionCallback<T>>,
}

impl<T> Default for DispatchOptions<T> {
    fn default() -> Self {
        Self {
            priority: defaults::DEFAULT_PRIORITY,
            delay: None,
            callback: None,
        }
    }
}

impl<T> DispatchOptions<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Higher priorities run first
    pub fn priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Do not start before `delay` has elapsed
    pub fn delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Call `callback` with the outcome before the result handle resolves
    pub fn on_complete<F>(mut self, callback: F) -> Self
    where
        F: FnOnce(&Result<T, DispatchError>) + Send + 'static,
    {
        self.callback = Some(Box::new(callback));
        self
    }
}

/// Asynchronous handle to the outcome of one dispatch
///
/// Await it from async code, or call [`wait`](Self::wait) from a plain
/// thread. Dropping the handle does not cancel the execution.
#[derive(Debug)]
pub struct ResultHandle<T> {
    execution_id: ExecutionId,
    command: String,
    rx: oneshot::Receiver<Result<T, DispatchError>>,
}

impl<T> ResultHandle<T> {
    pub(crate) fn new(
        execution_id: ExecutionId,
        command: &str,
        rx: oneshot::Receiver<Result<T, DispatchError>>,
    ) -> Self {
        Self {
            execution_id,
            command: command.to_string(),
            rx,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Block the current thread until the execution finishes
    ///
    /// # Panics
    ///
    /// Panics if called from within an async execution context. Never call
    /// this from a handler or from a task on the event loop the dispatcher
    /// posts to: on a single-threaded loop it can never complete.
    pub fn wait(self) -> Result<T, DispatchError> {
        let command = self.command;
        self.rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(DispatchError::Abandoned(command)))
    }

    /// The outcome, if the execution has already finished
    pub fn try_result(&mut self) -> Option<Result<T, DispatchError>> {
        match self.rx.try_recv() {
            Ok(result) => Some(result),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => {
                Some(Err(DispatchError::Abandoned(self.command.clone())))
            }
        }
    }
}

impl<T> Future for ResultHandle<T> {
    type Output = Result<T, DispatchError>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::Abandoned(this.command.clone()))),
            Poll::Pending => Poll::Pending,
        }
    }
}
