//! Invocation context handed to command handlers

use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;

/// Unique handle for one dispatch call
///
/// Ids are minted from a monotonic counter, so they also order executions
/// by submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ExecutionId(pub(crate) u64);

impl ExecutionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Sending side of the cooperative cancellation signal
#[derive(Debug)]
pub(crate) struct CancelSignal {
    tx: watch::Sender<bool>,
}

impl CancelSignal {
    pub(crate) fn new() -> (Self, watch::Receiver<bool>) {
        let (tx, rx) = watch::channel(false);
        (Self { tx }, rx)
    }

    pub(crate) fn cancel(&self) {
        self.tx.send_replace(true);
    }
}

/// Context passed to command handlers alongside the payload
///
/// Cancellation is cooperative: the dispatcher never interrupts a handler,
/// it only raises this signal. Long-running handlers should poll
/// [`is_cancelled`](Self::is_cancelled) or race their work against
/// [`cancelled`](Self::cancelled).
#[derive(Debug, Clone)]
pub struct CommandContext {
    execution_id: ExecutionId,
    command: Arc<str>,
    cancel: watch::Receiver<bool>,
}

impl CommandContext {
    pub(crate) fn new(
        execution_id: ExecutionId,
        command: &str,
        cancel: watch::Receiver<bool>,
    ) -> Self {
        Self {
            execution_id,
            command: Arc::from(command),
            cancel,
        }
    }

    pub fn execution_id(&self) -> ExecutionId {
        self.execution_id
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    /// Check if cancellation (or a timeout) has been requested
    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// Resolve once cancellation is requested
    ///
    /// Never resolves if the execution finishes without being cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.cancel.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Signal dropped without cancelling
                std::future::pending::<()>().await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn test_cancel_signal() {
        let (signal, rx) = CancelSignal::new();
        let ctx = CommandContext::new(ExecutionId(1), "dome.shutter", rx);
        assert!(!ctx.is_cancelled());
        assert_eq!(ctx.command(), "dome.shutter");

        let waiter = {
            let ctx = ctx.clone();
            tokio::spawn(async move { ctx.cancelled().await })
        };

        signal.cancel();
        tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .expect("cancelled() did not resolve")
            .expect("waiter panicked");
        assert!(ctx.is_cancelled());
    }

    #[tokio::test]
    async fn test_cancel_visible_after_signal_dropped() {
        let (signal, rx) = CancelSignal::new();
        let ctx = CommandContext::new(ExecutionId(2), "mount.slew", rx);

        signal.cancel();
        drop(signal);

        assert!(ctx.is_cancelled());
        tokio::time::timeout(Duration::from_millis(100), ctx.cancelled())
            .await
            .expect("cancelled() should resolve immediately");
    }

    #[tokio::test]
    async fn test_uncancelled_never_resolves() {
        let (signal, rx) = CancelSignal::new();
        let ctx = CommandContext::new(ExecutionId(3), "mount.slew", rx);
        drop(signal);

        let result = tokio::time::timeout(Duration::from_millis(30), ctx.cancelled()).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_execution_id_order() {
        assert!(ExecutionId(1) < ExecutionId(2));
        assert_eq!(ExecutionId(9).to_string(), "#9");
    }
}
