//! Task-execution substrate the dispatcher hands handler invocations to

use futures::future::BoxFuture;
use std::time::Duration;
use tokio::runtime::{Handle, TryCurrentError};

/// A unit of work posted to an event loop
pub type Task = BoxFuture<'static, ()>;

/// Runs posted work, immediately or after a delay
///
/// Implementations must make progress on posted tasks without the poster
/// awaiting them. Delayed posting must use a timer, not a polling thread.
pub trait EventLoop: Send + Sync + 'static {
    /// Run `task` as soon as possible
    fn post(&self, task: Task);

    /// Run `task` once `delay` has elapsed
    fn post_delayed(&self, delay: Duration, task: Task);
}

/// Event loop backed by a tokio runtime
#[derive(Debug, Clone)]
pub struct TokioEventLoop {
    handle: Handle,
}

impl TokioEventLoop {
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Use the runtime the caller is running on
    pub fn current() -> Result<Self, TryCurrentError> {
        Handle::try_current().map(Self::new)
    }
}

impl EventLoop for TokioEventLoop {
    fn post(&self, task: Task) {
        self.handle.spawn(task);
    }

    fn post_delayed(&self, delay: Duration, task: Task) {
        self.handle.spawn(async move {
            tokio::time::sleep(delay).await;
            task.await;
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::FutureExt;
    use tokio::sync::oneshot;
    use tokio::time::Instant;

    #[tokio::test]
    async fn test_post_runs_task() {
        let event_loop = TokioEventLoop::current().expect("no runtime");
        let (tx, rx) = oneshot::channel();

        event_loop.post(
            async move {
                let _ = tx.send(7);
            }
            .boxed(),
        );

        assert_eq!(rx.await.expect("task dropped"), 7);
    }

    #[tokio::test]
    async fn test_post_delayed_waits() {
        let event_loop = TokioEventLoop::current().expect("no runtime");
        let (tx, rx) = oneshot::channel();
        let start = Instant::now();

        event_loop.post_delayed(
            Duration::from_millis(40),
            async move {
                let _ = tx.send(());
            }
            .boxed(),
        );

        rx.await.expect("task dropped");
        assert!(start.elapsed() >= Duration::from_millis(40));
    }

    #[test]
    fn test_current_outside_runtime() {
        assert!(TokioEventLoop::current().is_err());
    }
}
