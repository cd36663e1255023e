//! Deadline tracking for running executions

use super::context::ExecutionId;
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Per-command timeout overrides and the deadlines of running executions
///
/// The manager only does the bookkeeping; the dispatcher arms a delayed task
/// on the event loop for each deadline and asks [`is_expired`] when it fires.
///
/// [`is_expired`]: TimeoutManager::is_expired
pub(crate) struct TimeoutManager {
    default_timeout: Duration,
    overrides: HashMap<String, Duration>,
    deadlines: HashMap<ExecutionId, Instant>,
}

impl TimeoutManager {
    pub(crate) fn new(default_timeout: Duration) -> Self {
        Self {
            default_timeout,
            overrides: HashMap::new(),
            deadlines: HashMap::new(),
        }
    }

    /// Override the timeout for future executions of `command`
    pub(crate) fn set_timeout(&mut self, command: &str, timeout: Duration) {
        self.overrides.insert(command.to_string(), timeout);
    }

    pub(crate) fn timeout_for(&self, command: &str) -> Duration {
        self.overrides
            .get(command)
            .copied()
            .unwrap_or(self.default_timeout)
    }

    /// Record the deadline of an execution that just started
    ///
    /// Returns the timeout to watch for, or `None` when the command has a
    /// zero timeout (no deadline).
    pub(crate) fn arm(
        &mut self,
        execution_id: ExecutionId,
        command: &str,
        started_at: Instant,
    ) -> Option<Duration> {
        let timeout = self.timeout_for(command);
        if timeout.is_zero() {
            return None;
        }
        self.deadlines.insert(execution_id, started_at + timeout);
        Some(timeout)
    }

    pub(crate) fn disarm(&mut self, execution_id: ExecutionId) {
        self.deadlines.remove(&execution_id);
    }

    pub(crate) fn is_expired(&self, execution_id: ExecutionId, now: Instant) -> bool {
        self.deadlines
            .get(&execution_id)
            .is_some_and(|deadline| now >= *deadline)
    }

    /// Time left before the deadline, if the execution is armed
    pub(crate) fn remaining(&self, execution_id: ExecutionId, now: Instant) -> Option<Duration> {
        self.deadlines
            .get(&execution_id)
            .map(|deadline| deadline.saturating_duration_since(now))
    }

    #[cfg(test)]
    pub(crate) fn armed_count(&self) -> usize {
        self.deadlines.len()
    }
}
