//! Status tracking for command executions
//!
//! Records are keyed by [`ExecutionId`], so concurrent dispatches of the same
//! command keep separate state. Identifier-level queries report the most
//! recent execution of that command.

use super::context::ExecutionId;
use super::payload::ErasedPayload;
use crate::error::DispatchError;
use lithium_shared::{now_ms, CommandStatus, ExecutionEvent, TransitionResult};
use std::collections::{BTreeSet, HashMap};
use tracing::warn;

/// Lifecycle state and outcome of one dispatch
#[derive(Clone)]
pub(crate) struct ExecutionRecord {
    pub command: String,
    pub status: CommandStatus,
    pub result: Option<ErasedPayload>,
    pub error: Option<DispatchError>,
    /// Milliseconds since Unix epoch of the last status change
    pub timestamp: u64,
}

#[derive(Default)]
pub(crate) struct StatusTracker {
    records: HashMap<ExecutionId, ExecutionRecord>,
    latest: HashMap<String, ExecutionId>,
    running: usize,
}

impl StatusTracker {
    /// Start tracking a freshly admitted execution as PENDING
    pub(crate) fn insert_pending(&mut self, execution_id: ExecutionId, command: &str) {
        self.records.insert(
            execution_id,
            ExecutionRecord {
                command: command.to_string(),
                status: CommandStatus::Pending,
                result: None,
                error: None,
                timestamp: now_ms(),
            },
        );

        if let Some(previous) = self.latest.insert(command.to_string(), execution_id) {
            self.prune(previous);
        }
    }

    /// Apply a lifecycle event, returning the new status if the transition is valid
    pub(crate) fn transition(
        &mut self,
        execution_id: ExecutionId,
        event: ExecutionEvent,
    ) -> Option<CommandStatus> {
        let record = self.records.get_mut(&execution_id)?;
        let from = record.status;

        match from.apply(event) {
            TransitionResult::Success(to) => {
                record.status = to;
                record.timestamp = now_ms();

                if to == CommandStatus::Running {
                    self.running += 1;
                } else if from == CommandStatus::Running {
                    self.running -= 1;
                }
                Some(to)
            }
            TransitionResult::Invalid { from, event } => {
                warn!(
                    "Execution {} ({}): invalid transition {:?} from {}",
                    execution_id, record.command, event, from
                );
                None
            }
        }
    }

    /// Move an execution to its terminal state and store the outcome
    pub(crate) fn finish(
        &mut self,
        execution_id: ExecutionId,
        event: ExecutionEvent,
        outcome: &Result<ErasedPayload, DispatchError>,
    ) -> Option<CommandStatus> {
        let status = self.transition(execution_id, event)?;

        if let Some(record) = self.records.get_mut(&execution_id) {
            match outcome {
                Ok(value) => record.result = Some(value.clone()),
                Err(err) => record.error = Some(err.clone()),
            }
        }
        self.prune(execution_id);
        Some(status)
    }

    /// Drop a terminal record that is no longer the latest for its command
    fn prune(&mut self, execution_id: ExecutionId) {
        let Some(record) = self.records.get(&execution_id) else {
            return;
        };
        let superseded = self.latest.get(&record.command) != Some(&execution_id);
        if record.status.is_terminal() && superseded {
            self.records.remove(&execution_id);
        }
    }

    pub(crate) fn status(&self, execution_id: ExecutionId) -> CommandStatus {
        self.records
            .get(&execution_id)
            .map_or(CommandStatus::Unknown, |r| r.status)
    }

    #[cfg(test)]
    pub(crate) fn record(&self, execution_id: ExecutionId) -> Option<&ExecutionRecord> {
        self.records.get(&execution_id)
    }

    /// Most recent execution of a command
    pub(crate) fn latest(&self, command: &str) -> Option<ExecutionId> {
        self.latest.get(command).copied()
    }

    pub(crate) fn latest_record(&self, command: &str) -> Option<&ExecutionRecord> {
        self.latest(command).and_then(|id| self.records.get(&id))
    }

    /// Status of the most recent execution, or `Unknown` if never dispatched
    pub(crate) fn command_status(&self, command: &str) -> CommandStatus {
        self.latest_record(command)
            .map_or(CommandStatus::Unknown, |r| r.status)
    }

    /// Commands with at least one PENDING or RUNNING execution, sorted
    pub(crate) fn active_commands(&self) -> Vec<String> {
        self.records
            .values()
            .filter(|r| r.status.is_active())
            .map(|r| r.command.as_str())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Executions currently in RUNNING state
    pub(crate) fn running_count(&self) -> usize {
        self.running
    }
}
