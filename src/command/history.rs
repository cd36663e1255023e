//! Bounded per-command payload history

use super::context::ExecutionId;
use super::payload::ErasedPayload;
use std::collections::{HashMap, VecDeque};

/// Payloads submitted per command identifier, in submission order
///
/// Entries are keyed by the execution id minted at submission, so an
/// execution that finishes late still lands in its submission slot. Each
/// log holds at most `max_size` entries; the oldest is evicted first.
pub(crate) struct HistoryStore {
    max_size: usize,
    entries: HashMap<String, VecDeque<(ExecutionId, ErasedPayload)>>,
}

impl HistoryStore {
    pub(crate) fn new(max_size: usize) -> Self {
        Self {
            max_size,
            entries: HashMap::new(),
        }
    }

    /// Insert a payload at its submission position, returning how many old
    /// entries were evicted
    pub(crate) fn record(
        &mut self,
        command: &str,
        sequence: ExecutionId,
        payload: ErasedPayload,
    ) -> usize {
        if self.max_size == 0 {
            return 0;
        }

        let log = self.entries.entry(command.to_string()).or_default();
        let position = log.partition_point(|(existing, _)| *existing < sequence);
        log.insert(position, (sequence, payload));

        let mut evicted = 0;
        while log.len() > self.max_size {
            log.pop_front();
            evicted += 1;
        }
        evicted
    }

    pub(crate) fn entries(&self, command: &str) -> impl Iterator<Item = &ErasedPayload> {
        self.entries
            .get(command)
            .into_iter()
            .flatten()
            .map(|(_, payload)| payload)
    }

    #[cfg(test)]
    pub(crate) fn len(&self, command: &str) -> usize {
        self.entries.get(command).map_or(0, VecDeque::len)
    }

    pub(crate) fn clear(&mut self) {
        self.entries.clear();
    }

    pub(crate) fn clear_command(&mut self, command: &str) -> bool {
        self.entries.remove(command).is_some()
    }
}
