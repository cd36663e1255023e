//! Priority ordering of pending dispatch requests

use super::context::ExecutionId;
use std::cmp::Reverse;
use std::collections::{BTreeMap, HashMap};

/// Ordering key: highest priority first, then earliest submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct QueueKey {
    priority: Reverse<i32>,
    sequence: ExecutionId,
}

/// Pending requests, split into ready work and work waiting out a delay
///
/// Delayed entries are not eligible for a concurrency slot until
/// [`promote`](Self::promote) moves them to the ready queue. They keep their
/// original submission sequence, so a promoted entry still sorts by when it
/// was dispatched.
pub(crate) struct PriorityScheduler<J> {
    enable_priority: bool,
    ready: BTreeMap<QueueKey, J>,
    delayed: HashMap<ExecutionId, (i32, J)>,
    keys: HashMap<ExecutionId, QueueKey>,
}

impl<J> PriorityScheduler<J> {
    pub(crate) fn new(enable_priority: bool) -> Self {
        Self {
            enable_priority,
            ready: BTreeMap::new(),
            delayed: HashMap::new(),
            keys: HashMap::new(),
        }
    }

    /// Queue a request that may run as soon as a slot is free
    pub(crate) fn enqueue(&mut self, execution_id: ExecutionId, priority: i32, job: J) {
        let key = QueueKey {
            priority: Reverse(if self.enable_priority { priority } else { 0 }),
            sequence: execution_id,
        };
        self.keys.insert(execution_id, key);
        self.ready.insert(key, job);
    }

    /// Hold a request until its readiness time has elapsed
    pub(crate) fn defer(&mut self, execution_id: ExecutionId, priority: i32, job: J) {
        self.delayed.insert(execution_id, (priority, job));
    }

    /// Move a delayed request to the ready queue
    ///
    /// Returns false if the request is no longer waiting (e.g. cancelled).
    pub(crate) fn promote(&mut self, execution_id: ExecutionId) -> bool {
        match self.delayed.remove(&execution_id) {
            Some((priority, job)) => {
                self.enqueue(execution_id, priority, job);
                true
            }
            None => false,
        }
    }

    /// Take the next ready request
    pub(crate) fn pop_next(&mut self) -> Option<(ExecutionId, J)> {
        let (key, job) = self.ready.pop_first()?;
        self.keys.remove(&key.sequence);
        Some((key.sequence, job))
    }

    /// Remove a request that has not started, ready or delayed
    pub(crate) fn remove(&mut self, execution_id: ExecutionId) -> Option<J> {
        if let Some((_, job)) = self.delayed.remove(&execution_id) {
            return Some(job);
        }
        let key = self.keys.remove(&execution_id)?;
        self.ready.remove(&key)
    }

    pub(crate) fn ready_len(&self) -> usize {
        self.ready.len()
    }

    pub(crate) fn delayed_len(&self) -> usize {
        self.delayed.len()
    }

    #[cfg(test)]
    pub(crate) fn is_empty(&self) -> bool {
        self.ready.is_empty() && self.delayed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn drain(scheduler: &mut PriorityScheduler<&'static str>) -> Vec<&'static str> {
        std::iter::from_fn(|| scheduler.pop_next().map(|(_, job)| job)).collect()
    }

    #[test]
    fn test_priority_order() {
        let mut scheduler = PriorityScheduler::new(true);
        scheduler.enqueue(ExecutionId(1), 1, "low");
        scheduler.enqueue(ExecutionId(2), 5, "high");
        scheduler.enqueue(ExecutionId(3), 3, "mid");

        assert_eq!(drain(&mut scheduler), vec!["high", "mid", "low"]);
    }

    #[test]
    fn test_equal_priority_is_fifo() {
        let mut scheduler = PriorityScheduler::new(true);
        // Submission order decides, not identifier text
        scheduler.enqueue(ExecutionId(1), 2, "zeta");
        scheduler.enqueue(ExecutionId(2), 2, "alpha");
        scheduler.enqueue(ExecutionId(3), 2, "mid");

        assert_eq!(drain(&mut scheduler), vec!["zeta", "alpha", "mid"]);
    }

    #[test]
    fn test_priority_disabled() {
        let mut scheduler = PriorityScheduler::new(false);
        scheduler.enqueue(ExecutionId(1), 1, "first");
        scheduler.enqueue(ExecutionId(2), 9, "second");
        scheduler.enqueue(ExecutionId(3), -4, "third");

        assert_eq!(drain(&mut scheduler), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_delayed_not_ready_until_promoted() {
        let mut scheduler = PriorityScheduler::new(true);
        scheduler.defer(ExecutionId(1), 10, "delayed");
        scheduler.enqueue(ExecutionId(2), 0, "now");

        assert_eq!(scheduler.delayed_len(), 1);
        assert_eq!(scheduler.pop_next().map(|(_, j)| j), Some("now"));
        assert!(scheduler.pop_next().is_none());

        assert!(scheduler.promote(ExecutionId(1)));
        assert!(!scheduler.promote(ExecutionId(1)));
        assert_eq!(scheduler.pop_next(), Some((ExecutionId(1), "delayed")));
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_remove() {
        let mut scheduler = PriorityScheduler::new(true);
        scheduler.enqueue(ExecutionId(1), 0, "a");
        scheduler.enqueue(ExecutionId(2), 0, "b");
        scheduler.defer(ExecutionId(3), 0, "c");

        assert_eq!(scheduler.remove(ExecutionId(1)), Some("a"));
        assert_eq!(scheduler.remove(ExecutionId(3)), Some("c"));
        assert_eq!(scheduler.remove(ExecutionId(1)), None);
        assert!(!scheduler.promote(ExecutionId(3)));

        assert_eq!(scheduler.ready_len(), 1);
        assert_eq!(drain(&mut scheduler), vec!["b"]);
    }
}
