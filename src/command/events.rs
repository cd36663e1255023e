//! Per-command publish/subscribe

use super::payload::ErasedPayload;
use std::collections::HashMap;
use std::fmt;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use tracing::warn;

/// Opaque handle for removing a subscription
///
/// Tokens come from a counter that is never reset, so each is unique for
/// the lifetime of the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionToken(pub(crate) u64);

impl SubscriptionToken {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl From<u64> for SubscriptionToken {
    fn from(raw: u64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for SubscriptionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "sub-{}", self.0)
    }
}

/// Erased subscriber; returns false if the payload was not the type it expects
pub(crate) type ErasedSubscriber = Arc<dyn Fn(&ErasedPayload) -> bool + Send + Sync>;

#[derive(Default)]
pub(crate) struct EventBus {
    next_token: u64,
    subscribers: HashMap<String, Vec<(SubscriptionToken, ErasedSubscriber)>>,
}

impl EventBus {
    pub(crate) fn subscribe(
        &mut self,
        command: &str,
        subscriber: ErasedSubscriber,
    ) -> SubscriptionToken {
        self.next_token += 1;
        let token = SubscriptionToken(self.next_token);
        self.subscribers
            .entry(command.to_string())
            .or_default()
            .push((token, subscriber));
        token
    }

    /// Remove exactly one subscription
    pub(crate) fn unsubscribe(&mut self, command: &str, token: SubscriptionToken) -> bool {
        let Some(list) = self.subscribers.get_mut(command) else {
            return false;
        };

        let before = list.len();
        list.retain(|(t, _)| *t != token);
        let removed = list.len() != before;

        if list.is_empty() {
            self.subscribers.remove(command);
        }
        removed
    }

    /// Call every subscriber of `command`, in subscription order
    ///
    /// Returns the number of subscribers that accepted the payload. A
    /// subscriber that panics is logged and skipped.
    pub(crate) fn notify(&self, command: &str, payload: &ErasedPayload) -> usize {
        let Some(list) = self.subscribers.get(command) else {
            return 0;
        };

        let mut delivered = 0;
        for (token, subscriber) in list {
            match catch_unwind(AssertUnwindSafe(|| subscriber(payload))) {
                Ok(true) => delivered += 1,
                Ok(false) => warn!(
                    "Subscriber {} on {} skipped: payload type mismatch",
                    token, command
                ),
                Err(_) => warn!("Subscriber {} on {} panicked", token, command),
            }
        }
        delivered
    }

    pub(crate) fn subscriber_count(&self, command: &str) -> usize {
        self.subscribers.get(command).map_or(0, Vec::len)
    }
}
