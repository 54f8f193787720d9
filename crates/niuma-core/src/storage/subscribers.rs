//! Per-key subscriber bookkeeping shared by store implementations.

use std::sync::{Mutex, PoisonError};

use serde_json::Value;

use super::{ChangeCallback, SubscriptionId};

/// Thread-safe list of `(key, callback)` subscriptions.
///
/// [`notify`](Self::notify) copies the matching callbacks out before invoking
/// them, so a callback may subscribe, unsubscribe or write to the store
/// without deadlocking.
#[derive(Default)]
pub struct SubscriberList {
    entries: Mutex<Vec<(SubscriptionId, String, ChangeCallback)>>,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, key: &str, callback: ChangeCallback) -> SubscriptionId {
        let id = SubscriptionId::new();
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, key.to_string(), callback));
        id
    }

    /// Returns `true` if a subscription was removed.
    pub fn remove(&self, id: SubscriptionId) -> bool {
        let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|(existing, _, _)| *existing != id);
        entries.len() != before
    }

    /// Invokes every callback registered for `key`, in registration order.
    pub fn notify(&self, key: &str, value: Option<&Value>) {
        let matching: Vec<ChangeCallback> = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, k, _)| k == key)
            .map(|(_, _, cb)| cb.clone())
            .collect();

        for callback in matching {
            callback(value.cloned());
        }
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
