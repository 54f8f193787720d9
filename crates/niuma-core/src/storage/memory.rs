//! In-memory [`KeyValueStore`].
//!
//! Wrap one `MemoryStore` in an `Arc` and hand clones of it to several
//! registries to model several extension surfaces sharing the same browser
//! storage: a write through any registry is delivered to the bindings of all
//! the others.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use serde_json::Value;
use tracing::trace;

use super::{ChangeCallback, KeyValueStore, StoreError, SubscriberList, SubscriptionId};

/// A [`KeyValueStore`] backed by a `HashMap`.  Nothing survives the process.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Value>>,
    subscribers: SubscriberList,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store pre-populated with `entries`, as if written by an
    /// earlier session.
    pub fn with_entries<I, K>(entries: I) -> Self
    where
        I: IntoIterator<Item = (K, Value)>,
        K: Into<String>,
    {
        let map = entries.into_iter().map(|(k, v)| (k.into(), v)).collect();
        Self {
            entries: Mutex::new(map),
            subscribers: SubscriberList::new(),
        }
    }

    /// Deletes `key`, notifying subscribers with `None`.
    ///
    /// Returns the removed value.
    pub fn remove(&self, key: &str) -> Option<Value> {
        let removed = self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        if removed.is_some() {
            self.subscribers.notify(key, None);
        }
        removed
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of live subscriptions across all keys.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

impl KeyValueStore for MemoryStore {
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError> {
        Ok(self
            .entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned())
    }

    fn write(&self, key: &str, value: &Value) -> Result<(), StoreError> {
        trace!(key, "memory store write");
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.clone());
        self.subscribers.notify(key, Some(value));
        Ok(())
    }

    fn subscribe(&self, key: &str, callback: ChangeCallback) -> Result<SubscriptionId, StoreError> {
        Ok(self.subscribers.add(key, callback))
    }

    fn unsubscribe(&self, id: SubscriptionId) {
        self.subscribers.remove(id);
    }
}
