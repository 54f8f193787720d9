//! Durable key-value storage abstraction.
//!
//! The registry never talks to a concrete backend.  It holds an
//! `Arc<dyn KeyValueStore>` and relies on three capabilities:
//!
//! - `read(key)` returns the JSON value stored under `key`, if any.
//! - `write(key, value)` replaces it.
//! - `subscribe(key, callback)` delivers changes made through *any* handle to
//!   the same store, which is how a value set in one extension surface (popup,
//!   options page, content script) reaches bindings living in another.
//!
//! # Implementations
//!
//! | Type                        | Crate            | Used for                    |
//! |-----------------------------|------------------|-----------------------------|
//! | [`memory::MemoryStore`]     | `niuma-core`     | tests, ephemeral sessions   |
//! | `JsonFileStore`             | `niuma-settings` | the CLI, survives restarts  |
//!
//! Unit tests in this crate additionally use `MockKeyValueStore` (generated by
//! `mockall`) to inject backend failures.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

pub mod memory;
pub mod subscribers;

pub use memory::MemoryStore;
pub use subscribers::SubscriberList;

/// Callback invoked with the new value for a key, or `None` when the key was
/// removed from the store.
pub type ChangeCallback = Arc<dyn Fn(Option<Value>) + Send + Sync>;

/// Handle returned by [`KeyValueStore::subscribe`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(Uuid);

impl SubscriptionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Error type for storage backend operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The backend cannot be reached at all (permission denied, disconnected).
    #[error("storage backend unavailable: {0}")]
    Unavailable(String),

    /// Writing the value would exceed the backend's storage quota.
    #[error("storage quota exceeded: {needed} bytes needed, limit is {limit}")]
    QuotaExceeded { needed: usize, limit: usize },

    /// A file system I/O error occurred.
    #[error("I/O error accessing store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The backing file exists but does not hold a JSON object.
    #[error("store at {path} is corrupt: {source}")]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The store contents could not be serialised.
    #[error("failed to encode store contents: {0}")]
    Encode(#[from] serde_json::Error),
}

/// A durable key-value store holding JSON values.
///
/// Implementations must be shareable across threads.  `write` must notify all
/// subscribers of `key` after the value is stored and must not hold internal
/// locks while doing so, because callbacks are allowed to call back into the
/// store.
#[cfg_attr(test, mockall::automock)]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if the key is absent.
    fn read(&self, key: &str) -> Result<Option<Value>, StoreError>;

    /// Stores `value` under `key`, replacing any previous value.
    fn write(&self, key: &str, value: &Value) -> Result<(), StoreError>;

    /// Registers `callback` to be invoked whenever `key` changes.
    fn subscribe(&self, key: &str, callback: ChangeCallback) -> Result<SubscriptionId, StoreError>;

    /// Removes a subscription.  Unknown ids are ignored.
    fn unsubscribe(&self, id: SubscriptionId);
}
