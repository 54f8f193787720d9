//! `Binding<T>`: a reactive, write-through cell for one setting.
//!
//! # How a binding works (for beginners)
//!
//! A binding is a small in-memory cache in front of one key of the durable
//! store:
//!
//! ```text
//!  caller ──set(v)──► validate ──► in-memory value ──► observers
//!                                        │
//!                                        └──► store.write(key, v)   (write-through)
//!
//!  other surface ──► store ──change notification──► in-memory value ──► observers
//! ```
//!
//! `get()` only ever reads the in-memory value, so it is cheap and never
//! fails.  `set()` updates memory first, notifies observers, then writes to the
//! store.  If the write fails the caller gets
//! [`SettingsError::StoreUnavailable`] and the in-memory value keeps the new
//! value (optimistic update); the next successful `set` persists it.
//!
//! # Invariants
//!
//! 1. [`version`](Binding::version) increments exactly once per mutation that
//!    changes the value.
//! 2. Observers are notified in registration order, synchronously, after the
//!    in-memory update and before the durable write.
//! 3. Setting a value equal to the current value notifies nobody and does not
//!    bump the version.  It is still written through.
//! 4. No internal lock is held while observers or the store run, so an
//!    observer may call `get`, `set` or `subscribe` on the same binding.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock, Weak};

use serde_json::Value;
use tracing::{debug, warn};

use super::{SettingValue, SettingsError};
use crate::storage::{KeyValueStore, SubscriptionId};

type Observer<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// How a binding obtained its initial value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    /// A valid value was already stored under the key.
    Persisted,
    /// Nothing was stored; the default was adopted and written.
    Defaulted,
    /// A malformed value was stored; the default replaced it.
    Recovered {
        /// Why the stored value was rejected.
        reason: String,
    },
}

struct CurrentValue<T> {
    value: T,
    version: u64,
}

pub(crate) struct BindingInner<T: SettingValue> {
    key: String,
    default: T,
    current: RwLock<CurrentValue<T>>,
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_observer_id: AtomicU64,
    store: Arc<dyn KeyValueStore>,
    store_subscription: OnceLock<SubscriptionId>,
    load_outcome: LoadOutcome,
}

impl<T: SettingValue> BindingInner<T> {
    /// Replaces the in-memory value and notifies observers.
    ///
    /// Returns `false` when `value` equals the current value.
    fn apply(&self, value: T) -> bool {
        {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            if current.value == value {
                return false;
            }
            current.value = value.clone();
            current.version += 1;
        }
        self.notify(&value);
        true
    }

    fn notify(&self, value: &T) {
        let observers: Vec<Observer<T>> = self
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        for observer in observers {
            observer(value);
        }
    }

    /// Handles a change notification from the store.
    fn on_store_change(&self, raw: Option<Value>) {
        match raw {
            None => {
                debug!(key = %self.key, "setting removed from store, reverting to default");
                self.apply(self.default.clone());
            }
            Some(raw) => match super::decode::<T>(raw) {
                Ok(value) => {
                    if self.apply(value) {
                        debug!(key = %self.key, "adopted value changed in another context");
                    }
                }
                Err(reason) => {
                    warn!(key = %self.key, %reason, "ignoring malformed value from store");
                }
            },
        }
    }
}

impl<T: SettingValue> Drop for BindingInner<T> {
    fn drop(&mut self) {
        if let Some(id) = self.store_subscription.get() {
            self.store.unsubscribe(*id);
        }
    }
}

/// A reactive handle to one persisted setting.
///
/// Cloning a binding is cheap and yields a handle to the *same* cell: both
/// clones observe the same value, version and observers.
pub struct Binding<T: SettingValue> {
    inner: Arc<BindingInner<T>>,
}

impl<T: SettingValue> Clone for Binding<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: SettingValue + fmt::Debug> fmt::Debug for Binding<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let current = self.inner.current.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("Binding")
            .field("key", &self.inner.key)
            .field("value", &current.value)
            .field("version", &current.version)
            .finish()
    }
}

impl<T: SettingValue> Binding<T> {
    /// Builds a binding with an already-resolved initial value and subscribes
    /// it to store changes for `key`.
    pub(crate) fn attach(
        key: &str,
        default: T,
        initial: T,
        load_outcome: LoadOutcome,
        store: Arc<dyn KeyValueStore>,
    ) -> Result<Self, SettingsError> {
        let inner = Arc::new(BindingInner {
            key: key.to_string(),
            default,
            current: RwLock::new(CurrentValue {
                value: initial,
                version: 0,
            }),
            observers: Mutex::new(Vec::new()),
            next_observer_id: AtomicU64::new(0),
            store: Arc::clone(&store),
            store_subscription: OnceLock::new(),
            load_outcome,
        });

        // The store callback only holds a weak reference so that dropping the
        // last `Binding` frees the cell (and unsubscribes via `Drop`).
        let weak: Weak<BindingInner<T>> = Arc::downgrade(&inner);
        let id = store
            .subscribe(
                key,
                Arc::new(move |raw: Option<Value>| {
                    if let Some(inner) = weak.upgrade() {
                        inner.on_store_change(raw);
                    }
                }),
            )
            .map_err(|source| SettingsError::StoreUnavailable {
                key: key.to_string(),
                source,
            })?;
        let _ = inner.store_subscription.set(id);

        Ok(Self { inner })
    }

    /// The storage key this binding is attached to.
    pub fn key(&self) -> &str {
        &self.inner.key
    }

    /// Returns the current value.
    pub fn get(&self) -> T {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .clone()
    }

    /// Sets a new value and writes it through to the store.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::InvalidValue`] if `value` fails validation.  Nothing
    ///   changes in that case.
    /// - [`SettingsError::StoreUnavailable`] if the durable write fails.  The
    ///   in-memory value and observers have already been updated.
    pub fn set(&self, value: T) -> Result<(), SettingsError> {
        let key = &self.inner.key;
        value
            .validate()
            .map_err(|reason| SettingsError::InvalidValue {
                key: key.clone(),
                reason,
            })?;
        let encoded = serde_json::to_value(&value).map_err(|source| SettingsError::Encode {
            key: key.clone(),
            source,
        })?;

        self.inner.apply(value);

        self.inner
            .store
            .write(key, &encoded)
            .map_err(|source| SettingsError::StoreUnavailable {
                key: key.clone(),
                source,
            })?;
        debug!(key = %key, "setting written");
        Ok(())
    }

    /// Applies `f` to a copy of the current value and [`set`](Self::set)s the
    /// result.
    pub fn update<F>(&self, f: F) -> Result<(), SettingsError>
    where
        F: FnOnce(&mut T),
    {
        let mut value = self.get();
        f(&mut value);
        self.set(value)
    }

    /// Restores the declared default.
    pub fn reset(&self) -> Result<(), SettingsError> {
        self.set(self.inner.default.clone())
    }

    /// The default supplied when the setting was declared.
    pub fn default_value(&self) -> &T {
        &self.inner.default
    }

    /// How the initial value was obtained.
    pub fn load_outcome(&self) -> &LoadOutcome {
        &self.inner.load_outcome
    }

    /// Number of value changes since the binding was declared.
    pub fn version(&self) -> u64 {
        self.inner
            .current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Registers `observer` to be called with each new value.
    ///
    /// The observer stays registered until the returned [`Subscription`] is
    /// dropped; call [`Subscription::detach`] to keep it for the binding's
    /// whole lifetime.
    pub fn subscribe<F>(&self, observer: F) -> Subscription<T>
    where
        F: Fn(&T) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(observer)));
        Subscription {
            binding: Arc::downgrade(&self.inner),
            id: Some(id),
        }
    }

    /// Number of registered observers.
    pub fn observer_count(&self) -> usize {
        self.inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Returns `true` if both handles refer to the same cell.
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

/// RAII guard for an observer registered with [`Binding::subscribe`].
#[must_use = "dropping a Subscription immediately unregisters the observer"]
pub struct Subscription<T: SettingValue> {
    binding: Weak<BindingInner<T>>,
    id: Option<u64>,
}

impl<T: SettingValue> Subscription<T> {
    /// Keeps the observer registered for as long as the binding lives.
    pub fn detach(mut self) {
        self.id = None;
    }
}

impl<T: SettingValue> Drop for Subscription<T> {
    fn drop(&mut self) {
        let (Some(id), Some(inner)) = (self.id, self.binding.upgrade()) else {
            return;
        };
        inner
            .observers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|(existing, _)| *existing != id);
    }
}
