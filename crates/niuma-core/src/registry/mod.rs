//! The settings registry: declares typed, defaulted, persisted settings.
//!
//! A [`SettingsRegistry`] is created once per session around a shared store
//! and passed by reference to whoever needs settings.  Each call to
//! [`declare`](SettingsRegistry::declare) resolves the initial value of one key
//! and returns a [`Binding`]:
//!
//! ```text
//! declare(key, default)
//!   ├─ store.read(key) ─► None            ─► adopt default, write it  (Defaulted)
//!   ├─ store.read(key) ─► Some(valid)     ─► adopt stored value        (Persisted)
//!   └─ store.read(key) ─► Some(malformed) ─► MalformedPolicy::Reset  ─► default (Recovered)
//!                                          └► MalformedPolicy::Reject ─► error
//! ```
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use niuma_core::{MemoryStore, SettingsRegistry, TimerType};
//!
//! let registry = SettingsRegistry::new(Arc::new(MemoryStore::new()));
//! let timer_type = registry.declare("timer-type", TimerType::Countup).unwrap();
//! timer_type.set(TimerType::Countdown).unwrap();
//! assert_eq!(timer_type.get(), TimerType::Countdown);
//! ```

use std::collections::BTreeSet;
use std::sync::{Arc, Mutex, PoisonError};

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::domain::{CountdownMinutes, DomainTags, TimerMode, TimerType};
use crate::storage::{KeyValueStore, StoreError};

pub mod binding;

pub use binding::{Binding, LoadOutcome, Subscription};

/// Error type for registry and binding operations.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// The durable store could not be read or written.
    #[error("store unavailable for setting {key:?}: {source}")]
    StoreUnavailable {
        key: String,
        #[source]
        source: StoreError,
    },

    /// The stored value does not match the setting's type or fails validation.
    #[error("persisted value for setting {key:?} is malformed: {reason}")]
    MalformedPersistedValue { key: String, reason: String },

    /// The same key was declared twice on one registry.
    #[error("setting {0:?} is declared more than once")]
    DuplicateKeyDeclaration(String),

    /// A value passed to `set` (or a declared default) failed validation.
    #[error("invalid value for setting {key:?}: {reason}")]
    InvalidValue { key: String, reason: String },

    /// No setting with this key exists.
    #[error("unknown setting {0:?}")]
    UnknownKey(String),

    /// The value could not be converted to JSON.
    #[error("failed to encode setting {key:?}: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

/// A type that can be stored as a setting.
///
/// `validate` runs on every value entering a binding: declared defaults,
/// values read from the store, and values passed to [`Binding::set`].
pub trait SettingValue:
    Serialize + DeserializeOwned + Clone + PartialEq + Send + Sync + 'static
{
    /// Returns a human-readable reason when the value is not acceptable.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

impl SettingValue for String {}

impl SettingValue for TimerMode {}

impl SettingValue for TimerType {}

impl SettingValue for CountdownMinutes {
    fn validate(&self) -> Result<(), String> {
        CountdownMinutes::validate(self).map_err(|e| e.to_string())
    }
}

impl SettingValue for DomainTags {
    fn validate(&self) -> Result<(), String> {
        DomainTags::validate(self).map_err(|e| e.to_string())
    }
}

/// What [`SettingsRegistry::declare`] does with a malformed stored value.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MalformedPolicy {
    /// Log a warning, adopt the default and overwrite the stored value.  The
    /// binding reports [`LoadOutcome::Recovered`].
    #[default]
    Reset,
    /// Fail with [`SettingsError::MalformedPersistedValue`].
    Reject,
}

/// Tunables for a [`SettingsRegistry`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistryOptions {
    pub on_malformed: MalformedPolicy,
}

/// Declares settings against one shared store.
pub struct SettingsRegistry {
    store: Arc<dyn KeyValueStore>,
    options: RegistryOptions,
    declared: Mutex<BTreeSet<String>>,
}

impl SettingsRegistry {
    /// Creates a registry with default options.
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self::with_options(store, RegistryOptions::default())
    }

    pub fn with_options(store: Arc<dyn KeyValueStore>, options: RegistryOptions) -> Self {
        Self {
            store,
            options,
            declared: Mutex::new(BTreeSet::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn options(&self) -> &RegistryOptions {
        &self.options
    }

    /// Keys declared so far, in sorted order.
    pub fn declared_keys(&self) -> Vec<String> {
        self.declared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    /// Releases `key` so it can be declared again.
    ///
    /// Used to roll back a group of declarations when a later one fails.
    pub(crate) fn forget(&self, key: &str) {
        self.declared
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
    }

    /// Declares the setting `key` with `default` and returns its binding.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::DuplicateKeyDeclaration`] if `key` was already
    ///   declared on this registry.
    /// - [`SettingsError::InvalidValue`] if `default` fails validation.
    /// - [`SettingsError::StoreUnavailable`] if the store cannot be read,
    ///   written or subscribed to.
    /// - [`SettingsError::MalformedPersistedValue`] if the stored value is
    ///   malformed and the policy is [`MalformedPolicy::Reject`].
    pub fn declare<T: SettingValue>(&self, key: &str, default: T) -> Result<Binding<T>, SettingsError> {
        // Held for the whole call so two threads cannot both declare `key`.
        let mut declared = self.declared.lock().unwrap_or_else(PoisonError::into_inner);
        if declared.contains(key) {
            return Err(SettingsError::DuplicateKeyDeclaration(key.to_string()));
        }

        default
            .validate()
            .map_err(|reason| SettingsError::InvalidValue {
                key: key.to_string(),
                reason,
            })?;

        let stored = self
            .store
            .read(key)
            .map_err(|source| SettingsError::StoreUnavailable {
                key: key.to_string(),
                source,
            })?;

        let (initial, outcome) = match stored {
            None => (default.clone(), LoadOutcome::Defaulted),
            Some(raw) => match decode::<T>(raw) {
                Ok(value) => (value, LoadOutcome::Persisted),
                Err(reason) => match self.options.on_malformed {
                    MalformedPolicy::Reject => {
                        return Err(SettingsError::MalformedPersistedValue {
                            key: key.to_string(),
                            reason,
                        });
                    }
                    MalformedPolicy::Reset => {
                        warn!(key, %reason, "stored setting is malformed, resetting to default");
                        (default.clone(), LoadOutcome::Recovered { reason })
                    }
                },
            },
        };

        if outcome != LoadOutcome::Persisted {
            let encoded = serde_json::to_value(&initial).map_err(|source| SettingsError::Encode {
                key: key.to_string(),
                source,
            })?;
            self.store
                .write(key, &encoded)
                .map_err(|source| SettingsError::StoreUnavailable {
                    key: key.to_string(),
                    source,
                })?;
        }

        let binding = Binding::attach(key, default, initial, outcome, Arc::clone(&self.store))?;
        declared.insert(key.to_string());
        debug!(key, outcome = ?binding.load_outcome(), "setting declared");
        Ok(binding)
    }
}

/// Converts a stored JSON value into `T`, applying `T::validate`.
pub(crate) fn decode<T: SettingValue>(raw: Value) -> Result<T, String> {
    let value: T = serde_json::from_value(raw).map_err(|e| e.to_string())?;
    value.validate()?;
    Ok(value)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use serde_json::json;

    use super::*;
    use crate::storage::{MemoryStore, MockKeyValueStore, SubscriptionId};

    fn memory_registry() -> (Arc<MemoryStore>, SettingsRegistry) {
        let store = Arc::new(MemoryStore::new());
        let registry = SettingsRegistry::new(store.clone());
        (store, registry)
    }

    /// A mock store that reads nothing and accepts subscriptions, with the
    /// write behaviour left to the caller.
    fn mock_store_with_write<F>(write: F) -> MockKeyValueStore
    where
        F: FnMut(&str, &Value) -> Result<(), StoreError> + Send + 'static,
    {
        let mut store = MockKeyValueStore::new();
        store.expect_read().returning(|_| Ok(None));
        store.expect_write().returning(write);
        store
            .expect_subscribe()
            .returning(|_, _| Ok(SubscriptionId::new()));
        store.expect_unsubscribe().returning(|_| ());
        store
    }

    // ── declare ───────────────────────────────────────────────────────────────

    #[test]
    fn test_declare_on_empty_store_returns_default_and_persists_it() {
        // Arrange
        let (store, registry) = memory_registry();

        // Act
        let username = registry.declare("username", "NiuMa".to_string()).unwrap();

        // Assert
        assert_eq!(username.get(), "NiuMa");
        assert_eq!(username.load_outcome(), &LoadOutcome::Defaulted);
        assert_eq!(store.read("username").unwrap(), Some(json!("NiuMa")));
    }

    #[test]
    fn test_declare_adopts_persisted_value() {
        let store = Arc::new(MemoryStore::with_entries([("timer-mode", json!("reset"))]));
        let registry = SettingsRegistry::new(store);

        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();

        assert_eq!(mode.get(), TimerMode::Reset);
        assert_eq!(mode.load_outcome(), &LoadOutcome::Persisted);
    }

    #[test]
    fn test_declare_same_key_twice_is_rejected() {
        let (_store, registry) = memory_registry();
        let _first = registry.declare("username", "NiuMa".to_string()).unwrap();

        let second = registry.declare("username", "Other".to_string());

        assert!(matches!(
            second,
            Err(SettingsError::DuplicateKeyDeclaration(ref k)) if k == "username"
        ));
    }

    #[test]
    fn test_declare_rejects_invalid_default() {
        let (_store, registry) = memory_registry();
        let tags = DomainTags {
            work: vec!["a.com".into()],
            fun: vec!["a.com".into()],
        };

        let result = registry.declare("domain-tags", tags);

        assert!(matches!(result, Err(SettingsError::InvalidValue { .. })));
        assert!(registry.declared_keys().is_empty());
    }

    #[test]
    fn test_declare_malformed_value_resets_to_default_by_default() {
        // Arrange: a string where a number is expected.
        let store = Arc::new(MemoryStore::with_entries([(
            "countdown-minutes",
            json!("ten"),
        )]));
        let registry = SettingsRegistry::new(store.clone());

        // Act
        let minutes = registry
            .declare("countdown-minutes", CountdownMinutes::DEFAULT)
            .unwrap();

        // Assert
        assert_eq!(minutes.get(), CountdownMinutes::DEFAULT);
        assert!(matches!(minutes.load_outcome(), LoadOutcome::Recovered { .. }));
        assert_eq!(store.read("countdown-minutes").unwrap(), Some(json!(1)));
    }

    #[test]
    fn test_declare_malformed_value_with_reject_policy_errors() {
        let store = Arc::new(MemoryStore::with_entries([(
            "domain-tags",
            json!({"work": "github.com", "fun": []}),
        )]));
        let registry = SettingsRegistry::with_options(
            store.clone(),
            RegistryOptions {
                on_malformed: MalformedPolicy::Reject,
            },
        );

        let result = registry.declare("domain-tags", DomainTags::default());

        assert!(matches!(
            result,
            Err(SettingsError::MalformedPersistedValue { ref key, .. }) if key == "domain-tags"
        ));
        // The stored value is left untouched for the caller to inspect.
        assert_eq!(
            store.read("domain-tags").unwrap(),
            Some(json!({"work": "github.com", "fun": []}))
        );
    }

    #[test]
    fn test_declare_treats_persisted_zero_minutes_as_malformed() {
        let store = Arc::new(MemoryStore::with_entries([("countdown-minutes", json!(0))]));
        let registry = SettingsRegistry::new(store);

        let minutes = registry
            .declare("countdown-minutes", CountdownMinutes::DEFAULT)
            .unwrap();

        assert_eq!(minutes.get().get(), 1);
        assert!(matches!(minutes.load_outcome(), LoadOutcome::Recovered { .. }));
    }

    #[test]
    fn test_declare_propagates_read_failure() {
        // Arrange
        let mut store = MockKeyValueStore::new();
        store
            .expect_read()
            .returning(|_| Err(StoreError::Unavailable("permission denied".into())));
        let registry = SettingsRegistry::new(Arc::new(store));

        // Act
        let result = registry.declare("username", "NiuMa".to_string());

        // Assert
        assert!(matches!(
            result,
            Err(SettingsError::StoreUnavailable {
                source: StoreError::Unavailable(_),
                ..
            })
        ));
        assert!(registry.declared_keys().is_empty());
    }

    #[test]
    fn test_declare_propagates_default_write_failure() {
        let store = mock_store_with_write(|_, _| {
            Err(StoreError::QuotaExceeded {
                needed: 20,
                limit: 10,
            })
        });
        let registry = SettingsRegistry::new(Arc::new(store));

        let result = registry.declare("username", "NiuMa".to_string());

        assert!(matches!(
            result,
            Err(SettingsError::StoreUnavailable {
                source: StoreError::QuotaExceeded { .. },
                ..
            })
        ));
    }

    // ── set / get ─────────────────────────────────────────────────────────────

    #[test]
    fn test_set_then_get_returns_new_value() {
        let (_store, registry) = memory_registry();
        let timer_type = registry.declare("timer-type", TimerType::Countup).unwrap();

        timer_type.set(TimerType::Countdown).unwrap();

        assert_eq!(timer_type.get(), TimerType::Countdown);
    }

    #[test]
    fn test_set_writes_through_to_store() {
        let (store, registry) = memory_registry();
        let minutes = registry
            .declare("countdown-minutes", CountdownMinutes::DEFAULT)
            .unwrap();

        minutes.set(CountdownMinutes::new(25).unwrap()).unwrap();

        assert_eq!(minutes.get().get(), 25);
        assert_eq!(store.read("countdown-minutes").unwrap(), Some(json!(25)));
    }

    #[test]
    fn test_set_zero_minutes_is_rejected_and_value_unchanged() {
        let (store, registry) = memory_registry();
        let minutes = registry
            .declare("countdown-minutes", CountdownMinutes::DEFAULT)
            .unwrap();
        minutes.set(CountdownMinutes::new(25).unwrap()).unwrap();

        // `CountdownMinutes` can hold 0 only through deserialisation.
        let zero: CountdownMinutes = serde_json::from_value(json!(0)).unwrap();
        let result = minutes.set(zero);

        assert!(matches!(result, Err(SettingsError::InvalidValue { .. })));
        assert_eq!(minutes.get().get(), 25);
        assert_eq!(store.read("countdown-minutes").unwrap(), Some(json!(25)));
    }

    #[test]
    fn test_set_failure_is_reported_and_keeps_optimistic_value() {
        // Arrange: the first write (the default) succeeds, later writes fail.
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&writes);
        let store = mock_store_with_write(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(StoreError::Unavailable("quota exceeded".into()))
            }
        });
        let registry = SettingsRegistry::new(Arc::new(store));
        let username = registry.declare("username", "NiuMa".to_string()).unwrap();

        // Act
        let result = username.set("Boss".to_string());

        // Assert
        assert!(matches!(result, Err(SettingsError::StoreUnavailable { .. })));
        assert_eq!(username.get(), "Boss");
        assert_eq!(writes.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_setting_same_value_twice_keeps_identity_and_version() {
        let (_store, registry) = memory_registry();
        let username = registry.declare("username", "NiuMa".to_string()).unwrap();
        let alias = username.clone();

        username.set("Boss".to_string()).unwrap();
        username.set("Boss".to_string()).unwrap();

        assert_eq!(username.get(), "Boss");
        assert_eq!(username.version(), 1);
        assert!(username.ptr_eq(&alias));
        assert_eq!(alias.get(), "Boss");
    }

    #[test]
    fn test_reset_restores_default() {
        let (store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        mode.set(TimerMode::Reset).unwrap();

        mode.reset().unwrap();

        assert_eq!(mode.get(), TimerMode::Accumulate);
        assert_eq!(store.read("timer-mode").unwrap(), Some(json!("accumulate")));
    }

    #[test]
    fn test_update_modifies_in_place() {
        let (_store, registry) = memory_registry();
        let tags = registry
            .declare("domain-tags", DomainTags::default())
            .unwrap();

        tags.update(|t| t.work.push("github.com".to_string())).unwrap();

        assert_eq!(tags.get().work, vec!["github.com".to_string()]);
    }

    // ── observers ─────────────────────────────────────────────────────────────

    #[test]
    fn test_observers_are_notified_in_registration_order() {
        // Arrange
        let (_store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        let log = Arc::new(Mutex::new(Vec::new()));
        let first = Arc::clone(&log);
        let second = Arc::clone(&log);
        let _a = mode.subscribe(move |v| first.lock().unwrap().push(format!("a:{v}")));
        let _b = mode.subscribe(move |v| second.lock().unwrap().push(format!("b:{v}")));

        // Act
        mode.set(TimerMode::Reset).unwrap();

        // Assert
        assert_eq!(*log.lock().unwrap(), vec!["a:reset", "b:reset"]);
    }

    #[test]
    fn test_equal_value_does_not_notify() {
        let (_store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let _sub = mode.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        mode.set(TimerMode::Accumulate).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(mode.version(), 0);
    }

    #[test]
    fn test_dropping_subscription_unregisters_observer() {
        let (_store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        let sub = mode.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        drop(sub);
        mode.set(TimerMode::Reset).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 0);
        assert_eq!(mode.observer_count(), 0);
    }

    #[test]
    fn test_detached_subscription_keeps_observing() {
        let (_store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        let hits = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&hits);
        mode.subscribe(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .detach();

        mode.set(TimerMode::Reset).unwrap();

        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_read_binding_during_notification() {
        let (_store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        let seen = Arc::new(Mutex::new(None));
        let sink = Arc::clone(&seen);
        let handle = mode.clone();
        let _sub = mode.subscribe(move |_| *sink.lock().unwrap() = Some(handle.get()));

        mode.set(TimerMode::Reset).unwrap();

        assert_eq!(*seen.lock().unwrap(), Some(TimerMode::Reset));
    }

    #[test]
    fn test_observers_notified_even_when_write_fails() {
        let writes = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&writes);
        let store = mock_store_with_write(move |_, _| {
            if counter.fetch_add(1, Ordering::SeqCst) == 0 {
                Ok(())
            } else {
                Err(StoreError::Unavailable("offline".into()))
            }
        });
        let registry = SettingsRegistry::new(Arc::new(store));
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = mode.subscribe(move |v| sink.lock().unwrap().push(*v));

        let _ = mode.set(TimerMode::Reset);

        assert_eq!(*seen.lock().unwrap(), vec![TimerMode::Reset]);
    }

    // ── cross-context propagation ─────────────────────────────────────────────

    #[test]
    fn test_change_in_other_registry_reaches_binding() {
        // Arrange: two surfaces sharing one store.
        let store = Arc::new(MemoryStore::new());
        let popup = SettingsRegistry::new(store.clone());
        let options_page = SettingsRegistry::new(store.clone());
        let popup_name = popup.declare("username", "NiuMa".to_string()).unwrap();
        let options_name = options_page
            .declare("username", "NiuMa".to_string())
            .unwrap();
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let _sub = popup_name.subscribe(move |v: &String| sink.lock().unwrap().push(v.clone()));

        // Act
        options_name.set("Boss".to_string()).unwrap();

        // Assert
        assert_eq!(popup_name.get(), "Boss");
        assert_eq!(*seen.lock().unwrap(), vec!["Boss".to_string()]);
    }

    #[test]
    fn test_malformed_remote_value_is_ignored() {
        let (store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();

        store.write("timer-mode", &json!(42)).unwrap();

        assert_eq!(mode.get(), TimerMode::Accumulate);
        assert_eq!(mode.version(), 0);
    }

    #[test]
    fn test_removed_key_reverts_binding_to_default() {
        let (store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        mode.set(TimerMode::Reset).unwrap();

        store.remove("timer-mode");

        assert_eq!(mode.get(), TimerMode::Accumulate);
    }

    #[test]
    fn test_dropping_last_binding_unsubscribes_from_store() {
        let (store, registry) = memory_registry();
        let mode = registry.declare("timer-mode", TimerMode::Accumulate).unwrap();
        let alias = mode.clone();
        assert_eq!(store.subscriber_count(), 1);

        drop(mode);
        assert_eq!(store.subscriber_count(), 1);
        drop(alias);

        assert_eq!(store.subscriber_count(), 0);
    }

    #[test]
    fn test_subscribe_failure_surfaces_from_declare() {
        let mut store = MockKeyValueStore::new();
        store.expect_read().returning(|_| Ok(Some(json!("reset"))));
        store
            .expect_subscribe()
            .returning(|_, _| Err(StoreError::Unavailable("disconnected".into())));
        let registry = SettingsRegistry::new(Arc::new(store));

        let result = registry.declare("timer-mode", TimerMode::Accumulate);

        assert!(matches!(result, Err(SettingsError::StoreUnavailable { .. })));
    }
}
