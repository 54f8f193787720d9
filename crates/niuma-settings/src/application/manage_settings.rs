//! ManageSettingsUseCase: open the registry and read/write settings by key.
//!
//! [`SettingsService`] is the one object the front end (the CLI today) needs.
//! It declares every extension setting against a store once, then serves
//! reads and writes addressed by the same string keys the extension uses.

use std::sync::Arc;

use serde_json::Value;
use tracing::{info, warn};

use niuma_core::{
    ExtensionSettings, KeyValueStore, LoadOutcome, RegistryOptions, SettingsError,
    SettingsRegistry, SettingsSnapshot,
};

/// Owns the registry and the declared settings for one session.
pub struct SettingsService {
    registry: SettingsRegistry,
    settings: ExtensionSettings,
}

impl SettingsService {
    /// Declares all extension settings on `store`.
    ///
    /// Settings whose stored value was malformed and got reset are logged at
    /// `warn` level; see [`recovered`](Self::recovered) to inspect them.
    ///
    /// # Errors
    ///
    /// Propagates any [`SettingsError`] from declaring the schema.
    pub fn open(store: Arc<dyn KeyValueStore>, options: RegistryOptions) -> Result<Self, SettingsError> {
        let registry = SettingsRegistry::with_options(store, options);
        let settings = ExtensionSettings::declare(&registry)?;

        let service = Self { registry, settings };
        for (key, reason) in service.recovered() {
            warn!(key, %reason, "stored setting was malformed and has been reset");
        }
        info!(
            keys = service.registry.declared_keys().len(),
            "settings registry ready"
        );
        Ok(service)
    }

    pub fn settings(&self) -> &ExtensionSettings {
        &self.settings
    }

    pub fn registry(&self) -> &SettingsRegistry {
        &self.registry
    }

    /// Current value of every setting.
    pub fn show(&self) -> SettingsSnapshot {
        self.settings.snapshot()
    }

    /// Current value of `key` as JSON.
    pub fn get(&self, key: &str) -> Result<Value, SettingsError> {
        self.settings.get_json(key)
    }

    /// Sets `key` from command-line input and returns the stored value.
    ///
    /// `raw` is parsed with [`parse_input`].  If the setting rejects that and
    /// `raw` did not parse as a JSON string, the raw text is tried once more
    /// as a string, so `set username 42` stores `"42"`.  When both attempts
    /// fail the first error is returned.
    pub fn set_from_input(&self, key: &str, raw: &str) -> Result<Value, SettingsError> {
        let parsed = parse_input(raw);
        let may_retry = !parsed.is_string();
        if let Err(first) = self.settings.set_json(key, parsed) {
            if !(may_retry && matches!(first, SettingsError::InvalidValue { .. })) {
                return Err(first);
            }
            self.settings
                .set_json(key, Value::String(raw.to_string()))
                .map_err(|_| first)?;
        }
        self.settings.get_json(key)
    }

    /// Restores the default of `key`, or of every setting when `key` is `None`.
    pub fn reset(&self, key: Option<&str>) -> Result<(), SettingsError> {
        match key {
            Some(key) => self.settings.reset(key),
            None => self.settings.reset_all(),
        }
    }

    /// Settings whose stored value was malformed when the service opened,
    /// with the reason each was rejected.
    pub fn recovered(&self) -> Vec<(&'static str, String)> {
        self.settings
            .load_outcomes()
            .into_iter()
            .filter_map(|(key, outcome)| match outcome {
                LoadOutcome::Recovered { reason } => Some((key, reason)),
                _ => None,
            })
            .collect()
    }
}

/// Interprets command-line input as JSON, falling back to a plain string.
///
/// `25` becomes a number and `{"work":[],"fun":[]}` an object, while `Boss`
/// (not valid JSON) becomes the string `"Boss"`.  Quote the input to force a
/// string that happens to look like JSON: `'"42"'`.
pub fn parse_input(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}
