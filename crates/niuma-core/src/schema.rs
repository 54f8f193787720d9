//! The extension's settings schema: every key, its type and its default.
//!
//! | Key                 | Type                 | Default                  |
//! |---------------------|----------------------|--------------------------|
//! | `webext-demo`       | `String`             | `"Storage Demo"`         |
//! | `timer-mode`        | [`TimerMode`]        | `accumulate`             |
//! | `timer-type`        | [`TimerType`]        | `countup`                |
//! | `countdown-minutes` | [`CountdownMinutes`] | `1`                      |
//! | `username`          | `String`             | `"NiuMa"`                |
//! | `domain-tags`       | [`DomainTags`]       | bundled asset            |

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::domain::{CountdownMinutes, DomainTags, TimerMode, TimerType};
use crate::registry::{Binding, LoadOutcome, SettingValue, SettingsError, SettingsRegistry};

/// Storage keys, exactly as the extension front end uses them.
pub mod keys {
    pub const STORAGE_DEMO: &str = "webext-demo";
    pub const TIMER_MODE: &str = "timer-mode";
    pub const TIMER_TYPE: &str = "timer-type";
    pub const COUNTDOWN_MINUTES: &str = "countdown-minutes";
    pub const USERNAME: &str = "username";
    pub const DOMAIN_TAGS: &str = "domain-tags";

    /// Every key in declaration order.
    pub const ALL: [&str; 6] = [
        STORAGE_DEMO,
        TIMER_MODE,
        TIMER_TYPE,
        COUNTDOWN_MINUTES,
        USERNAME,
        DOMAIN_TAGS,
    ];
}

pub const DEFAULT_STORAGE_DEMO: &str = "Storage Demo";
pub const DEFAULT_USERNAME: &str = "NiuMa";

/// One binding per extension setting.
///
/// Build it once per session with [`ExtensionSettings::declare`] and pass it
/// (or individual bindings) to the components that need them.
#[derive(Clone)]
pub struct ExtensionSettings {
    pub storage_demo: Binding<String>,
    pub timer_mode: Binding<TimerMode>,
    pub timer_type: Binding<TimerType>,
    pub countdown_minutes: Binding<CountdownMinutes>,
    pub username: Binding<String>,
    pub domain_tags: Binding<DomainTags>,
}

/// Plain-data view of every setting, keyed like the store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsSnapshot {
    #[serde(rename = "webext-demo")]
    pub storage_demo: String,
    #[serde(rename = "timer-mode")]
    pub timer_mode: TimerMode,
    #[serde(rename = "timer-type")]
    pub timer_type: TimerType,
    #[serde(rename = "countdown-minutes")]
    pub countdown_minutes: CountdownMinutes,
    pub username: String,
    #[serde(rename = "domain-tags")]
    pub domain_tags: DomainTags,
}

impl ExtensionSettings {
    /// Declares every extension setting on `registry`.
    ///
    /// Either all six keys end up declared or none do: when one declaration
    /// fails, the keys declared by this call are released again so the call
    /// can be retried on the same registry.
    ///
    /// # Errors
    ///
    /// Propagates the first error from [`SettingsRegistry::declare`], and
    /// returns [`SettingsError::InvalidValue`] if the bundled default domain
    /// tags cannot be parsed.
    pub fn declare(registry: &SettingsRegistry) -> Result<Self, SettingsError> {
        let default_tags =
            DomainTags::bundled_default().map_err(|e| SettingsError::InvalidValue {
                key: keys::DOMAIN_TAGS.to_string(),
                reason: e.to_string(),
            })?;

        let mut declared = Vec::new();
        let result = Self::declare_each(registry, default_tags, &mut declared);
        if let Err(e) = &result {
            debug!(error = %e, rolled_back = declared.len(), "declaring settings failed");
            for key in declared {
                registry.forget(key);
            }
        }
        result
    }

    fn declare_each(
        registry: &SettingsRegistry,
        default_tags: DomainTags,
        declared: &mut Vec<&'static str>,
    ) -> Result<Self, SettingsError> {
        Ok(Self {
            storage_demo: track(
                registry,
                declared,
                keys::STORAGE_DEMO,
                DEFAULT_STORAGE_DEMO.to_string(),
            )?,
            timer_mode: track(registry, declared, keys::TIMER_MODE, TimerMode::Accumulate)?,
            timer_type: track(registry, declared, keys::TIMER_TYPE, TimerType::Countup)?,
            countdown_minutes: track(
                registry,
                declared,
                keys::COUNTDOWN_MINUTES,
                CountdownMinutes::DEFAULT,
            )?,
            username: track(registry, declared, keys::USERNAME, DEFAULT_USERNAME.to_string())?,
            domain_tags: track(registry, declared, keys::DOMAIN_TAGS, default_tags)?,
        })
    }

    /// Current value of every setting.
    pub fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            storage_demo: self.storage_demo.get(),
            timer_mode: self.timer_mode.get(),
            timer_type: self.timer_type.get(),
            countdown_minutes: self.countdown_minutes.get(),
            username: self.username.get(),
            domain_tags: self.domain_tags.get(),
        }
    }

    /// Current value of `key` as JSON.
    pub fn get_json(&self, key: &str) -> Result<Value, SettingsError> {
        match key {
            keys::STORAGE_DEMO => encode(&self.storage_demo),
            keys::TIMER_MODE => encode(&self.timer_mode),
            keys::TIMER_TYPE => encode(&self.timer_type),
            keys::COUNTDOWN_MINUTES => encode(&self.countdown_minutes),
            keys::USERNAME => encode(&self.username),
            keys::DOMAIN_TAGS => encode(&self.domain_tags),
            other => Err(SettingsError::UnknownKey(other.to_string())),
        }
    }

    /// Sets `key` from a JSON value.
    ///
    /// # Errors
    ///
    /// [`SettingsError::UnknownKey`] for keys outside the schema,
    /// [`SettingsError::InvalidValue`] when `value` has the wrong shape or
    /// fails validation, and anything [`Binding::set`] returns.
    pub fn set_json(&self, key: &str, value: Value) -> Result<(), SettingsError> {
        match key {
            keys::STORAGE_DEMO => decode_and_set(&self.storage_demo, value),
            keys::TIMER_MODE => decode_and_set(&self.timer_mode, value),
            keys::TIMER_TYPE => decode_and_set(&self.timer_type, value),
            keys::COUNTDOWN_MINUTES => decode_and_set(&self.countdown_minutes, value),
            keys::USERNAME => decode_and_set(&self.username, value),
            keys::DOMAIN_TAGS => decode_and_set(&self.domain_tags, value),
            other => Err(SettingsError::UnknownKey(other.to_string())),
        }
    }

    /// Restores the default of `key`.
    pub fn reset(&self, key: &str) -> Result<(), SettingsError> {
        match key {
            keys::STORAGE_DEMO => self.storage_demo.reset(),
            keys::TIMER_MODE => self.timer_mode.reset(),
            keys::TIMER_TYPE => self.timer_type.reset(),
            keys::COUNTDOWN_MINUTES => self.countdown_minutes.reset(),
            keys::USERNAME => self.username.reset(),
            keys::DOMAIN_TAGS => self.domain_tags.reset(),
            other => Err(SettingsError::UnknownKey(other.to_string())),
        }
    }

    /// Restores every default, stopping at the first failure.
    pub fn reset_all(&self) -> Result<(), SettingsError> {
        keys::ALL.iter().try_for_each(|key| self.reset(key))
    }

    /// How each setting obtained its initial value, in declaration order.
    pub fn load_outcomes(&self) -> Vec<(&'static str, LoadOutcome)> {
        vec![
            (keys::STORAGE_DEMO, self.storage_demo.load_outcome().clone()),
            (keys::TIMER_MODE, self.timer_mode.load_outcome().clone()),
            (keys::TIMER_TYPE, self.timer_type.load_outcome().clone()),
            (keys::COUNTDOWN_MINUTES, self.countdown_minutes.load_outcome().clone()),
            (keys::USERNAME, self.username.load_outcome().clone()),
            (keys::DOMAIN_TAGS, self.domain_tags.load_outcome().clone()),
        ]
    }
}

fn track<T: SettingValue>(
    registry: &SettingsRegistry,
    declared: &mut Vec<&'static str>,
    key: &'static str,
    default: T,
) -> Result<Binding<T>, SettingsError> {
    let binding = registry.declare(key, default)?;
    declared.push(key);
    Ok(binding)
}

fn encode<T: SettingValue>(binding: &Binding<T>) -> Result<Value, SettingsError> {
    serde_json::to_value(binding.get()).map_err(|source| SettingsError::Encode {
        key: binding.key().to_string(),
        source,
    })
}

fn decode_and_set<T: SettingValue>(binding: &Binding<T>, value: Value) -> Result<(), SettingsError> {
    let typed: T = serde_json::from_value(value).map_err(|e| SettingsError::InvalidValue {
        key: binding.key().to_string(),
        reason: e.to_string(),
    })?;
    binding.set(typed)
}
