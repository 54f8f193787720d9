//! # niuma-core
//!
//! Settings registry for the NiuMa timer extension: typed, defaulted,
//! persisted settings exposed as reactive bindings.
//!
//! This crate has no file-system or OS dependencies.  Durable storage is
//! reached through the [`KeyValueStore`] trait; the `niuma-settings` crate
//! provides a file-backed implementation.
//!
//! # Architecture overview (for beginners)
//!
//! The extension remembers a handful of user preferences (timer mode, timer
//! direction, countdown length, display name and which websites count as
//! "work" or "fun").  Each preference lives under one string key in a
//! key-value store.  This crate is organised in four layers:
//!
//! - **`domain`** – The value types themselves and the rules that decide
//!   whether a value is acceptable (for example, a countdown of 0 minutes is
//!   not).
//!
//! - **`storage`** – The [`KeyValueStore`] trait every backend implements,
//!   plus an in-memory store used by tests and short-lived sessions.
//!
//! - **`registry`** – [`SettingsRegistry`] and [`Binding`]: declare a key with
//!   a default, get back a cell that reads from memory, writes through to the
//!   store and notifies observers.
//!
//! - **`schema`** – [`ExtensionSettings`], the concrete list of keys the
//!   extension uses.

pub mod domain;
pub mod registry;
pub mod schema;
pub mod storage;

pub use domain::{CountdownMinutes, DomainTags, Tag, TagsError, TimerMode, TimerType};
pub use registry::{
    Binding, LoadOutcome, MalformedPolicy, RegistryOptions, SettingValue, SettingsError,
    SettingsRegistry, Subscription,
};
pub use schema::{keys, ExtensionSettings, SettingsSnapshot};
pub use storage::{KeyValueStore, MemoryStore, StoreError, SubscriptionId};
