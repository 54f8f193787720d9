//! Infrastructure layer for `niuma-settings`.
//!
//! Contains the file-system adapters: the JSON settings store and the TOML
//! application config.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `niuma_core`, but MUST NOT be imported by the `application` layer.

pub mod storage;
