//! Storage infrastructure: the settings store file and the tool's own config.
//!
//! - `json_file` persists extension settings as one JSON object on disk and
//!   implements `niuma_core::KeyValueStore`.
//! - `config` reads and writes the TOML file that says where that store lives
//!   and how the registry should treat malformed values.

pub mod config;
pub mod json_file;
