//! Application layer use cases for `niuma-settings`.
//!
//! Use cases orchestrate `niuma_core` types to fulfil one user goal.  They
//! depend on the `KeyValueStore` trait, never on a concrete store, and do no
//! file-system access of their own.
//!
//! # Sub-modules
//!
//! - **`manage_settings`** – Opens the registry over a store and reads,
//!   writes and resets settings addressed by their string keys.
//!
//! - **`manage_tags`** – Adds and removes domains from the work/fun lists
//!   and classifies a host.

pub mod manage_settings;
pub mod manage_tags;
