//! Domain types for the NiuMa timer settings.
//!
//! Everything here is plain data plus the rules that decide whether a value
//! is acceptable.  Nothing in this module knows how values are stored; the
//! [`registry`](crate::registry) layer adds persistence and change
//! notification on top.

/// Timer mode, direction and countdown length.
pub mod timer;

/// Work/fun domain classification.
pub mod tags;

pub use tags::{normalize_domain, DomainTags, Tag, TagsError};
pub use timer::{CountdownMinutes, TimerMode, TimerType, TimerValueError};
