//! Timer settings: counting mode, counting direction and countdown length.
//!
//! All three types serialise to the same JSON the extension front end writes
//! into `chrome.storage`, so values persisted by either side stay readable:
//!
//! | Type               | JSON examples                    |
//! |--------------------|----------------------------------|
//! | [`TimerMode`]      | `"accumulate"`, `"reset"`        |
//! | [`TimerType`]      | `"countup"`, `"countdown"`       |
//! | [`CountdownMinutes`] | `1`, `25`                      |

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Error returned when parsing or constructing a timer value fails.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TimerValueError {
    #[error("unknown timer mode {0:?}; expected \"accumulate\" or \"reset\"")]
    UnknownMode(String),
    #[error("unknown timer type {0:?}; expected \"countup\" or \"countdown\"")]
    UnknownType(String),
    #[error("countdown minutes must be at least 1, got {0}")]
    NonPositiveMinutes(i64),
    #[error("countdown minutes {0} does not fit in 32 bits")]
    MinutesOutOfRange(i64),
}

/// Whether elapsed time carries over between visits to a page.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerMode {
    /// Every visit continues from the previously accumulated time.
    #[default]
    Accumulate,
    /// Every visit starts again from zero.
    Reset,
}

impl TimerMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accumulate => "accumulate",
            Self::Reset => "reset",
        }
    }
}

impl fmt::Display for TimerMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerMode {
    type Err = TimerValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accumulate" => Ok(Self::Accumulate),
            "reset" => Ok(Self::Reset),
            other => Err(TimerValueError::UnknownMode(other.to_string())),
        }
    }
}

/// Counting direction of the on-page timer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerType {
    /// Counts up from zero.
    #[default]
    Countup,
    /// Counts down from [`CountdownMinutes`].
    Countdown,
}

impl TimerType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Countup => "countup",
            Self::Countdown => "countdown",
        }
    }
}

impl fmt::Display for TimerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimerType {
    type Err = TimerValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "countup" => Ok(Self::Countup),
            "countdown" => Ok(Self::Countdown),
            other => Err(TimerValueError::UnknownType(other.to_string())),
        }
    }
}

/// Length of a countdown in whole minutes.
///
/// Persisted as a bare JSON number.  Zero is representable on the wire (the
/// extension never range-checked it) but is rejected by [`validate`], so a
/// stored `0` is treated as a malformed value and a `set` with `0` fails.
///
/// [`validate`]: CountdownMinutes::validate
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CountdownMinutes(u32);

impl CountdownMinutes {
    /// The default countdown: one minute.
    pub const DEFAULT: Self = Self(1);

    /// Creates a countdown length, rejecting zero.
    pub fn new(minutes: u32) -> Result<Self, TimerValueError> {
        let value = Self(minutes);
        value.validate()?;
        Ok(value)
    }

    pub fn get(self) -> u32 {
        self.0
    }

    /// Total countdown length in seconds.
    pub fn as_secs(self) -> u64 {
        u64::from(self.0) * 60
    }

    /// Checks the value is at least one minute.
    pub fn validate(&self) -> Result<(), TimerValueError> {
        if self.0 == 0 {
            return Err(TimerValueError::NonPositiveMinutes(0));
        }
        Ok(())
    }
}

impl Default for CountdownMinutes {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<i64> for CountdownMinutes {
    type Error = TimerValueError;

    fn try_from(minutes: i64) -> Result<Self, Self::Error> {
        if minutes < 1 {
            return Err(TimerValueError::NonPositiveMinutes(minutes));
        }
        let minutes =
            u32::try_from(minutes).map_err(|_| TimerValueError::MinutesOutOfRange(minutes))?;
        Self::new(minutes)
    }
}

impl fmt::Display for CountdownMinutes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} min", self.0)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
