//! Caller-supplied timestamps.
//!
//! The engine never reads a clock. Every time-gated operation receives the
//! current time as a [`Timestamp`] (seconds since the UNIX epoch). A value of
//! zero means "not applicable" and is never compared as a real instant.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Seconds since the UNIX epoch; `0` = not set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Ord, PartialOrd, Default, Serialize, Deserialize)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// The "not applicable" date.
    pub const NONE: Self = Self(0);

    #[must_use]
    pub fn from_secs(secs: u64) -> Self {
        Self(secs)
    }

    /// Convert from a chrono instant. Instants before the epoch map to
    /// [`Timestamp::NONE`].
    #[must_use]
    pub fn from_datetime(dt: DateTime<Utc>) -> Self {
        Self(u64::try_from(dt.timestamp()).unwrap_or(0))
    }

    #[must_use]
    pub fn is_set(&self) -> bool {
        self.0 != 0
    }

    #[must_use]
    pub fn as_secs(&self) -> u64 {
        self.0
    }

    /// `None` for the unset date or values chrono cannot represent.
    #[must_use]
    pub fn to_datetime(&self) -> Option<DateTime<Utc>> {
        if !self.is_set() {
            return None;
        }
        DateTime::from_timestamp(i64::try_from(self.0).ok()?, 0)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if !self.is_set() {
            return write!(f, "n/a");
        }
        match self.to_datetime() {
            Some(dt) => write!(f, "{}", dt.to_rfc3339()),
            None => write!(f, "{}s", self.0),
        }
    }
}
