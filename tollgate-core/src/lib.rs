//! Tollgate Core - Shared Types
//!
//! Error taxonomy, region names, timestamps and configuration shared by the
//! store, limiter and fetch crates. No I/O lives here.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod clock;
pub mod config;
pub mod error;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{ApiKey, TollgateConfig, DEFAULT_REGIONS, REGION_PLACEHOLDER};
pub use error::{
    ConfigError, ProviderError, ProviderErrorKind, QueryError, StorageError, TollgateError,
    TollgateResult,
};

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// A routing partition on the remote provider (e.g. `na1`, `euw1`).
///
/// Region names are case-insensitive; they are stored lowercase so `NA1`
/// and `na1` address the same limiter scope and cache rows.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Region(String);

impl Region {
    pub fn new(name: impl AsRef<str>) -> Self {
        Self(name.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Region {
    fn from(name: &str) -> Self {
        Self::new(name)
    }
}

impl From<String> for Region {
    fn from(name: String) -> Self {
        Self::new(name)
    }
}

impl AsRef<str> for Region {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Convert a timestamp into the integer milliseconds persisted in the store.
pub fn timestamp_to_millis(ts: Timestamp) -> i64 {
    ts.timestamp_millis()
}

/// Inverse of [`timestamp_to_millis`]; `None` when out of chrono's range.
pub fn timestamp_from_millis(millis: i64) -> Option<Timestamp> {
    DateTime::<Utc>::from_timestamp_millis(millis)
}
