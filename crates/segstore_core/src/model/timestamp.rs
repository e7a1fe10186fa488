//! Wire timestamp shared by segments and constraints.
//!
//! # Responsibility
//! - Provide the timestamp value exposed on domain records.
//! - Keep the storage text encoding in one place for text-backed engines.
//!
//! # Invariants
//! - Values are always UTC and carry at most microsecond precision, so a
//!   value survives a round trip through any supported backend unchanged.
//! - The text encoding sorts lexicographically in time order.

use chrono::{DateTime, NaiveDateTime, SubsecRound, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};

const STORAGE_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.6fZ";
const LEGACY_STORAGE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// UTC instant with microsecond precision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Timestamp(DateTime<Utc>);

impl Timestamp {
    /// Current time, truncated to microseconds.
    pub fn now() -> Self {
        Self::from_datetime(Utc::now())
    }

    /// Builds a timestamp from a chrono value, dropping sub-microsecond digits.
    pub fn from_datetime(value: DateTime<Utc>) -> Self {
        Self(value.trunc_subsecs(6))
    }

    /// Builds a timestamp from protobuf-style `seconds` + `nanos` parts.
    ///
    /// Returns `None` when the parts are out of chrono's representable range.
    pub fn from_unix(seconds: i64, nanos: u32) -> Option<Self> {
        Utc.timestamp_opt(seconds, nanos)
            .single()
            .map(Self::from_datetime)
    }

    /// Whole seconds since the unix epoch.
    pub fn seconds(&self) -> i64 {
        self.0.timestamp()
    }

    /// Sub-second part in nanoseconds (always a multiple of 1000).
    pub fn nanos(&self) -> u32 {
        self.0.timestamp_subsec_nanos()
    }

    pub fn as_datetime(&self) -> &DateTime<Utc> {
        &self.0
    }

    /// Encodes the value for TEXT timestamp columns.
    pub fn to_storage_text(&self) -> String {
        self.0.format(STORAGE_FORMAT).to_string()
    }

    /// Decodes a TEXT timestamp column.
    ///
    /// Accepts the canonical encoding, any RFC 3339 value, and the
    /// `CURRENT_TIMESTAMP` shape SQLite writes for column defaults.
    pub fn parse_storage_text(value: &str) -> Option<Self> {
        if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
            return Some(Self::from_datetime(parsed.with_timezone(&Utc)));
        }

        NaiveDateTime::parse_from_str(value, LEGACY_STORAGE_FORMAT)
            .ok()
            .map(|naive| Self::from_datetime(naive.and_utc()))
    }
}

impl From<DateTime<Utc>> for Timestamp {
    fn from(value: DateTime<Utc>) -> Self {
        Self::from_datetime(value)
    }
}

impl Display for Timestamp {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_storage_text())
    }
}
