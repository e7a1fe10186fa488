//! Segment domain model and write requests.
//!
//! # Responsibility
//! - Define the segment record returned by repository reads and writes.
//! - Define caller-facing request shapes for segment mutations.
//!
//! # Invariants
//! - `key` is immutable after creation.
//! - `created_at` never changes; `updated_at` is refreshed on every write.
//! - `constraints` is a read projection ordered by `created_at` ascending;
//!   the store, not this value, is authoritative.

use crate::model::constraint::Constraint;
use crate::model::timestamp::Timestamp;
use crate::model::ValidationError;
use serde::{Deserialize, Serialize};

/// How the constraints of a segment combine during evaluation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchType {
    /// Every constraint must match.
    #[default]
    All,
    /// At least one constraint must match.
    Any,
}

impl MatchType {
    /// Integer tag stored in `segments.match_type`.
    pub fn to_db(self) -> i32 {
        match self {
            Self::All => 0,
            Self::Any => 1,
        }
    }

    pub fn from_db(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::All),
            1 => Some(Self::Any),
            _ => None,
        }
    }
}

/// Named grouping rule composed of ordered constraints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Segment {
    pub key: String,
    pub name: String,
    pub description: String,
    pub match_type: MatchType,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
    /// Loaded on read, oldest first.
    #[serde(default)]
    pub constraints: Vec<Constraint>,
}

/// Input for creating a segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateSegmentRequest {
    pub key: String,
    pub name: String,
    pub description: String,
    pub match_type: MatchType,
}

/// Input for updating the mutable fields of an existing segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateSegmentRequest {
    pub key: String,
    pub name: String,
    pub description: String,
    pub match_type: MatchType,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSegmentRequest {
    pub key: String,
}

impl CreateSegmentRequest {
    pub fn new(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        require("key", &self.key)
    }
}

impl UpdateSegmentRequest {
    pub fn validate(&self) -> Result<(), ValidationError> {
        require("key", &self.key)
    }
}

pub(crate) fn require(field: &'static str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        return Err(ValidationError::Missing(field));
    }
    Ok(())
}

/// Pagination for segment listing.
///
/// Non-positive values are ignored: `limit <= 0` means unbounded and
/// `offset <= 0` starts from the first row.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListQuery {
    pub limit: i64,
    pub offset: i64,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn limit(mut self, limit: i64) -> Self {
        self.limit = limit;
        self
    }

    pub fn offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    /// Effective row cap, if any.
    pub fn effective_limit(&self) -> Option<u64> {
        u64::try_from(self.limit).ok().filter(|limit| *limit > 0)
    }

    /// Effective number of rows to skip, if any.
    pub fn effective_offset(&self) -> Option<u64> {
        u64::try_from(self.offset).ok().filter(|offset| *offset > 0)
    }
}
