//! Domain model for segments and their constraints.
//!
//! # Responsibility
//! - Define the records and request shapes exchanged with repository callers.
//! - Own the operator rules that hold regardless of storage backend.
//!
//! # Invariants
//! - Segments are identified by their caller-chosen `key`.
//! - Constraints are identified by a generated `id` and always belong to
//!   exactly one segment.

pub mod constraint;
pub mod segment;
pub mod timestamp;

use crate::model::constraint::ComparisonType;
use thiserror::Error;

/// Caller input rejected before any statement is issued.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("{0} is required")]
    Missing(&'static str),
    #[error("operator {operator:?} is not valid for {comparison_type:?} comparisons")]
    UnsupportedOperator {
        operator: String,
        comparison_type: ComparisonType,
    },
}
