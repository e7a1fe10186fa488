//! Constraint domain model, operator tables and write requests.
//!
//! # Responsibility
//! - Define the single comparison rule stored under a segment.
//! - Own operator normalization and the no-value rule shared by create and
//!   update paths.
//!
//! # Invariants
//! - Persisted operators are lowercase.
//! - `value` is empty whenever the operator carries no comparison value.

use crate::model::segment::require;
use crate::model::timestamp::Timestamp;
use crate::model::ValidationError;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

pub const OP_EQ: &str = "eq";
pub const OP_NEQ: &str = "neq";
pub const OP_LT: &str = "lt";
pub const OP_LTE: &str = "lte";
pub const OP_GT: &str = "gt";
pub const OP_GTE: &str = "gte";
pub const OP_EMPTY: &str = "empty";
pub const OP_NOT_EMPTY: &str = "notempty";
pub const OP_TRUE: &str = "true";
pub const OP_FALSE: &str = "false";
pub const OP_PRESENT: &str = "present";
pub const OP_NOT_PRESENT: &str = "notpresent";
pub const OP_PREFIX: &str = "prefix";
pub const OP_SUFFIX: &str = "suffix";

/// Operators whose semantics need no comparison value.
static NO_VALUE_OPERATORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        OP_EMPTY,
        OP_NOT_EMPTY,
        OP_TRUE,
        OP_FALSE,
        OP_PRESENT,
        OP_NOT_PRESENT,
    ])
});

static STRING_OPERATORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        OP_EQ,
        OP_NEQ,
        OP_EMPTY,
        OP_NOT_EMPTY,
        OP_PREFIX,
        OP_SUFFIX,
        OP_PRESENT,
        OP_NOT_PRESENT,
    ])
});

static NUMBER_OPERATORS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    HashSet::from([
        OP_EQ,
        OP_NEQ,
        OP_LT,
        OP_LTE,
        OP_GT,
        OP_GTE,
        OP_PRESENT,
        OP_NOT_PRESENT,
    ])
});

static BOOLEAN_OPERATORS: Lazy<HashSet<&'static str>> =
    Lazy::new(|| HashSet::from([OP_TRUE, OP_FALSE, OP_PRESENT, OP_NOT_PRESENT]));

/// Comparison class of a constraint's property.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonType {
    #[default]
    Unknown,
    String,
    Number,
    Boolean,
}

impl ComparisonType {
    /// Integer tag stored in `constraints.type`.
    pub fn to_db(self) -> i32 {
        match self {
            Self::Unknown => 0,
            Self::String => 1,
            Self::Number => 2,
            Self::Boolean => 3,
        }
    }

    pub fn from_db(value: i32) -> Option<Self> {
        match value {
            0 => Some(Self::Unknown),
            1 => Some(Self::String),
            2 => Some(Self::Number),
            3 => Some(Self::Boolean),
            _ => None,
        }
    }

    /// Whether `operator` (already lowercase) applies to this comparison class.
    pub fn supports(self, operator: &str) -> bool {
        match self {
            Self::Unknown => false,
            Self::String => STRING_OPERATORS.contains(operator),
            Self::Number => NUMBER_OPERATORS.contains(operator),
            Self::Boolean => BOOLEAN_OPERATORS.contains(operator),
        }
    }
}

/// Returns whether `operator` (already lowercase) takes no comparison value.
pub fn is_no_value_operator(operator: &str) -> bool {
    NO_VALUE_OPERATORS.contains(operator)
}

/// Lowercases `operator` and clears `value` when the operator takes none.
///
/// Both constraint write paths go through this function.
pub fn normalize_operator_value(operator: &str, value: &str) -> (String, String) {
    let operator = operator.to_lowercase();
    if is_no_value_operator(&operator) {
        return (operator, String::new());
    }
    (operator, value.to_string())
}

/// Checks constraint fields after operator normalization.
pub fn validate_constraint_fields(
    segment_key: &str,
    comparison_type: ComparisonType,
    property: &str,
    operator: &str,
) -> Result<(), ValidationError> {
    require("segment_key", segment_key)?;
    require("property", property)?;
    require("operator", operator)?;
    if !comparison_type.supports(operator) {
        return Err(ValidationError::UnsupportedOperator {
            operator: operator.to_string(),
            comparison_type,
        });
    }
    Ok(())
}

/// Single comparison rule belonging to a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Constraint {
    pub id: String,
    pub segment_key: String,
    /// Serialized as `type` to match the column name.
    #[serde(rename = "type")]
    pub comparison_type: ComparisonType,
    pub property: String,
    pub operator: String,
    pub value: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Input for creating a constraint under an existing segment.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateConstraintRequest {
    pub segment_key: String,
    #[serde(rename = "type")]
    pub comparison_type: ComparisonType,
    pub property: String,
    pub operator: String,
    pub value: String,
}

/// Input for updating a constraint; matched by `id` and `segment_key` together.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConstraintRequest {
    pub id: String,
    pub segment_key: String,
    #[serde(rename = "type")]
    pub comparison_type: ComparisonType,
    pub property: String,
    pub operator: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteConstraintRequest {
    pub id: String,
    pub segment_key: String,
}

impl CreateConstraintRequest {
    pub fn new(
        segment_key: impl Into<String>,
        comparison_type: ComparisonType,
        property: impl Into<String>,
        operator: impl Into<String>,
        value: impl Into<String>,
    ) -> Self {
        Self {
            segment_key: segment_key.into(),
            comparison_type,
            property: property.into(),
            operator: operator.into(),
            value: value.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{
        is_no_value_operator, normalize_operator_value, validate_constraint_fields,
        ComparisonType,
    };
    use crate::model::ValidationError;

    #[test]
    fn normalize_lowercases_and_keeps_value_for_comparisons() {
        let (operator, value) = normalize_operator_value("EQ", "pro");
        assert_eq!(operator, "eq");
        assert_eq!(value, "pro");
    }

    #[test]
    fn normalize_clears_value_for_no_value_operators() {
        for op in ["empty", "NotEmpty", "TRUE", "false", "Present", "notpresent"] {
            let (operator, value) = normalize_operator_value(op, "ignored");
            assert!(is_no_value_operator(&operator), "{operator}");
            assert!(value.is_empty(), "value kept for {operator}");
        }
    }

    #[test]
    fn operator_support_follows_comparison_type() {
        assert!(ComparisonType::String.supports("prefix"));
        assert!(!ComparisonType::String.supports("gt"));
        assert!(ComparisonType::Number.supports("gte"));
        assert!(!ComparisonType::Number.supports("true"));
        assert!(ComparisonType::Boolean.supports("false"));
        assert!(!ComparisonType::Boolean.supports("eq"));
        assert!(!ComparisonType::Unknown.supports("eq"));
    }

    #[test]
    fn validation_rejects_missing_fields_and_foreign_operators() {
        assert_eq!(
            validate_constraint_fields("", ComparisonType::String, "plan", "eq"),
            Err(ValidationError::Missing("segment_key"))
        );
        assert_eq!(
            validate_constraint_fields("s1", ComparisonType::String, " ", "eq"),
            Err(ValidationError::Missing("property"))
        );
        assert!(matches!(
            validate_constraint_fields("s1", ComparisonType::Boolean, "beta", "eq"),
            Err(ValidationError::UnsupportedOperator { .. })
        ));
        assert!(validate_constraint_fields("s1", ComparisonType::Number, "age", "gte").is_ok());
    }

    #[test]
    fn comparison_type_db_tags_roundtrip() {
        for kind in [
            ComparisonType::Unknown,
            ComparisonType::String,
            ComparisonType::Number,
            ComparisonType::Boolean,
        ] {
            assert_eq!(ComparisonType::from_db(kind.to_db()), Some(kind));
        }
        assert_eq!(ComparisonType::from_db(42), None);
    }
}
