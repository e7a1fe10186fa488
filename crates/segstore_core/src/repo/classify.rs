//! Backend-specific constraint-violation detection.
//!
//! # Responsibility
//! - Recognize integrity violations in opaque driver errors.
//! - Keep per-engine error shapes out of repository call sites.
//!
//! # Invariants
//! - Anything not recognized as a violation yields `None` and must be
//!   passed through unchanged by the caller.

use crate::db::{BackendKind, DbError};
use rusqlite::ErrorCode;

/// Integrity rule the store rejected a write with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Violation {
    Unique,
    ForeignKey,
    /// The engine only reported a generic constraint failure.
    Constraint,
}

pub trait ErrorClassifier: Send + Sync {
    fn violation(&self, err: &DbError) -> Option<Violation>;
}

/// Embedded engine: one primary constraint code, refined by extended codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteClassifier;

// Extended result codes from sqlite3.h.
const SQLITE_CONSTRAINT_FOREIGNKEY: i32 = 787;
const SQLITE_CONSTRAINT_PRIMARYKEY: i32 = 1555;
const SQLITE_CONSTRAINT_UNIQUE: i32 = 2067;

impl ErrorClassifier for SqliteClassifier {
    fn violation(&self, err: &DbError) -> Option<Violation> {
        let DbError::Sqlite(rusqlite::Error::SqliteFailure(failure, _)) = err else {
            return None;
        };
        if failure.code != ErrorCode::ConstraintViolation {
            return None;
        }
        Some(match failure.extended_code {
            SQLITE_CONSTRAINT_UNIQUE | SQLITE_CONSTRAINT_PRIMARYKEY => Violation::Unique,
            SQLITE_CONSTRAINT_FOREIGNKEY => Violation::ForeignKey,
            _ => Violation::Constraint,
        })
    }
}

/// Client-server engine: named SQLSTATE codes.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresClassifier;

const PG_UNIQUE_VIOLATION: &str = "23505";
const PG_FOREIGN_KEY_VIOLATION: &str = "23503";
const PG_INTEGRITY_CLASS: &str = "23";

impl PostgresClassifier {
    #[cfg_attr(not(feature = "postgres"), allow(dead_code))]
    fn from_sqlstate(code: &str) -> Option<Violation> {
        match code {
            PG_UNIQUE_VIOLATION => Some(Violation::Unique),
            PG_FOREIGN_KEY_VIOLATION => Some(Violation::ForeignKey),
            other if other.starts_with(PG_INTEGRITY_CLASS) => Some(Violation::Constraint),
            _ => None,
        }
    }
}

impl ErrorClassifier for PostgresClassifier {
    #[cfg(feature = "postgres")]
    fn violation(&self, err: &DbError) -> Option<Violation> {
        let DbError::Postgres(pg_err) = err else {
            return None;
        };
        pg_err
            .code()
            .and_then(|state| Self::from_sqlstate(state.code()))
    }

    #[cfg(not(feature = "postgres"))]
    fn violation(&self, _err: &DbError) -> Option<Violation> {
        None
    }
}

/// Picks the classifier for a backend family.
pub fn classifier_for(kind: BackendKind) -> &'static dyn ErrorClassifier {
    static SQLITE: SqliteClassifier = SqliteClassifier;
    static POSTGRES: PostgresClassifier = PostgresClassifier;
    match kind {
        BackendKind::Sqlite => &SQLITE,
        BackendKind::Postgres => &POSTGRES,
    }
}
