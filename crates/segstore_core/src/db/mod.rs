//! Storage bootstrap, statement building and backend sessions.
//!
//! # Responsibility
//! - Open and configure connections for each supported SQL engine.
//! - Apply schema migrations in deterministic order.
//! - Expose one `Executor`/`Session` seam so repositories stay engine-agnostic.
//!
//! # Invariants
//! - Core code must not read/write application data before migrations succeed.
//! - Errors raised while the request context is done surface as
//!   `DbError::Interrupted`, never as driver errors.

use crate::context::ContextError;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use thiserror::Error;

pub mod config;
pub mod exec;
pub mod migrations;
mod open;
#[cfg(feature = "postgres")]
pub mod postgres;
pub mod query;
pub mod sqlite;

pub use config::{open_store, AnyExecutor, StoreConfig};
pub use exec::{Executor, Session, SqlRow, SqlValue};
pub use open::{open_db, open_db_in_memory};

pub type DbResult<T> = Result<T, DbError>;

/// Engine family behind an executor.
///
/// Selects placeholder syntax, pagination syntax and the error classifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Embedded, file-based engine.
    Sqlite,
    /// Client-server engine.
    Postgres,
}

impl Display for BackendKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Sqlite => f.write_str("sqlite"),
            Self::Postgres => f.write_str("postgres"),
        }
    }
}

#[derive(Debug, Error)]
pub enum DbError {
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),
    #[cfg(feature = "postgres")]
    #[error(transparent)]
    Postgres(#[from] ::postgres::Error),
    /// The request context ended while the round trip was pending.
    #[error(transparent)]
    Interrupted(#[from] ContextError),
    /// A scanned column could not be decoded into the domain type.
    #[error("invalid persisted data: {0}")]
    InvalidData(String),
    #[error("database schema version {db_version} is newer than supported {latest_supported}")]
    UnsupportedSchemaVersion {
        db_version: u32,
        latest_supported: u32,
    },
    #[error("backend `{0}` is not compiled into this build")]
    BackendUnavailable(BackendKind),
}
