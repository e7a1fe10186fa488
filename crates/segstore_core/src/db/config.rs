//! Store configuration and backend selection.
//!
//! # Responsibility
//! - Describe which engine backs the store and how to reach it.
//! - Turn a configuration into a ready, migrated executor.

use crate::context::Context;
use crate::db::exec::{Executor, Session};
#[cfg(feature = "postgres")]
use crate::db::postgres::PostgresExecutor;
use crate::db::sqlite::SqliteExecutor;
use crate::db::{BackendKind, DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Backend connection settings.
///
/// Deserializes from a tagged map, e.g. `{"backend": "sqlite", "path": "/data/segments.db"}`
/// or `{"backend": "postgres", "url": "postgres://..."}`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StoreConfig {
    /// `path = None` opens a private in-memory database.
    Sqlite {
        #[serde(default)]
        path: Option<PathBuf>,
    },
    Postgres { url: String },
}

impl StoreConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite { .. } => BackendKind::Sqlite,
            Self::Postgres { .. } => BackendKind::Postgres,
        }
    }
}

/// Executor chosen at runtime from a `StoreConfig`.
pub enum AnyExecutor {
    Sqlite(SqliteExecutor),
    #[cfg(feature = "postgres")]
    Postgres(PostgresExecutor),
}

/// Opens the configured backend and applies pending migrations.
///
/// # Errors
/// - `DbError::BackendUnavailable` when the configured engine was not
///   compiled in.
pub fn open_store(config: &StoreConfig) -> DbResult<AnyExecutor> {
    match config {
        StoreConfig::Sqlite { path: Some(path) } => {
            Ok(AnyExecutor::Sqlite(SqliteExecutor::open(path)?))
        }
        StoreConfig::Sqlite { path: None } => {
            Ok(AnyExecutor::Sqlite(SqliteExecutor::open_in_memory()?))
        }
        #[cfg(feature = "postgres")]
        StoreConfig::Postgres { url } => Ok(AnyExecutor::Postgres(PostgresExecutor::connect(url)?)),
        #[cfg(not(feature = "postgres"))]
        StoreConfig::Postgres { .. } => Err(DbError::BackendUnavailable(BackendKind::Postgres)),
    }
}

impl Executor for AnyExecutor {
    fn kind(&self) -> BackendKind {
        match self {
            Self::Sqlite(executor) => executor.kind(),
            #[cfg(feature = "postgres")]
            Self::Postgres(executor) => executor.kind(),
        }
    }

    fn with_session<T, E, F>(&self, ctx: &Context, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut dyn Session) -> Result<T, E>,
    {
        match self {
            Self::Sqlite(executor) => executor.with_session(ctx, f),
            #[cfg(feature = "postgres")]
            Self::Postgres(executor) => executor.with_session(ctx, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{open_store, StoreConfig};
    use crate::db::exec::Executor;
    use crate::db::BackendKind;

    #[test]
    fn config_deserializes_tagged_backends() {
        let config: StoreConfig =
            serde_json::from_str(r#"{"backend": "sqlite", "path": "/tmp/segments.db"}"#).unwrap();
        assert_eq!(config.kind(), BackendKind::Sqlite);

        let config: StoreConfig = serde_json::from_str(r#"{"backend": "sqlite"}"#).unwrap();
        assert_eq!(config, StoreConfig::Sqlite { path: None });

        let config: StoreConfig =
            serde_json::from_str(r#"{"backend": "postgres", "url": "postgres://localhost/db"}"#)
                .unwrap();
        assert_eq!(config.kind(), BackendKind::Postgres);
    }

    #[test]
    fn open_store_in_memory_yields_sqlite_executor() {
        let executor = open_store(&StoreConfig::Sqlite { path: None }).unwrap();
        assert_eq!(executor.kind(), BackendKind::Sqlite);
    }

    #[cfg(not(feature = "postgres"))]
    #[test]
    fn postgres_config_without_feature_is_rejected() {
        let result = open_store(&StoreConfig::Postgres {
            url: "postgres://localhost/db".to_string(),
        });
        assert!(matches!(
            result,
            Err(crate::db::DbError::BackendUnavailable(BackendKind::Postgres))
        ));
    }
}
