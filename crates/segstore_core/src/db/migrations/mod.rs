//! Migration registry and executors for every backend.
//!
//! # Responsibility
//! - Register schema migrations in strictly increasing order.
//! - Apply pending migrations atomically.
//!
//! # Invariants
//! - `version` values must remain monotonic.
//! - Every version ships SQL for every backend.
//! - SQLite mirrors the applied version to `PRAGMA user_version`; Postgres
//!   records it in `segstore_schema_version`.

use crate::db::{DbError, DbResult};
use log::info;
use rusqlite::Connection;

#[derive(Debug, Clone, Copy)]
struct Migration {
    version: u32,
    sqlite: &'static str,
    #[cfg_attr(not(feature = "postgres"), allow(dead_code))]
    postgres: &'static str,
}

const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        sqlite: include_str!("sqlite/0001_segments.sql"),
        postgres: include_str!("postgres/0001_segments.sql"),
    },
    Migration {
        version: 2,
        sqlite: include_str!("sqlite/0002_constraints.sql"),
        postgres: include_str!("postgres/0002_constraints.sql"),
    },
];

/// Returns the latest migration version known by this binary.
pub fn latest_version() -> u32 {
    MIGRATIONS.last().map_or(0, |migration| migration.version)
}

fn pending(current_version: u32) -> DbResult<impl Iterator<Item = &'static Migration>> {
    let latest = latest_version();
    if current_version > latest {
        return Err(DbError::UnsupportedSchemaVersion {
            db_version: current_version,
            latest_supported: latest,
        });
    }

    Ok(MIGRATIONS
        .iter()
        .filter(move |migration| migration.version > current_version))
}

/// Applies all pending SQLite migrations on the provided connection.
pub fn apply_migrations(conn: &mut Connection) -> DbResult<()> {
    let current_version = sqlite_user_version(conn)?;
    let mut pending = pending(current_version)?.peekable();
    if pending.peek().is_none() {
        return Ok(());
    }

    let tx = conn.transaction()?;
    for migration in pending {
        tx.execute_batch(migration.sqlite)?;
        tx.execute_batch(&format!("PRAGMA user_version = {};", migration.version))?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok backend=sqlite from={} to={}",
        current_version,
        latest_version()
    );
    Ok(())
}

/// Reads the schema version recorded on a SQLite connection.
pub fn sqlite_user_version(conn: &Connection) -> DbResult<u32> {
    let version = conn.query_row("PRAGMA user_version;", [], |row| row.get::<_, u32>(0))?;
    Ok(version)
}

#[cfg(feature = "postgres")]
const PG_VERSION_TABLE_SQL: &str =
    "CREATE TABLE IF NOT EXISTS segstore_schema_version (version INTEGER NOT NULL);";

/// Applies all pending Postgres migrations on the provided client.
#[cfg(feature = "postgres")]
pub fn apply_postgres_migrations(client: &mut ::postgres::Client) -> DbResult<()> {
    client.batch_execute(PG_VERSION_TABLE_SQL)?;
    let current_version = postgres_schema_version(client)?;
    let mut pending = pending(current_version)?.peekable();
    if pending.peek().is_none() {
        return Ok(());
    }

    let mut tx = client.transaction()?;
    for migration in pending {
        tx.batch_execute(migration.postgres)?;
        let version = i32::try_from(migration.version).map_err(|_| {
            DbError::InvalidData(format!("migration version {} overflows", migration.version))
        })?;
        tx.execute(
            "INSERT INTO segstore_schema_version (version) VALUES ($1)",
            &[&version],
        )?;
    }
    tx.commit()?;

    info!(
        "event=db_migrate module=db status=ok backend=postgres from={} to={}",
        current_version,
        latest_version()
    );
    Ok(())
}

/// Reads the highest schema version recorded in Postgres.
#[cfg(feature = "postgres")]
pub fn postgres_schema_version(client: &mut ::postgres::Client) -> DbResult<u32> {
    let row = client.query_one(
        "SELECT COALESCE(MAX(version), 0) FROM segstore_schema_version",
        &[],
    )?;
    let version: i32 = row.try_get(0)?;
    u32::try_from(version)
        .map_err(|_| DbError::InvalidData(format!("negative schema version {version}")))
}
