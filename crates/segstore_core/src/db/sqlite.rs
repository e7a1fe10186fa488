//! SQLite executor built on `rusqlite`.
//!
//! # Responsibility
//! - Serialize sessions over one migrated connection.
//! - Abort an in-flight statement when the request context ends.
//!
//! # Invariants
//! - At most one session holds the connection at a time.
//! - The progress handler installed for a session is removed when the
//!   session ends, and any open transaction is rolled back.

use crate::context::Context;
use crate::db::exec::{lock_within, Executor, Session, SqlRow, SqlValue};
use crate::db::open::{open_db, open_db_in_memory};
use crate::db::query::Statement;
use crate::db::{BackendKind, DbError, DbResult};
use crate::model::timestamp::Timestamp;
use rusqlite::types::ToSqlOutput;
use rusqlite::{params_from_iter, Connection, Row, ToSql};
use std::path::Path;
use std::sync::{Mutex, PoisonError};

/// Virtual machine steps between context checks on a running statement.
const PROGRESS_STEPS: i32 = 1_000;

impl ToSql for SqlValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Self::Text(value) => ToSqlOutput::from(value.as_str()),
            Self::Int(value) => ToSqlOutput::from(*value),
            Self::Timestamp(value) => ToSqlOutput::from(value.to_storage_text()),
        })
    }
}

/// Executor over a single SQLite connection.
pub struct SqliteExecutor {
    conn: Mutex<Connection>,
}

impl SqliteExecutor {
    /// Wraps a connection that is already configured and migrated.
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    /// Opens (and migrates) a database file.
    pub fn open(path: impl AsRef<Path>) -> DbResult<Self> {
        Ok(Self::new(open_db(path)?))
    }

    /// Opens (and migrates) a private in-memory database.
    pub fn open_in_memory() -> DbResult<Self> {
        Ok(Self::new(open_db_in_memory()?))
    }

    /// Runs `f` with exclusive access to the raw connection.
    pub fn with_connection<T>(&self, f: impl FnOnce(&Connection) -> T) -> T {
        let conn = self.conn.lock().unwrap_or_else(PoisonError::into_inner);
        f(&conn)
    }
}

impl Executor for SqliteExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::Sqlite
    }

    fn with_session<T, E, F>(&self, ctx: &Context, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut dyn Session) -> Result<T, E>,
    {
        let conn = lock_within(&self.conn, ctx)?;
        let mut session = SqliteSession::new(&conn, ctx.clone());
        f(&mut session)
    }
}

struct SqliteSession<'conn> {
    conn: &'conn Connection,
    ctx: Context,
    in_transaction: bool,
    hooked: bool,
}

impl<'conn> SqliteSession<'conn> {
    fn new(conn: &'conn Connection, ctx: Context) -> Self {
        let hooked = ctx.can_end();
        if hooked {
            let watched = ctx.clone();
            conn.progress_handler(PROGRESS_STEPS, Some(move || watched.is_done()));
        }
        Self {
            conn,
            ctx,
            in_transaction: false,
            hooked,
        }
    }

    /// Reports the context error instead of the driver error once the
    /// context is done; an interrupted statement fails with a generic code.
    fn settle<T>(&self, result: DbResult<T>) -> DbResult<T> {
        result.map_err(|err| match self.ctx.err() {
            Some(ctx_err) => DbError::Interrupted(ctx_err),
            None => err,
        })
    }

    fn run_batch(&mut self, sql: &str) -> DbResult<()> {
        self.ctx.check()?;
        let result = self.conn.execute_batch(sql).map_err(DbError::from);
        self.settle(result)
    }
}

fn run_query(
    conn: &Connection,
    stmt: &Statement,
    visit: &mut dyn FnMut(&dyn SqlRow) -> DbResult<()>,
) -> DbResult<()> {
    let mut prepared = conn.prepare_cached(stmt.sql())?;
    let mut rows = prepared.query(params_from_iter(stmt.params()))?;
    while let Some(row) = rows.next()? {
        visit(&SqliteRow(row))?;
    }
    Ok(())
}

impl Session for SqliteSession<'_> {
    fn query(
        &mut self,
        stmt: &Statement,
        visit: &mut dyn FnMut(&dyn SqlRow) -> DbResult<()>,
    ) -> DbResult<()> {
        self.ctx.check()?;
        let result = run_query(self.conn, stmt, visit);
        self.settle(result)
    }

    fn execute(&mut self, stmt: &Statement) -> DbResult<u64> {
        self.ctx.check()?;
        let result = self
            .conn
            .prepare_cached(stmt.sql())
            .and_then(|mut prepared| prepared.execute(params_from_iter(stmt.params())))
            .map(|changed| changed as u64)
            .map_err(DbError::from);
        self.settle(result)
    }

    fn begin(&mut self) -> DbResult<()> {
        self.run_batch("BEGIN IMMEDIATE;")?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.run_batch("COMMIT;")?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.in_transaction = false;
        self.conn.execute_batch("ROLLBACK;")?;
        Ok(())
    }
}

impl Drop for SqliteSession<'_> {
    fn drop(&mut self) {
        if self.in_transaction || !self.conn.is_autocommit() {
            let _ = self.conn.execute_batch("ROLLBACK;");
        }
        if self.hooked {
            self.conn.progress_handler(0, None::<fn() -> bool>);
        }
    }
}

struct SqliteRow<'row, 'stmt>(&'row Row<'stmt>);

impl SqlRow for SqliteRow<'_, '_> {
    fn text(&self, idx: usize) -> DbResult<String> {
        Ok(self.0.get(idx)?)
    }

    fn int(&self, idx: usize) -> DbResult<i32> {
        Ok(self.0.get(idx)?)
    }

    fn timestamp(&self, idx: usize) -> DbResult<Timestamp> {
        let text: String = self.0.get(idx)?;
        Timestamp::parse_storage_text(&text).ok_or_else(|| {
            DbError::InvalidData(format!("invalid timestamp `{text}` in column {idx}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::SqliteExecutor;
    use crate::context::{Context, ContextError};
    use crate::db::exec::{Executor, Session};
    use crate::db::query::{Insert, Select, Statement};
    use crate::db::{BackendKind, DbError};
    use crate::model::timestamp::Timestamp;
    use std::sync::mpsc;
    use std::thread;
    use std::time::{Duration, Instant};

    const COLUMNS: &[&str] = &["key"];
    const ENDLESS_COUNT: &str =
        "WITH RECURSIVE n(x) AS (SELECT 1 UNION ALL SELECT x + 1 FROM n) SELECT count(*) FROM n;";

    fn count_segments(executor: &SqliteExecutor, ctx: &Context) -> usize {
        let mut count = 0;
        executor
            .with_session(ctx, |session| {
                session.query(
                    &Select::from_table("segments", COLUMNS).build(BackendKind::Sqlite),
                    &mut |_row| {
                        count += 1;
                        Ok(())
                    },
                )
            })
            .unwrap();
        count
    }

    #[test]
    fn done_context_is_rejected_before_touching_the_connection() {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        let (ctx, handle) = Context::background().with_cancel();
        handle.cancel();

        let err = executor
            .with_session(&ctx, |_session| Ok::<_, DbError>(()))
            .unwrap_err();
        assert!(matches!(err, DbError::Interrupted(ContextError::Cancelled)));
    }

    #[test]
    fn dropped_session_rolls_back_open_transaction() {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        let ctx = Context::background();

        executor
            .with_session(&ctx, |session| {
                session.begin()?;
                session.execute(
                    &Insert::into_table("segments")
                        .value("key", "ghost")
                        .value("name", "ghost")
                        .value("description", "")
                        .value("match_type", 0)
                        .value("created_at", Timestamp::now())
                        .value("updated_at", Timestamp::now())
                        .build(BackendKind::Sqlite),
                )?;
                Ok::<_, DbError>(())
            })
            .unwrap();

        assert_eq!(count_segments(&executor, &ctx), 0);
        executor.with_connection(|conn| assert!(conn.is_autocommit()));
    }

    #[test]
    fn cancel_interrupts_running_statement_and_unhooks_handler() {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        let (ctx, handle) = Context::background().with_cancel();

        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(100));
            handle.cancel();
        });
        let started = Instant::now();
        let err = executor
            .with_session(&ctx, |session| {
                session.query(&Statement::raw(ENDLESS_COUNT), &mut |_row| Ok(()))
            })
            .unwrap_err();
        canceller.join().unwrap();

        assert!(matches!(err, DbError::Interrupted(ContextError::Cancelled)));
        assert!(started.elapsed() < Duration::from_secs(5));
        // A handler left behind would abort this query with the old context.
        assert_eq!(count_segments(&executor, &Context::background()), 0);
    }

    #[test]
    fn deadline_interrupts_running_statement() {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        let ctx = Context::background().with_timeout(Duration::from_millis(50));

        let err = executor
            .with_session(&ctx, |session| {
                session.query(&Statement::raw(ENDLESS_COUNT), &mut |_row| Ok(()))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            DbError::Interrupted(ContextError::DeadlineExceeded)
        ));
    }

    #[test]
    fn waiting_for_busy_connection_honours_deadline() {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        let (held_tx, held_rx) = mpsc::channel();

        thread::scope(|scope| {
            scope.spawn(|| {
                executor.with_connection(|_conn| {
                    held_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(500));
                });
            });
            held_rx.recv().unwrap();

            let ctx = Context::background().with_timeout(Duration::from_millis(20));
            let started = Instant::now();
            let err = executor
                .with_session(&ctx, |_session| Ok::<_, DbError>(()))
                .unwrap_err();

            assert!(matches!(
                err,
                DbError::Interrupted(ContextError::DeadlineExceeded)
            ));
            assert!(
                started.elapsed() < Duration::from_millis(250),
                "waited {:?}",
                started.elapsed()
            );
        });
    }

    #[test]
    fn waiting_for_busy_connection_stops_on_cancel() {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        let (held_tx, held_rx) = mpsc::channel();
        let (ctx, handle) = Context::background().with_cancel();

        thread::scope(|scope| {
            scope.spawn(|| {
                executor.with_connection(|_conn| {
                    held_tx.send(()).unwrap();
                    thread::sleep(Duration::from_millis(500));
                });
            });
            held_rx.recv().unwrap();
            scope.spawn(move || {
                thread::sleep(Duration::from_millis(20));
                handle.cancel();
            });

            let started = Instant::now();
            let err = executor
                .with_session(&ctx, |_session| Ok::<_, DbError>(()))
                .unwrap_err();
            assert!(matches!(err, DbError::Interrupted(ContextError::Cancelled)));
            assert!(started.elapsed() < Duration::from_millis(250));
        });
    }
}
