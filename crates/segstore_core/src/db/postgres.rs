//! Postgres executor built on the blocking `postgres` client.
//!
//! # Responsibility
//! - Serialize sessions over one migrated client.
//! - Cancel the server-side query when the request context ends.
//!
//! # Invariants
//! - At most one session holds the client at a time.
//! - A cancel request is only sent while a round trip is in flight.

use crate::context::Context;
use crate::db::exec::{lock_within, Executor, Session, SqlRow, SqlValue};
use crate::db::migrations::apply_postgres_migrations;
use crate::db::query::Statement;
use crate::db::{BackendKind, DbError, DbResult};
use crate::model::timestamp::Timestamp;
use chrono::{DateTime, Utc};
use log::{error, info};
use postgres::types::ToSql;
use postgres::{Client, NoTls, Row};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::thread;
use std::time::{Duration, Instant};

const WATCHDOG_POLL: Duration = Duration::from_millis(5);

/// Connects to Postgres and applies all pending migrations.
pub fn connect_postgres(url: &str) -> DbResult<Client> {
    let started_at = Instant::now();
    info!("event=db_open module=db status=start backend=postgres");

    let connected = Client::connect(url, NoTls)
        .map_err(DbError::from)
        .and_then(|mut client| {
            apply_postgres_migrations(&mut client)?;
            Ok(client)
        });

    match &connected {
        Ok(_) => info!(
            "event=db_open module=db status=ok backend=postgres duration_ms={}",
            started_at.elapsed().as_millis()
        ),
        Err(err) => error!(
            "event=db_open module=db status=error backend=postgres duration_ms={} error={}",
            started_at.elapsed().as_millis(),
            err
        ),
    }
    connected
}

fn bind_params(params: &[SqlValue]) -> Vec<&(dyn ToSql + Sync)> {
    params
        .iter()
        .map(|param| -> &(dyn ToSql + Sync) {
            match param {
                SqlValue::Text(value) => value,
                SqlValue::Int(value) => value,
                SqlValue::Timestamp(value) => value.as_datetime(),
            }
        })
        .collect()
}

/// Executor over a single Postgres client.
pub struct PostgresExecutor {
    client: Mutex<Client>,
}

impl PostgresExecutor {
    /// Wraps a client whose schema is already migrated.
    pub fn new(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    pub fn connect(url: &str) -> DbResult<Self> {
        Ok(Self::new(connect_postgres(url)?))
    }
}

impl Executor for PostgresExecutor {
    fn kind(&self) -> BackendKind {
        BackendKind::Postgres
    }

    fn with_session<T, E, F>(&self, ctx: &Context, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut dyn Session) -> Result<T, E>,
    {
        let mut client = lock_within(&self.client, ctx)?;
        let mut session = PostgresSession {
            client: &mut *client,
            ctx: ctx.clone(),
            in_transaction: false,
        };
        f(&mut session)
    }
}

struct PostgresSession<'client> {
    client: &'client mut Client,
    ctx: Context,
    in_transaction: bool,
}

impl PostgresSession<'_> {
    /// Runs one round trip, watched by a thread that cancels the server-side
    /// query if the context ends first.
    fn round_trip<T>(
        &mut self,
        op: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
    ) -> DbResult<T> {
        self.ctx.check()?;

        let result = if self.ctx.can_end() {
            let token = self.client.cancel_token();
            let finished = AtomicBool::new(false);
            let ctx = &self.ctx;
            let client = &mut *self.client;
            thread::scope(|scope| {
                let finished = &finished;
                let watchdog = scope.spawn(move || {
                    while !finished.load(Ordering::SeqCst) {
                        if ctx.is_done() {
                            let _ = token.cancel_query(NoTls);
                            return;
                        }
                        thread::park_timeout(WATCHDOG_POLL);
                    }
                });
                let result = op(client);
                finished.store(true, Ordering::SeqCst);
                watchdog.thread().unpark();
                result
            })
        } else {
            op(self.client)
        };

        result.map_err(|err| match self.ctx.err() {
            Some(ctx_err) => DbError::Interrupted(ctx_err),
            None => DbError::Postgres(err),
        })
    }
}

impl Session for PostgresSession<'_> {
    fn query(
        &mut self,
        stmt: &Statement,
        visit: &mut dyn FnMut(&dyn SqlRow) -> DbResult<()>,
    ) -> DbResult<()> {
        let rows =
            self.round_trip(|client| client.query(stmt.sql(), &bind_params(stmt.params())))?;
        for row in &rows {
            visit(&PgRow(row))?;
        }
        Ok(())
    }

    fn execute(&mut self, stmt: &Statement) -> DbResult<u64> {
        self.round_trip(|client| client.execute(stmt.sql(), &bind_params(stmt.params())))
    }

    fn begin(&mut self) -> DbResult<()> {
        self.round_trip(|client| client.batch_execute("BEGIN"))?;
        self.in_transaction = true;
        Ok(())
    }

    fn commit(&mut self) -> DbResult<()> {
        self.round_trip(|client| client.batch_execute("COMMIT"))?;
        self.in_transaction = false;
        Ok(())
    }

    fn rollback(&mut self) -> DbResult<()> {
        self.in_transaction = false;
        self.client.batch_execute("ROLLBACK")?;
        Ok(())
    }
}

impl Drop for PostgresSession<'_> {
    fn drop(&mut self) {
        if self.in_transaction {
            let _ = self.client.batch_execute("ROLLBACK");
        }
    }
}

struct PgRow<'row>(&'row Row);

impl SqlRow for PgRow<'_> {
    fn text(&self, idx: usize) -> DbResult<String> {
        Ok(self.0.try_get(idx)?)
    }

    fn int(&self, idx: usize) -> DbResult<i32> {
        Ok(self.0.try_get(idx)?)
    }

    fn timestamp(&self, idx: usize) -> DbResult<Timestamp> {
        let value: DateTime<Utc> = self.0.try_get(idx)?;
        Ok(Timestamp::from_datetime(value))
    }
}
