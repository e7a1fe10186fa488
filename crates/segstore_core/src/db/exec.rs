//! Backend-neutral execution seam.
//!
//! Repositories talk to `Executor`/`Session` only; each engine supplies one
//! implementation. A session is bound to one connection and one request
//! context for its whole lifetime, so statements issued through it (including
//! `BEGIN`/`COMMIT`) share a connection.

use crate::context::Context;
use crate::db::query::Statement;
use crate::db::{BackendKind, DbError, DbResult};
use crate::model::timestamp::Timestamp;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, TryLockError};
use std::thread;
use std::time::{Duration, Instant};

/// Pause between attempts to take a busy connection.
const LOCK_POLL: Duration = Duration::from_millis(1);

/// Bind parameter accepted by every backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlValue {
    Text(String),
    Int(i32),
    Timestamp(Timestamp),
}

impl From<&str> for SqlValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for SqlValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<i32> for SqlValue {
    fn from(value: i32) -> Self {
        Self::Int(value)
    }
}

impl From<Timestamp> for SqlValue {
    fn from(value: Timestamp) -> Self {
        Self::Timestamp(value)
    }
}

/// Positional column access on one result row.
pub trait SqlRow {
    fn text(&self, idx: usize) -> DbResult<String>;
    fn int(&self, idx: usize) -> DbResult<i32>;
    fn timestamp(&self, idx: usize) -> DbResult<Timestamp>;
}

/// One connection checked out for one request.
///
/// Dropping a session rolls back a transaction it left open.
pub trait Session {
    /// Runs a query and hands every row to `visit`, in result order.
    ///
    /// The cursor is released before this returns, on every path.
    fn query(
        &mut self,
        stmt: &Statement,
        visit: &mut dyn FnMut(&dyn SqlRow) -> DbResult<()>,
    ) -> DbResult<()>;

    /// Executes a write and returns the affected-row count.
    fn execute(&mut self, stmt: &Statement) -> DbResult<u64>;

    fn begin(&mut self) -> DbResult<()>;
    fn commit(&mut self) -> DbResult<()>;
    fn rollback(&mut self) -> DbResult<()>;
}

/// Source of sessions for one backend.
pub trait Executor: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Checks out a session bound to `ctx` and runs `f` with it.
    fn with_session<T, E, F>(&self, ctx: &Context, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut dyn Session) -> Result<T, E>;
}

impl<X: Executor> Executor for &X {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn with_session<T, E, F>(&self, ctx: &Context, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut dyn Session) -> Result<T, E>,
    {
        (**self).with_session(ctx, f)
    }
}

impl<X: Executor> Executor for Arc<X> {
    fn kind(&self) -> BackendKind {
        (**self).kind()
    }

    fn with_session<T, E, F>(&self, ctx: &Context, f: F) -> Result<T, E>
    where
        E: From<DbError>,
        F: FnOnce(&mut dyn Session) -> Result<T, E>,
    {
        (**self).with_session(ctx, f)
    }
}

/// Takes the connection guarded by `mutex`, giving up once `ctx` is done.
///
/// A poisoned lock is recovered: its holder's session rolled back on unwind.
pub(crate) fn lock_within<'a, C>(
    mutex: &'a Mutex<C>,
    ctx: &Context,
) -> DbResult<MutexGuard<'a, C>> {
    ctx.check()?;
    if !ctx.can_end() {
        return Ok(mutex.lock().unwrap_or_else(PoisonError::into_inner));
    }
    loop {
        match mutex.try_lock() {
            Ok(guard) => return Ok(guard),
            Err(TryLockError::Poisoned(poisoned)) => return Ok(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => {
                ctx.check()?;
                let pause = ctx.deadline().map_or(LOCK_POLL, |deadline| {
                    deadline
                        .saturating_duration_since(Instant::now())
                        .min(LOCK_POLL)
                });
                thread::sleep(pause);
            }
        }
    }
}

/// Runs `f` inside `BEGIN`/`COMMIT`; rolls back when `f` fails.
pub fn in_transaction<T, E, F>(session: &mut dyn Session, f: F) -> Result<T, E>
where
    E: From<DbError>,
    F: FnOnce(&mut dyn Session) -> Result<T, E>,
{
    session.begin()?;
    match f(session) {
        Ok(value) => {
            session.commit()?;
            Ok(value)
        }
        Err(err) => {
            // The original failure is the one worth reporting.
            let _ = session.rollback();
            Err(err)
        }
    }
}
