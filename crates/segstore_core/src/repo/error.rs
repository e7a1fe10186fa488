//! Domain error taxonomy for repository operations.
//!
//! # Invariants
//! - Store-detected violations are translated once, where they are raised.
//! - Everything else passes through as `RepoError::Db` without rewording.

use crate::context::ContextError;
use crate::db::DbError;
use thiserror::Error;

pub type RepoResult<T> = Result<T, RepoError>;

/// Coarse classification callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NotFound,
    Invalid,
    Cancelled,
    DeadlineExceeded,
    Unclassified,
}

#[derive(Debug, Error)]
pub enum RepoError {
    /// Entity absent, or a targeted write matched no row.
    #[error("{entity} {key:?} not found")]
    NotFound { entity: &'static str, key: String },
    /// Caller input rejected locally or by a store uniqueness check.
    #[error("{reason}: {key:?}")]
    Invalid { reason: String, key: String },
    #[error("operation cancelled")]
    Cancelled,
    #[error("deadline exceeded")]
    DeadlineExceeded,
    /// Any other execution, scan or cursor failure, unchanged.
    #[error(transparent)]
    Db(DbError),
}

impl RepoError {
    pub fn not_found(entity: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            entity,
            key: key.into(),
        }
    }

    pub fn invalid(reason: impl Into<String>, key: impl Into<String>) -> Self {
        Self::Invalid {
            reason: reason.into(),
            key: key.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Invalid { .. } => ErrorKind::Invalid,
            Self::Cancelled => ErrorKind::Cancelled,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::Db(_) => ErrorKind::Unclassified,
        }
    }
}

impl From<ContextError> for RepoError {
    fn from(value: ContextError) -> Self {
        match value {
            ContextError::Cancelled => Self::Cancelled,
            ContextError::DeadlineExceeded => Self::DeadlineExceeded,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        match value {
            DbError::Interrupted(err) => err.into(),
            other => Self::Db(other),
        }
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

/// Failure that still carries what was decoded before it happened.
///
/// `Get` carries the segment without (all of) its constraints; `List`
/// carries every fully loaded segment that preceded the failure.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct PartialError<P> {
    pub partial: P,
    #[source]
    pub error: RepoError,
}

pub type PartialResult<T, P = T> = Result<T, PartialError<P>>;

impl<P> PartialError<P> {
    pub fn new(partial: P, error: impl Into<RepoError>) -> Self {
        Self {
            partial,
            error: error.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.error.kind()
    }

    pub fn into_parts(self) -> (P, RepoError) {
        (self.partial, self.error)
    }
}

impl<P: Default> From<RepoError> for PartialError<P> {
    fn from(error: RepoError) -> Self {
        Self::new(P::default(), error)
    }
}

impl<P: Default> From<DbError> for PartialError<P> {
    fn from(error: DbError) -> Self {
        Self::new(P::default(), error)
    }
}

impl<P> From<PartialError<P>> for RepoError {
    fn from(value: PartialError<P>) -> Self {
        value.error
    }
}
