//! Relational storage for feature-flag segments and their constraints.
//! This crate is the single source of truth for segment persistence rules.

pub mod context;
pub mod db;
pub mod logging;
pub mod model;
pub mod repo;

pub use context::{CancelHandle, Context, ContextError};
pub use db::{open_store, AnyExecutor, BackendKind, DbError, Executor, StoreConfig};
pub use logging::{default_log_level, init_logging, logging_status, LogConfig, LoggingError};
pub use model::constraint::{
    ComparisonType, Constraint, CreateConstraintRequest, DeleteConstraintRequest,
    UpdateConstraintRequest,
};
pub use model::segment::{
    CreateSegmentRequest, DeleteSegmentRequest, ListQuery, MatchType, Segment,
    UpdateSegmentRequest,
};
pub use model::timestamp::Timestamp;
pub use model::ValidationError;
pub use repo::{
    ErrorKind, PartialError, PartialResult, RepoError, RepoResult, SegmentRepository,
    SqlSegmentRepository,
};

/// Returns the core crate version.
pub fn core_version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}

/// Newest schema version this build can migrate to.
pub fn schema_version() -> u32 {
    db::migrations::latest_version()
}
