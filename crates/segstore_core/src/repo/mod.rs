//! Repository layer for segments and constraints.
//!
//! # Responsibility
//! - Define the use-case oriented data access contract.
//! - Keep SQL and per-engine error shapes behind that contract.
//!
//! # Invariants
//! - Writes validate caller input before persistence.
//! - Repository APIs return semantic errors (`NotFound`, `Invalid`,
//!   `Cancelled`, `DeadlineExceeded`) in addition to store errors.

pub mod classify;
pub mod error;
pub mod id;
pub mod segment_repo;

pub use classify::{classifier_for, ErrorClassifier, Violation};
pub use error::{ErrorKind, PartialError, PartialResult, RepoError, RepoResult};
pub use id::{IdGenerator, UuidGenerator};
pub use segment_repo::{SegmentRepository, SqlSegmentRepository};
