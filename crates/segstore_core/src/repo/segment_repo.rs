//! Segment and constraint repository contracts and SQL implementation.
//!
//! # Responsibility
//! - Provide read/write APIs over the `segments` and `constraints` tables.
//! - Translate store-detected violations into domain errors at the point
//!   they are raised.
//!
//! # Invariants
//! - Write paths validate caller input before any SQL is issued.
//! - Constraint operators are normalized on both create and update.
//! - Reads reject undecodable persisted state instead of masking it.
//! - Returned errors are not logged here; callers decide.

use crate::context::Context;
use crate::db::exec::{in_transaction, Executor, Session, SqlRow};
use crate::db::query::{Delete, Insert, Select, Update};
use crate::db::{BackendKind, DbError, DbResult};
use crate::model::constraint::{
    normalize_operator_value, validate_constraint_fields, ComparisonType, Constraint,
    CreateConstraintRequest, DeleteConstraintRequest, UpdateConstraintRequest,
};
use crate::model::segment::{
    CreateSegmentRequest, DeleteSegmentRequest, ListQuery, MatchType, Segment,
    UpdateSegmentRequest,
};
use crate::model::timestamp::Timestamp;
use crate::model::ValidationError;
use crate::repo::classify::{classifier_for, ErrorClassifier, Violation};
use crate::repo::error::{PartialError, PartialResult, RepoError, RepoResult};
use crate::repo::id::{IdGenerator, UuidGenerator};

const SEGMENTS_TABLE: &str = "segments";
const CONSTRAINTS_TABLE: &str = "constraints";

const SEGMENT_COLUMNS: &[&str] = &[
    "key",
    "name",
    "description",
    "match_type",
    "created_at",
    "updated_at",
];

const CONSTRAINT_COLUMNS: &[&str] = &[
    "id",
    "segment_key",
    "type",
    "property",
    "operator",
    "value",
    "created_at",
    "updated_at",
];

/// Repository interface for segments and their constraints.
///
/// Every call is bound to `ctx`; once it is cancelled or past its deadline
/// the call fails with `RepoError::Cancelled`/`RepoError::DeadlineExceeded`.
pub trait SegmentRepository {
    /// Fetches one segment with its constraints, oldest first.
    ///
    /// On a constraint-load failure the partial value is the segment with
    /// the constraints decoded so far.
    fn get_segment(&self, ctx: &Context, key: &str) -> PartialResult<Segment, Option<Segment>>;

    /// Lists segments by `created_at` ascending, each with its constraints.
    ///
    /// On failure the partial value holds every fully loaded segment that
    /// preceded it.
    fn list_segments(&self, ctx: &Context, query: &ListQuery) -> PartialResult<Vec<Segment>>;

    fn create_segment(&self, ctx: &Context, request: &CreateSegmentRequest)
        -> RepoResult<Segment>;

    /// Rewrites a segment and reads it back with its constraints.
    ///
    /// Write and read-back share one transaction: if the read-back fails the
    /// write is rolled back and no partial segment is returned.
    fn update_segment(&self, ctx: &Context, request: &UpdateSegmentRequest)
        -> RepoResult<Segment>;

    /// Removes a segment; absent keys are not an error.
    fn delete_segment(&self, ctx: &Context, request: &DeleteSegmentRequest) -> RepoResult<()>;

    fn create_constraint(
        &self,
        ctx: &Context,
        request: &CreateConstraintRequest,
    ) -> RepoResult<Constraint>;

    /// Rewrites a constraint and reads it back in the same transaction; a
    /// failed read-back undoes the write.
    fn update_constraint(
        &self,
        ctx: &Context,
        request: &UpdateConstraintRequest,
    ) -> RepoResult<Constraint>;

    /// Removes a constraint matched by id and segment key; absent rows are
    /// not an error.
    fn delete_constraint(&self, ctx: &Context, request: &DeleteConstraintRequest)
        -> RepoResult<()>;
}

/// Repository over any `Executor`.
pub struct SqlSegmentRepository<E: Executor> {
    executor: E,
    classifier: &'static dyn ErrorClassifier,
    ids: Box<dyn IdGenerator>,
}

impl<E: Executor> SqlSegmentRepository<E> {
    pub fn new(executor: E) -> Self {
        Self::with_id_generator(executor, UuidGenerator)
    }

    pub fn with_id_generator(executor: E, ids: impl IdGenerator + 'static) -> Self {
        let classifier = classifier_for(executor.kind());
        Self {
            executor,
            classifier,
            ids: Box::new(ids),
        }
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    fn kind(&self) -> BackendKind {
        self.executor.kind()
    }
}

impl<E: Executor> SegmentRepository for SqlSegmentRepository<E> {
    fn get_segment(&self, ctx: &Context, key: &str) -> PartialResult<Segment, Option<Segment>> {
        let kind = self.kind();
        self.executor
            .with_session(ctx, |session| fetch_segment(session, kind, key))
    }

    fn list_segments(&self, ctx: &Context, query: &ListQuery) -> PartialResult<Vec<Segment>> {
        let kind = self.kind();
        let stmt = Select::from_table(SEGMENTS_TABLE, SEGMENT_COLUMNS)
            .order_by_asc("created_at")
            .order_by_asc("key")
            .limit(query.effective_limit())
            .offset(query.effective_offset())
            .build(kind);

        self.executor.with_session(ctx, |session| {
            // Segment rows are drained before constraints are fetched so no
            // two cursors are open on the session at once.
            let mut scanned = Vec::new();
            let scan_result = session.query(&stmt, &mut |row| {
                scanned.push(decode_segment(row)?);
                Ok(())
            });

            let mut segments = Vec::with_capacity(scanned.len());
            for mut segment in scanned {
                if let Err(err) = load_constraints(session, kind, &mut segment) {
                    return Err(PartialError::new(segments, err));
                }
                segments.push(segment);
            }

            match scan_result {
                Ok(()) => Ok(segments),
                Err(err) => Err(PartialError::new(segments, err)),
            }
        })
    }

    fn create_segment(
        &self,
        ctx: &Context,
        request: &CreateSegmentRequest,
    ) -> RepoResult<Segment> {
        request
            .validate()
            .map_err(|err| invalid_input(err, &request.key))?;

        let now = Timestamp::now();
        let segment = Segment {
            key: request.key.clone(),
            name: request.name.clone(),
            description: request.description.clone(),
            match_type: request.match_type,
            created_at: now,
            updated_at: now,
            constraints: Vec::new(),
        };
        let stmt = Insert::into_table(SEGMENTS_TABLE)
            .value("key", segment.key.as_str())
            .value("name", segment.name.as_str())
            .value("description", segment.description.as_str())
            .value("match_type", segment.match_type.to_db())
            .value("created_at", segment.created_at)
            .value("updated_at", segment.updated_at)
            .build(self.kind());

        self.executor.with_session(ctx, |session| {
            session.execute(&stmt).map_err(|err| {
                match self.classifier.violation(&err) {
                    Some(Violation::Unique | Violation::Constraint) => {
                        RepoError::invalid("segment key not unique", &segment.key)
                    }
                    _ => RepoError::from(err),
                }
            })
        })?;

        log::debug!(
            "event=segment_create module=repo status=ok backend={}",
            self.kind()
        );
        Ok(segment)
    }

    fn update_segment(
        &self,
        ctx: &Context,
        request: &UpdateSegmentRequest,
    ) -> RepoResult<Segment> {
        request
            .validate()
            .map_err(|err| invalid_input(err, &request.key))?;

        let kind = self.kind();
        let stmt = Update::table(SEGMENTS_TABLE)
            .set("name", request.name.as_str())
            .set("description", request.description.as_str())
            .set("match_type", request.match_type.to_db())
            .set("updated_at", Timestamp::now())
            .where_eq("key", request.key.as_str())
            .build(kind);

        let segment = self.executor.with_session(ctx, |session| {
            in_transaction(session, |session| {
                let changed = session.execute(&stmt)?;
                if changed != 1 {
                    return Err(RepoError::not_found("segment", &request.key));
                }
                Ok(fetch_segment(session, kind, &request.key)?)
            })
        })?;

        log::debug!("event=segment_update module=repo status=ok backend={kind}");
        Ok(segment)
    }

    fn delete_segment(&self, ctx: &Context, request: &DeleteSegmentRequest) -> RepoResult<()> {
        let stmt = Delete::from_table(SEGMENTS_TABLE)
            .where_eq("key", request.key.as_str())
            .build(self.kind());

        let removed = self
            .executor
            .with_session(ctx, |session| session.execute(&stmt).map_err(RepoError::from))?;

        log::debug!(
            "event=segment_delete module=repo status=ok backend={} removed={removed}",
            self.kind()
        );
        Ok(())
    }

    fn create_constraint(
        &self,
        ctx: &Context,
        request: &CreateConstraintRequest,
    ) -> RepoResult<Constraint> {
        let (operator, value) = normalize_operator_value(&request.operator, &request.value);
        validate_constraint_fields(
            &request.segment_key,
            request.comparison_type,
            &request.property,
            &operator,
        )
        .map_err(|err| invalid_input(err, &request.segment_key))?;

        let now = Timestamp::now();
        let constraint = Constraint {
            id: self.ids.next_id(),
            segment_key: request.segment_key.clone(),
            comparison_type: request.comparison_type,
            property: request.property.clone(),
            operator,
            value,
            created_at: now,
            updated_at: now,
        };
        let stmt = Insert::into_table(CONSTRAINTS_TABLE)
            .value("id", constraint.id.as_str())
            .value("segment_key", constraint.segment_key.as_str())
            .value("type", constraint.comparison_type.to_db())
            .value("property", constraint.property.as_str())
            .value("operator", constraint.operator.as_str())
            .value("value", constraint.value.as_str())
            .value("created_at", constraint.created_at)
            .value("updated_at", constraint.updated_at)
            .build(self.kind());

        self.executor.with_session(ctx, |session| {
            session.execute(&stmt).map_err(|err| {
                match self.classifier.violation(&err) {
                    Some(Violation::ForeignKey | Violation::Constraint) => {
                        RepoError::not_found("segment", &constraint.segment_key)
                    }
                    _ => RepoError::from(err),
                }
            })
        })?;

        log::debug!(
            "event=constraint_create module=repo status=ok backend={}",
            self.kind()
        );
        Ok(constraint)
    }

    fn update_constraint(
        &self,
        ctx: &Context,
        request: &UpdateConstraintRequest,
    ) -> RepoResult<Constraint> {
        let (operator, value) = normalize_operator_value(&request.operator, &request.value);
        crate::model::segment::require("id", &request.id)
            .and_then(|()| {
                validate_constraint_fields(
                    &request.segment_key,
                    request.comparison_type,
                    &request.property,
                    &operator,
                )
            })
            .map_err(|err| invalid_input(err, &request.id))?;

        let kind = self.kind();
        let stmt = Update::table(CONSTRAINTS_TABLE)
            .set("type", request.comparison_type.to_db())
            .set("property", request.property.as_str())
            .set("operator", operator.as_str())
            .set("value", value.as_str())
            .set("updated_at", Timestamp::now())
            .where_eq("id", request.id.as_str())
            .where_eq("segment_key", request.segment_key.as_str())
            .build(kind);

        let constraint = self.executor.with_session(ctx, |session| {
            in_transaction(session, |session| {
                let changed = session.execute(&stmt)?;
                if changed != 1 {
                    return Err(RepoError::not_found("constraint", &request.id));
                }
                fetch_constraint(session, kind, &request.id, &request.segment_key)
            })
        })?;

        log::debug!("event=constraint_update module=repo status=ok backend={kind}");
        Ok(constraint)
    }

    fn delete_constraint(
        &self,
        ctx: &Context,
        request: &DeleteConstraintRequest,
    ) -> RepoResult<()> {
        let stmt = Delete::from_table(CONSTRAINTS_TABLE)
            .where_eq("id", request.id.as_str())
            .where_eq("segment_key", request.segment_key.as_str())
            .build(self.kind());

        let removed = self
            .executor
            .with_session(ctx, |session| session.execute(&stmt).map_err(RepoError::from))?;

        log::debug!(
            "event=constraint_delete module=repo status=ok backend={} removed={removed}",
            self.kind()
        );
        Ok(())
    }
}

fn invalid_input(err: ValidationError, key: &str) -> RepoError {
    RepoError::invalid(err.to_string(), key)
}

fn fetch_segment(
    session: &mut dyn Session,
    kind: BackendKind,
    key: &str,
) -> PartialResult<Segment, Option<Segment>> {
    let stmt = Select::from_table(SEGMENTS_TABLE, SEGMENT_COLUMNS)
        .where_eq("key", key)
        .build(kind);

    let mut found = None;
    session.query(&stmt, &mut |row| {
        if found.is_none() {
            found = Some(decode_segment(row)?);
        }
        Ok(())
    })?;

    let Some(mut segment) = found else {
        return Err(RepoError::not_found("segment", key).into());
    };

    match load_constraints(session, kind, &mut segment) {
        Ok(()) => Ok(segment),
        Err(err) => Err(PartialError::new(Some(segment), err)),
    }
}

fn fetch_constraint(
    session: &mut dyn Session,
    kind: BackendKind,
    id: &str,
    segment_key: &str,
) -> RepoResult<Constraint> {
    let stmt = Select::from_table(CONSTRAINTS_TABLE, CONSTRAINT_COLUMNS)
        .where_eq("id", id)
        .where_eq("segment_key", segment_key)
        .build(kind);

    let mut found = None;
    session.query(&stmt, &mut |row| {
        if found.is_none() {
            found = Some(decode_constraint(row)?);
        }
        Ok(())
    })?;

    found.ok_or_else(|| RepoError::not_found("constraint", id))
}

/// Appends the segment's constraints, oldest first.
///
/// On failure `segment.constraints` keeps whatever decoded before it.
fn load_constraints(
    session: &mut dyn Session,
    kind: BackendKind,
    segment: &mut Segment,
) -> DbResult<()> {
    let stmt = Select::from_table(CONSTRAINTS_TABLE, CONSTRAINT_COLUMNS)
        .where_eq("segment_key", segment.key.as_str())
        .order_by_asc("created_at")
        .order_by_asc("id")
        .build(kind);

    let constraints = &mut segment.constraints;
    session.query(&stmt, &mut |row| {
        constraints.push(decode_constraint(row)?);
        Ok(())
    })
}

fn decode_segment(row: &dyn SqlRow) -> DbResult<Segment> {
    let tag = row.int(3)?;
    let match_type = MatchType::from_db(tag).ok_or_else(|| {
        DbError::InvalidData(format!("invalid match type `{tag}` in segments.match_type"))
    })?;

    Ok(Segment {
        key: row.text(0)?,
        name: row.text(1)?,
        description: row.text(2)?,
        match_type,
        created_at: row.timestamp(4)?,
        updated_at: row.timestamp(5)?,
        constraints: Vec::new(),
    })
}

fn decode_constraint(row: &dyn SqlRow) -> DbResult<Constraint> {
    let tag = row.int(2)?;
    let comparison_type = ComparisonType::from_db(tag).ok_or_else(|| {
        DbError::InvalidData(format!("invalid comparison type `{tag}` in constraints.type"))
    })?;

    Ok(Constraint {
        id: row.text(0)?,
        segment_key: row.text(1)?,
        comparison_type,
        property: row.text(3)?,
        operator: row.text(4)?,
        value: row.text(5)?,
        created_at: row.timestamp(6)?,
        updated_at: row.timestamp(7)?,
    })
}

#[cfg(test)]
mod tests {
    use super::{SegmentRepository, SqlSegmentRepository};
    use crate::context::Context;
    use crate::db::sqlite::SqliteExecutor;
    use crate::model::constraint::{ComparisonType, CreateConstraintRequest};
    use crate::model::segment::{CreateSegmentRequest, ListQuery, UpdateSegmentRequest};
    use crate::repo::error::ErrorKind;
    use crate::repo::id::IdGenerator;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct SequentialIds(AtomicUsize);

    impl IdGenerator for SequentialIds {
        fn next_id(&self) -> String {
            format!("c{}", self.0.fetch_add(1, Ordering::SeqCst))
        }
    }

    fn repo() -> SqlSegmentRepository<SqliteExecutor> {
        let executor = SqliteExecutor::open_in_memory().unwrap();
        SqlSegmentRepository::with_id_generator(executor, SequentialIds(AtomicUsize::new(0)))
    }

    #[test]
    fn constraint_ids_come_from_the_injected_generator() {
        let repo = repo();
        let ctx = Context::background();
        repo.create_segment(&ctx, &CreateSegmentRequest::new("s1", "One"))
            .unwrap();

        let first = repo
            .create_constraint(
                &ctx,
                &CreateConstraintRequest::new("s1", ComparisonType::String, "plan", "eq", "pro"),
            )
            .unwrap();
        let second = repo
            .create_constraint(
                &ctx,
                &CreateConstraintRequest::new("s1", ComparisonType::Boolean, "beta", "true", ""),
            )
            .unwrap();

        assert_eq!(first.id, "c0");
        assert_eq!(second.id, "c1");
    }

    #[test]
    fn undecodable_match_type_is_reported_with_partial_list() {
        let repo = repo();
        let ctx = Context::background();
        repo.create_segment(&ctx, &CreateSegmentRequest::new("good", "Good"))
            .unwrap();
        std::thread::sleep(std::time::Duration::from_millis(2));
        repo.create_segment(&ctx, &CreateSegmentRequest::new("bad", "Bad"))
            .unwrap();
        repo.executor().with_connection(|conn| {
            conn.execute("UPDATE segments SET match_type = 9 WHERE key = 'bad';", [])
                .unwrap();
        });

        let err = repo.list_segments(&ctx, &ListQuery::new()).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unclassified);
        assert!(err.to_string().contains("segments.match_type"));
        let (partial, _) = err.into_parts();
        assert_eq!(partial.len(), 1);
        assert_eq!(partial[0].key, "good");
    }

    #[test]
    fn get_reports_segment_when_constraint_decode_fails() {
        let repo = repo();
        let ctx = Context::background();
        repo.create_segment(&ctx, &CreateSegmentRequest::new("s1", "One"))
            .unwrap();
        repo.create_constraint(
            &ctx,
            &CreateConstraintRequest::new("s1", ComparisonType::Number, "age", "gt", "30"),
        )
        .unwrap();
        repo.executor().with_connection(|conn| {
            conn.execute("UPDATE constraints SET type = 42;", []).unwrap();
        });

        let err = repo.get_segment(&ctx, "s1").unwrap_err();
        let (partial, err) = err.into_parts();
        assert_eq!(err.kind(), ErrorKind::Unclassified);
        let segment = partial.expect("segment decoded before constraint failure");
        assert_eq!(segment.key, "s1");
        assert!(segment.constraints.is_empty());
    }

    #[test]
    fn failed_update_read_back_leaves_segment_untouched() {
        let repo = repo();
        let ctx = Context::background();
        repo.create_segment(&ctx, &CreateSegmentRequest::new("s1", "One"))
            .unwrap();
        repo.create_constraint(
            &ctx,
            &CreateConstraintRequest::new("s1", ComparisonType::Number, "age", "gt", "30"),
        )
        .unwrap();
        repo.executor().with_connection(|conn| {
            conn.execute("UPDATE constraints SET type = 42;", []).unwrap();
        });

        let err = repo
            .update_segment(
                &ctx,
                &UpdateSegmentRequest {
                    key: "s1".to_string(),
                    name: "Renamed".to_string(),
                    ..UpdateSegmentRequest::default()
                },
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Unclassified);

        let (partial, _) = repo.get_segment(&ctx, "s1").unwrap_err().into_parts();
        let segment = partial.expect("segment row is still readable");
        assert_eq!(segment.name, "One");
    }

    #[test]
    fn blank_constraint_property_is_rejected_before_sql() {
        let repo = repo();
        let err = repo
            .create_constraint(
                &Context::background(),
                &CreateConstraintRequest::new("missing", ComparisonType::String, "", "eq", "x"),
            )
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Invalid);
    }
}
