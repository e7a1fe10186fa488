//! Runs against a live server; skipped unless `SEGSTORE_POSTGRES_URL` is set.
#![cfg(feature = "postgres")]

use segstore_core::db::postgres::PostgresExecutor;
use segstore_core::{
    ComparisonType, Context, CreateConstraintRequest, CreateSegmentRequest, DeleteSegmentRequest,
    ErrorKind, SegmentRepository, SqlSegmentRepository, UpdateConstraintRequest,
};
use std::time::Duration;
use uuid::Uuid;

const URL_ENV: &str = "SEGSTORE_POSTGRES_URL";

fn setup() -> Option<SqlSegmentRepository<PostgresExecutor>> {
    let url = std::env::var(URL_ENV).ok()?;
    Some(SqlSegmentRepository::new(
        PostgresExecutor::connect(&url).unwrap(),
    ))
}

/// Keys are unique per run so tests can share one database.
fn unique_key(prefix: &str) -> String {
    format!("{prefix}-{}", Uuid::new_v4())
}

#[test]
fn violations_map_to_domain_errors() {
    let Some(repo) = setup() else {
        eprintln!("skipping: {URL_ENV} not set");
        return;
    };
    let ctx = Context::background();
    let key = unique_key("dup");

    repo.create_segment(&ctx, &CreateSegmentRequest::new(&key, "first"))
        .unwrap();
    let err = repo
        .create_segment(&ctx, &CreateSegmentRequest::new(&key, "second"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Invalid);

    let err = repo
        .create_constraint(
            &ctx,
            &CreateConstraintRequest::new(
                unique_key("ghost"),
                ComparisonType::String,
                "plan",
                "eq",
                "pro",
            ),
        )
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);

    repo.delete_segment(&ctx, &DeleteSegmentRequest { key })
        .unwrap();
}

#[test]
fn constraint_lifecycle_roundtrips_timestamps() {
    let Some(repo) = setup() else {
        eprintln!("skipping: {URL_ENV} not set");
        return;
    };
    let ctx = Context::background();
    let key = unique_key("life");
    repo.create_segment(&ctx, &CreateSegmentRequest::new(&key, "life"))
        .unwrap();

    let created = repo
        .create_constraint(
            &ctx,
            &CreateConstraintRequest::new(&key, ComparisonType::String, "plan", "EQ", "pro"),
        )
        .unwrap();
    let segment = repo.get_segment(&ctx, &key).unwrap();
    assert_eq!(segment.constraints, vec![created.clone()]);

    let updated = repo
        .update_constraint(
            &ctx,
            &UpdateConstraintRequest {
                id: created.id.clone(),
                segment_key: key.clone(),
                comparison_type: ComparisonType::String,
                property: "plan".to_string(),
                operator: "NotEmpty".to_string(),
                value: "ignored".to_string(),
            },
        )
        .unwrap();
    assert_eq!(updated.operator, "notempty");
    assert!(updated.value.is_empty());
    assert_eq!(updated.created_at, created.created_at);

    repo.delete_segment(&ctx, &DeleteSegmentRequest { key })
        .unwrap();
}

#[test]
fn expired_deadline_reports_deadline_exceeded() {
    let Some(repo) = setup() else {
        eprintln!("skipping: {URL_ENV} not set");
        return;
    };
    let expired = Context::background().with_timeout(Duration::ZERO);
    std::thread::sleep(Duration::from_millis(1));

    let err = repo.get_segment(&expired, "anything").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DeadlineExceeded);
}
