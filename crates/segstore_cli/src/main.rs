//! CLI smoke entry point.
//!
//! # Responsibility
//! - Verify `segstore_core` linkage and migrations against a real store.
//! - Keep output deterministic for quick local sanity checks.
//!
//! Usage: `segstore_cli [sqlite-path]`; no path opens an in-memory store.

use segstore_core::{
    core_version, open_store, schema_version, Context, ListQuery, SegmentRepository,
    SqlSegmentRepository, StoreConfig,
};
use std::process::ExitCode;

fn main() -> ExitCode {
    println!("segstore_core version={}", core_version());
    println!("segstore_core schema_version={}", schema_version());

    let config = StoreConfig::Sqlite {
        path: std::env::args_os().nth(1).map(Into::into),
    };
    let executor = match open_store(&config) {
        Ok(executor) => executor,
        Err(err) => {
            eprintln!("open failed: {err}");
            return ExitCode::FAILURE;
        }
    };

    let repo = SqlSegmentRepository::new(executor);
    match repo.list_segments(&Context::background(), &ListQuery::new()) {
        Ok(segments) => {
            for segment in &segments {
                println!(
                    "segment key={} match_type={:?} constraints={}",
                    segment.key,
                    segment.match_type,
                    segment.constraints.len()
                );
            }
            println!("segments={}", segments.len());
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("list failed: {err}");
            ExitCode::FAILURE
        }
    }
}
