//! Rolling file logs for the segment store.
//!
//! # Responsibility
//! - Initialize file-based rolling logs at most once per process.
//! - Keep emitted events metadata-only (`event=... module=... status=...`).
//!
//! # Invariants
//! - Re-initializing with the same settings is a no-op.
//! - Re-initializing with a different level or directory is rejected.
//! - Initialization never panics.

use flexi_logger::{
    Cleanup, Criterion, FileSpec, FlexiLoggerError, Logger, LoggerHandle, Naming, WriteMode,
};
use log::info;
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

const LOG_FILE_BASENAME: &str = "segstore";
const MAX_LOG_FILE_SIZE_BYTES: u64 = 10 * 1024 * 1024;
const MAX_LOG_FILES: usize = 5;

static LOGGING_STATE: OnceCell<LoggingState> = OnceCell::new();

struct LoggingState {
    level: &'static str,
    directory: PathBuf,
    _logger: LoggerHandle,
}

/// Where and how verbosely to log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogConfig {
    /// One of `trace|debug|info|warn|error`, case-insensitive.
    #[serde(default = "default_level_string")]
    pub level: String,
    /// Absolute directory for the rotated log files.
    pub directory: PathBuf,
}

impl LogConfig {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            level: default_level_string(),
            directory: directory.into(),
        }
    }

    pub fn level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }
}

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("unsupported log level `{0}`; expected trace|debug|info|warn|error")]
    UnsupportedLevel(String),
    #[error("log directory must be an absolute path, got `{}`", .0.display())]
    RelativeDirectory(PathBuf),
    #[error("failed to create log directory `{}`: {source}", .path.display())]
    CreateDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to start logger: {0}")]
    Backend(#[from] FlexiLoggerError),
    #[error("logging already initialized with {active}; refusing to switch to {requested}")]
    Conflict { active: String, requested: String },
}

/// Starts the rolling file logger.
///
/// # Errors
/// - `UnsupportedLevel` / `RelativeDirectory` for bad settings.
/// - `CreateDirectory` / `Backend` when the logger cannot start.
/// - `Conflict` when logging is already active with other settings.
pub fn init_logging(config: &LogConfig) -> Result<(), LoggingError> {
    let level = normalize_level(&config.level)?;
    if !config.directory.is_absolute() {
        return Err(LoggingError::RelativeDirectory(config.directory.clone()));
    }

    let state = LOGGING_STATE.get_or_try_init(|| start_logger(level, &config.directory))?;
    ensure_same_settings(state, level, &config.directory)
}

/// Active `(level, directory)`, or `None` before `init_logging` succeeded.
pub fn logging_status() -> Option<(&'static str, PathBuf)> {
    LOGGING_STATE
        .get()
        .map(|state| (state.level, state.directory.clone()))
}

/// `debug` in debug builds, `info` otherwise.
pub fn default_log_level() -> &'static str {
    if cfg!(debug_assertions) {
        "debug"
    } else {
        "info"
    }
}

fn default_level_string() -> String {
    default_log_level().to_string()
}

fn start_logger(level: &'static str, directory: &Path) -> Result<LoggingState, LoggingError> {
    std::fs::create_dir_all(directory).map_err(|source| LoggingError::CreateDirectory {
        path: directory.to_path_buf(),
        source,
    })?;

    let logger = Logger::try_with_str(level)?
        .log_to_file(
            FileSpec::default()
                .directory(directory)
                .basename(LOG_FILE_BASENAME),
        )
        .rotate(
            Criterion::Size(MAX_LOG_FILE_SIZE_BYTES),
            Naming::Numbers,
            Cleanup::KeepLogFiles(MAX_LOG_FILES),
        )
        .write_mode(WriteMode::BufferAndFlush)
        .append()
        .format_for_files(flexi_logger::detailed_format)
        .start()?;

    info!(
        "event=store_logging_start module=core status=ok level={level} version={}",
        env!("CARGO_PKG_VERSION")
    );

    Ok(LoggingState {
        level,
        directory: directory.to_path_buf(),
        _logger: logger,
    })
}

fn ensure_same_settings(
    state: &LoggingState,
    level: &'static str,
    directory: &Path,
) -> Result<(), LoggingError> {
    if state.directory.as_path() != directory {
        return Err(LoggingError::Conflict {
            active: format!("directory `{}`", state.directory.display()),
            requested: format!("`{}`", directory.display()),
        });
    }
    if state.level != level {
        return Err(LoggingError::Conflict {
            active: format!("level `{}`", state.level),
            requested: format!("`{level}`"),
        });
    }
    Ok(())
}

fn normalize_level(level: &str) -> Result<&'static str, LoggingError> {
    match level.trim().to_ascii_lowercase().as_str() {
        "trace" => Ok("trace"),
        "debug" => Ok("debug"),
        "info" => Ok("info"),
        "warn" | "warning" => Ok("warn"),
        "error" => Ok("error"),
        other => Err(LoggingError::UnsupportedLevel(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::{init_logging, logging_status, normalize_level, LogConfig, LoggingError};

    #[test]
    fn normalize_level_accepts_known_values() {
        assert_eq!(normalize_level("INFO").unwrap(), "info");
        assert_eq!(normalize_level(" warning ").unwrap(), "warn");
        assert!(matches!(
            normalize_level("loud"),
            Err(LoggingError::UnsupportedLevel(level)) if level == "loud"
        ));
    }

    #[test]
    fn relative_directory_is_rejected() {
        let err = init_logging(&LogConfig::new("logs/dev")).unwrap_err();
        assert!(matches!(err, LoggingError::RelativeDirectory(_)));
    }

    #[test]
    fn config_deserializes_with_default_level() {
        let config: LogConfig =
            serde_json::from_str(r#"{"directory": "/var/log/segstore"}"#).unwrap();
        assert_eq!(config.level, super::default_log_level());
    }

    #[test]
    fn init_is_idempotent_and_rejects_conflicting_settings() {
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();
        let config = LogConfig::new(first.path()).level("info");

        init_logging(&config).expect("first init should succeed");
        init_logging(&config).expect("same config should be idempotent");

        let err = init_logging(&config.clone().level("debug")).unwrap_err();
        assert!(matches!(err, LoggingError::Conflict { .. }));
        let err = init_logging(&LogConfig::new(second.path()).level("info")).unwrap_err();
        assert!(err.to_string().contains("refusing to switch"));

        let (level, directory) = logging_status().expect("logging should be active");
        assert_eq!(level, "info");
        assert_eq!(directory, first.path());
    }
}
