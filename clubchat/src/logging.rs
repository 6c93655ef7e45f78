//! File-based logging setup for the sync engine.
//!
//! The engine is embedded inside a UI application that owns stdout, so
//! logs go to a file through a non-blocking appender. The embedding app
//! calls [`init`] once at startup and holds the returned guard until
//! shutdown so buffered entries are flushed.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;

/// Initialize file-based logging.
///
/// `level` is the default filter when `RUST_LOG` is unset. When
/// `file_path` is `None`, logs go to `clubchat.log` in the system temp
/// directory. Returns `None` if the path has no parent directory or a
/// non-UTF-8 file name.
pub fn init(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("clubchat.log");
    let log_path = file_path.unwrap_or(&default_path);

    let log_dir = log_path.parent()?;
    let file_name = log_path.file_name()?.to_str()?;

    let file_appender = tracing_appender::rolling::never(log_dir, file_name);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_writer(non_blocking)
        .with_env_filter(env_filter)
        .with_ansi(false)
        .init();

    Some(guard)
}
