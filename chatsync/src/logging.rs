//! File-based `tracing` setup for applications embedding the engine.

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;

use crate::config::SyncConfig;

/// Initialize file-based logging.
///
/// `RUST_LOG` takes precedence over `level`. Logs go to `file_path`, or to
/// `$TMPDIR/chatsync.log` when none is given. Returns a [`WorkerGuard`]
/// that must be held until shutdown so buffered entries are flushed, or
/// `None` if the path has no parent directory or file name, or if the
/// host application already installed a global subscriber.
pub fn init_logging(level: &str, file_path: Option<&Path>) -> Option<WorkerGuard> {
    let default_path = std::env::temp_dir().join("chatsync.log");
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
        .try_init()
        .ok()?;

    Some(guard)
}

/// [`init_logging`] driven by the `[logging]` config section.
pub fn init_from_config(config: &SyncConfig) -> Option<WorkerGuard> {
    init_logging(&config.log_level, config.log_file.as_deref())
}
