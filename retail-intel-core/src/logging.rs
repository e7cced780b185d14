//! Logging infrastructure for retail-intel
//!
//! Tracing output goes to a daily rolling file under the log directory
//! (`~/.local/state/retail-intel/` unless overridden). The server binary can
//! additionally mirror events to stdout for container logs.

use crate::config::Config;
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer,
};

/// Base name of the rolling tracing log
pub const LOG_FILE_NAME: &str = "retail-intel.log";

/// Initialize the logging system
///
/// Sets up tracing with:
/// - File output to the configured log directory
/// - Daily rotation
/// - Configurable log level via config or RUST_LOG env var
/// - Optional stdout mirror
pub fn init(config: &Config, stdout: bool) -> crate::error::Result<LoggingGuard> {
    let log_dir = config.log_dir();

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_NAME);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true);

    let stdout_layer = stdout.then(|| fmt::layer().with_target(false).boxed());

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .with(stdout_layer)
        .init();

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.logging.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Returns the tracing log file path prefix for a config
pub fn log_file_path(config: &Config) -> PathBuf {
    config.log_dir().join(LOG_FILE_NAME)
}
