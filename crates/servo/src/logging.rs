//! # Logging
//!
//! Console + file output for servo hosts.
//!
//! - File output rolls daily: `<dir>/servo.log.YYYY-MM-DD`
//! - Console output for tailing
//! - Filter via `RUST_LOG` (defaults to `info`)

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::error::{AppError, AppResult};

/// Prefix of the daily log files.
pub const LOG_FILE_PREFIX: &str = "servo.log";

/// Guard that must be kept alive for the duration of logging.
///
/// Dropping it flushes and closes the file writer.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
    log_dir: PathBuf,
}

impl LoggingGuard {
    /// Directory the log files are written to.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }
}

/// Default log directory.
#[must_use]
pub fn default_log_dir() -> &'static str {
    "logs"
}

/// Creates `log_dir` if needed.
///
/// # Errors
///
/// Returns an error if the directory cannot be created.
pub fn prepare_log_dir(log_dir: impl AsRef<Path>) -> io::Result<PathBuf> {
    let dir = log_dir.as_ref().to_path_buf();
    fs::create_dir_all(&dir)?;
    Ok(dir)
}

/// Installs the global subscriber with a daily file layer and a console layer.
///
/// # Errors
///
/// Returns `Io` if the directory cannot be created and `Logging` if a
/// subscriber is already installed.
pub fn init_logging(log_dir: impl AsRef<Path>) -> AppResult<LoggingGuard> {
    let log_dir = prepare_log_dir(log_dir)?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, LOG_FILE_PREFIX);
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_thread_names(true);

    let console_layer = tracing_subscriber::fmt::layer()
        .with_writer(io::stdout)
        .with_target(false);

    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| AppError::Logging(err.to_string()))?;

    Ok(LoggingGuard {
        _file_guard: file_guard,
        log_dir,
    })
}
