//! Logging infrastructure for azedarach.
//!
//! Structured logging via the `tracing` ecosystem: a non-blocking file layer
//! writing line-delimited JSON to `<logDir>/az.log`, plus a human-readable
//! console layer on stderr. The TUI owns the terminal, so console logging is
//! only useful before the alternate screen is entered and after it is left.

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::config::default_state_dir;
use crate::error::{AzError, Result};

/// Guard that must be held to ensure log flushing on shutdown.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Initialize the azedarach logging system.
///
/// # Arguments
///
/// * `log_dir` - Optional custom log directory. Defaults to `~/.azedarach/logs/`.
/// * `verbose` - If true, sets log level to DEBUG. Otherwise INFO.
///
/// Returns a [`LogGuard`] that must be held for the application lifetime.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = log_dir.unwrap_or_else(default_log_dir);

    std::fs::create_dir_all(&log_dir)
        .map_err(|e| AzError::io("creating log directory", &log_dir, e))?;

    // Fixed file name so tail -f and the logs overlay always find it
    let file_appender = tracing_appender::rolling::never(&log_dir, "az.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let default_level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("az={default_level},az_core={default_level},az_store={default_level},az_worktree={default_level},az_mux={default_level},az_session={default_level},az_coord={default_level},az_tui={default_level}")));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(true)
        .with_file(verbose)
        .with_line_number(verbose)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .init();

    tracing::debug!(log_dir = %log_dir.display(), verbose, "logging initialized");

    Ok(LogGuard {
        _file_guard: Some(file_guard),
    })
}

/// Initialize minimal console-only logging for testing.
pub fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new("debug"))
        .with_test_writer()
        .try_init();
}

/// Default log directory (`~/.azedarach/logs/`).
pub fn default_log_dir() -> PathBuf {
    default_state_dir().join("logs")
}

/// Default azedarach log file path (`~/.azedarach/logs/az.log`).
pub fn default_log_file() -> PathBuf {
    default_log_dir().join("az.log")
}

/// Directory where final session transcripts are written on stop.
pub fn session_log_dir(log_dir: &std::path::Path) -> PathBuf {
    log_dir.join("sessions")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_log_paths() {
        let dir = default_log_dir();
        assert!(dir.ends_with(".azedarach/logs"));
        assert!(default_log_file().ends_with(".azedarach/logs/az.log"));
    }

    #[test]
    fn test_session_log_dir() {
        let dir = session_log_dir(std::path::Path::new("/tmp/logs"));
        assert_eq!(dir, PathBuf::from("/tmp/logs/sessions"));
    }

    #[test]
    fn test_init_test_logging() {
        // Should not panic when called repeatedly
        init_test_logging();
        init_test_logging();
    }
}
