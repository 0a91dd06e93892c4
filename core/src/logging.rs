//! # Logging
//!
//! Initializes the global `tracing` subscriber once, at process startup.
//! Structured, leveled application logging (this module) is distinct from
//! the per-process log files the supervisor tails for managed children
//! (`supervisor::spawn::wire_logging`, §4.8) and from the request-level
//! access log the dispatcher emits per `ProxyLoggingConfig` (§6).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, EnvFilter};

/// Directive applied when nothing more specific is configured (`LOG_LEVEL`
/// env var, then `proxy.yaml`'s `logging.level`, then this).
const DEFAULT_DIRECTIVE: &str = "info";

/// Holds the non-blocking writer's flush guard; the caller must keep this
/// alive for the life of the process, or buffered log lines are dropped on
/// exit.
pub struct LoggingGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Installs the global subscriber. `level` and `file` come from
/// `ProxyLoggingConfig` with `LOG_LEVEL`/`LOG_FILE` already applied as
/// overrides by the caller (§6); `json` switches the stdout layer to
/// structured JSON for production log aggregation.
pub fn init(level: Option<&str>, file: Option<&Path>, json: bool) -> LoggingGuard {
    let make_filter = || {
        EnvFilter::try_new(level.unwrap_or(DEFAULT_DIRECTIVE))
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))
    };

    let file_guard = match file {
        Some(path) => {
            let (dir, prefix) = split_log_path(path);
            let file_appender = tracing_appender::rolling::daily(dir, prefix);
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);
            if json {
                fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .json()
                    .with_writer(non_blocking)
                    .init();
            } else {
                fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .with_ansi(false)
                    .with_writer(non_blocking)
                    .init();
            }
            Some(guard)
        }
        None => {
            if json {
                fmt()
                    .with_env_filter(make_filter())
                    .with_target(true)
                    .json()
                    .init();
            } else {
                fmt().with_env_filter(make_filter()).with_target(true).init();
            }
            None
        }
    };

    LoggingGuard {
        _file_guard: file_guard,
    }
}

fn split_log_path(path: &Path) -> (std::path::PathBuf, String) {
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| std::path::PathBuf::from("."));
    let prefix = path
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "gatewayd.log".to_string());
    (dir, prefix)
}
