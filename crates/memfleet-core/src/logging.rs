//! Tracing setup for the supervisor.
//!
//! memfleet keeps its own log apart from anything the workers print. Every
//! run appends JSON lines to `memfleet.log` in the log directory (rolled
//! daily) and echoes a compact human-readable stream to stderr. `-v` or the
//! `verbose` setting lowers the level to DEBUG; `RUST_LOG` overrides both.
//!
//! ```no_run
//! use memfleet_core::logging;
//!
//! let _guard = logging::init_logging(None, false).expect("logging init");
//! tracing::debug!(worker = 2, "starting worker");
//! ```

use std::path::PathBuf;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{
    EnvFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::error::{FleetError, Result};

/// Crate targets that receive the default log level.
const LOG_TARGETS: &[&str] = &[
    "memfleet",
    "memfleet_core",
    "memfleet_config",
    "memfleet_worker",
    "memfleet_engine",
];

/// Flushes the file log when dropped; hold it until the process exits.
pub struct LogGuard {
    _file_guard: Option<WorkerGuard>,
}

/// Install the global subscriber, logging to `log_dir` (or
/// `~/.memfleet/logs/`) and stderr.
pub fn init_logging(log_dir: Option<PathBuf>, verbose: bool) -> Result<LogGuard> {
    let log_dir = match log_dir {
        Some(dir) => dir,
        None => default_log_dir()?,
    };

    std::fs::create_dir_all(&log_dir).map_err(|e| FleetError::DirectoryCreation {
        path: log_dir.clone(),
        source: e,
    })?;

    let file_appender = tracing_appender::rolling::daily(&log_dir, "memfleet.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(verbose)));

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .json()
        .with_span_events(FmtSpan::CLOSE)
        .with_current_span(true)
        .with_span_list(true);

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(true)
        .with_target(verbose)
        .with_thread_ids(false)
        .with_thread_names(false)
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

/// Build the filter directives for every memfleet crate at one level.
pub fn default_directives(verbose: bool) -> String {
    let level = if verbose { "debug" } else { "info" };
    LOG_TARGETS
        .iter()
        .map(|target| format!("{target}={level}"))
        .collect::<Vec<_>>()
        .join(",")
}

/// `~/.memfleet/`, home of the settings file, logs and status files.
pub fn memfleet_home() -> Result<PathBuf> {
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".memfleet"))
        .ok_or_else(|| FleetError::internal("HOME environment variable not set"))
}

/// `~/.memfleet/logs/`
pub fn default_log_dir() -> Result<PathBuf> {
    Ok(memfleet_home()?.join("logs"))
}

/// Log a lifecycle event of worker `index` under the `memfleet::worker`
/// target, with optional extra fields:
///
/// ```ignore
/// log_worker_event!(3, "launch_failed", reason = "exited immediately");
/// ```
#[macro_export]
macro_rules! log_worker_event {
    ($index:expr, $event:expr) => {
        tracing::info!(
            target: "memfleet::worker",
            worker = $index,
            event = $event,
            "worker event"
        )
    };
    ($index:expr, $event:expr, $($field:tt)*) => {
        tracing::info!(
            target: "memfleet::worker",
            worker = $index,
            event = $event,
            $($field)*,
            "worker event"
        )
    };
}
