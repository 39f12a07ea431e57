//! File logging. The terminal belongs to the TUI, so tracing output goes to a
//! daily rolling file under the platform data dir.

use directories::ProjectDirs;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Environment variable holding the filter directives.
pub const LOG_ENV: &str = "CLIPGRID_LOG";
const DEFAULT_FILTER: &str = "clipgrid=info";

/// Directory the rolling log files are written to.
pub fn log_dir() -> PathBuf {
  ProjectDirs::from("", "", "clipgrid")
    .map(|dirs| dirs.data_local_dir().join("logs"))
    .unwrap_or_else(|| std::env::temp_dir().join("clipgrid-logs"))
}

fn env_filter() -> EnvFilter {
  EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Initialise the global subscriber. Hold the returned guard for the whole run
/// or buffered lines are lost on exit.
pub fn init() -> WorkerGuard {
  let dir = log_dir();
  let _ = std::fs::create_dir_all(&dir);

  let file_appender = tracing_appender::rolling::daily(&dir, "clipgrid.log");
  let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

  tracing_subscriber::registry()
    .with(env_filter())
    .with(fmt::layer().with_writer(non_blocking).with_ansi(false).with_target(true).with_line_number(true))
    .init();

  guard
}

/// Headless runs log to stderr so stdout stays clean for JSON.
pub fn init_stderr() {
  tracing_subscriber::registry().with(env_filter()).with(fmt::layer().with_writer(std::io::stderr)).init();
}
