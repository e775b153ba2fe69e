//! Tracing configuration and log routing.
//!
//! The server logs to stdout through a compact formatter and to a file. When `PDFRAG_LOG_FILE`
//! is set, logs are appended to that path; otherwise the file logger writes `logs/pdfrag.log`.
//! Pipeline stages run in background tasks, so the file sink is where stage diagnostics end up
//! after an upload has already been acknowledged.
//!
//! The CLI keeps stdout for answers and artifacts, so its logs go to stderr only.
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_ENV: &str = "PDFRAG_LOG_FILE";
const DEFAULT_LOG_DIR: &str = "logs";
const DEFAULT_LOG_FILE: &str = "pdfrag.log";

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Where a process wants its log output routed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LogTarget {
    /// Long-running HTTP server: stdout plus the log file.
    Server,
    /// Interactive CLI: stderr only, quieter default level.
    Cli,
}

/// Configure tracing subscribers for the given process kind.
///
/// - Respects `RUST_LOG` for filtering (defaults to `info` for the server, `warn` for the CLI).
/// - Keeps the non‑blocking file writer guard alive for the process lifetime.
pub fn init_tracing(target: LogTarget) {
    let default_level = match target {
        LogTarget::Server => "info",
        LogTarget::Cli => "warn",
    };
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    match target {
        LogTarget::Cli => {
            let stderr_layer = fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(false)
                .compact();
            tracing_subscriber::registry()
                .with(env_filter)
                .with(stderr_layer)
                .init();
        }
        LogTarget::Server => {
            let stdout_layer = fmt::layer().with_target(false).compact();
            let registry = tracing_subscriber::registry()
                .with(env_filter)
                .with(stdout_layer);

            if let Some(writer) = configure_file_writer() {
                let file_layer = fmt::layer()
                    .with_writer(writer)
                    .with_target(true)
                    .with_ansi(false)
                    .compact();
                registry.with(file_layer).init();
            } else {
                registry.init();
            }
        }
    }
}

/// Build a non‑blocking writer for file logging.
///
/// Returns `None` when the logs directory cannot be created or the target file cannot be opened.
fn configure_file_writer() -> Option<NonBlocking> {
    let (non_blocking, guard) = match std::env::var(LOG_FILE_ENV) {
        Ok(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .map_err(|err| eprintln!("Failed to open log file {path}: {err}"))
                .ok()?;
            tracing_appender::non_blocking(file)
        }
        Err(_) => {
            std::fs::create_dir_all(DEFAULT_LOG_DIR)
                .map_err(|err| eprintln!("Failed to create logs directory: {err}"))
                .ok()?;
            tracing_appender::non_blocking(tracing_appender::rolling::never(
                DEFAULT_LOG_DIR,
                DEFAULT_LOG_FILE,
            ))
        }
    };
    let _ = LOG_GUARD.set(guard);
    Some(non_blocking)
}
