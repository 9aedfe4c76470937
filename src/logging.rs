//! Log routing for the CLI.
//!
//! Extracted markdown and JSON are printed on stdout, so human-readable logs are written to
//! stderr. Every event is also appended to a log file: `CONTENT_LRO_LOG_FILE` when set,
//! `logs/content-lro.log` otherwise. Poll attempts and retries are logged at debug and warn level,
//! which makes the file the place to look when an operation times out.
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

const LOG_FILE_VAR: &str = "CONTENT_LRO_LOG_FILE";
const DEFAULT_LOG_FILE: &str = "logs/content-lro.log";

static FILE_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

/// Install the global subscriber: stderr plus the log file.
///
/// `RUST_LOG` selects what is recorded and falls back to `info`. If the log file cannot be opened
/// the problem is reported on stderr and logging continues without it.
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .compact();
    let file = open_log_writer(&log_file_path(std::env::var(LOG_FILE_VAR).ok())).map(|writer| {
        fmt::layer()
            .with_writer(writer)
            .with_target(true)
            .with_ansi(false)
            .compact()
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr)
        .with(file)
        .init();
}

fn log_file_path(configured: Option<String>) -> PathBuf {
    configured
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_LOG_FILE))
}

fn open_log_writer(path: &Path) -> Option<NonBlocking> {
    match open_append(path) {
        Ok(file) => {
            let (writer, guard) = tracing_appender::non_blocking(file);
            // Dropping the guard stops the background writer and loses buffered lines.
            let _ = FILE_GUARD.set(guard);
            Some(writer)
        }
        Err(err) => {
            eprintln!("Logging to stderr only; cannot open {}: {err}", path.display());
            None
        }
    }
}

fn open_append(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}
