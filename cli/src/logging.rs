//! Tracing setup for the terminal front-end
//!
//! Logs go to the log file under the data dir (`logs/cortex-chat.log`) so
//! they never interleave with the REPL. Stderr is the fallback when the file
//! cannot be opened.

use config::PathManager;
use std::sync::OnceLock;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

static LOG_GUARD: OnceLock<WorkerGuard> = OnceLock::new();

const DEFAULT_FILTER: &str = "info,analyst=debug,analyst_core=debug";
const VERBOSE_FILTER: &str = "debug,analyst=trace,analyst_core=trace";

fn filter(verbose: bool) -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(if verbose { VERBOSE_FILTER } else { DEFAULT_FILTER }))
}

/// Install the global subscriber. Call once at startup; later calls are no-ops.
pub fn init_logging(verbose: bool) {
    if LOG_GUARD.get().is_some() {
        return;
    }

    let Some(path) = PathManager::log_file_path() else {
        init_stderr_logging(verbose);
        return;
    };

    if let Some(parent) = path.parent() {
        if let Err(e) = std::fs::create_dir_all(parent) {
            eprintln!("Failed to create log directory {:?}: {}", parent, e);
        }
    }

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path);

    match file {
        Ok(file) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(file);
            // keeps the background writer alive for the life of the process
            let _ = LOG_GUARD.set(guard);

            let subscriber = tracing_subscriber::registry().with(filter(verbose)).with(
                fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true)
                    .with_file(true)
                    .with_line_number(true),
            );

            if tracing::subscriber::set_global_default(subscriber).is_ok() {
                tracing::info!("Logging initialized, writing to {:?}", path);
            }
        }
        Err(e) => {
            eprintln!("Failed to open log file {:?}: {}", path, e);
            init_stderr_logging(verbose);
        }
    }
}

fn init_stderr_logging(verbose: bool) {
    let subscriber = tracing_subscriber::registry().with(filter(verbose)).with(
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(true),
    );

    let _ = tracing::subscriber::set_global_default(subscriber);
}
