//! Tracing setup for the binary.
//!
//! The trainer owns the terminal while a run is on screen, so logs go to a
//! file next to the progress database. `RUST_LOG` controls the filter and
//! defaults to `info` for this crate.

use std::path::{Path, PathBuf};

use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::EnvFilter;

use crate::app_dirs::AppDirs;

const DEFAULT_FILTER: &str = "symtrain=info";

pub fn log_path() -> Option<PathBuf> {
    AppDirs::log_path()
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Non-blocking writer appending to `path`. `None` if the directory cannot
/// be created.
fn open_log_writer(path: &Path) -> Option<(NonBlocking, WorkerGuard)> {
    let dir = path.parent()?;
    let file_name = path.file_name()?;
    std::fs::create_dir_all(dir).ok()?;
    let appender = tracing_appender::rolling::never(dir, file_name);
    Some(tracing_appender::non_blocking(appender))
}

/// Install the global subscriber. Falls back to stderr when the log file
/// cannot be opened.
///
/// The returned guard flushes buffered lines on drop and must be held for
/// the life of the program.
pub fn init_tracing(path: Option<&Path>) -> Option<WorkerGuard> {
    match path.and_then(open_log_writer) {
        Some((writer, guard)) => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_ansi(false)
                .with_writer(writer)
                .try_init();
            if installed.is_err() {
                tracing::debug!("tracing subscriber already installed");
            }
            Some(guard)
        }
        None => {
            let installed = tracing_subscriber::fmt()
                .with_env_filter(env_filter())
                .with_writer(std::io::stderr)
                .try_init();
            if installed.is_err() {
                tracing::debug!("tracing subscriber already installed");
            }
            None
        }
    }
}
