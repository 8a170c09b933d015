//! Subscriber setup: console output plus an optional run log file

use std::fs::{self, File};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

use crate::error::{KeyforgeError, Result};

/// Keeps the file writer flushing; drop it only after the last event
#[must_use = "dropping the guard stops writes to the log file"]
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber
///
/// Events go to stderr and, when `log_file` is set, to that file as well.
/// `RUST_LOG` filters both; the default level is `info`.
pub fn init(log_file: Option<&Path>) -> Result<LogGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console = fmt::layer().with_writer(std::io::stderr);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
            let layer = fmt::layer().with_writer(writer).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file_layer)
        .try_init()
        .map_err(|e| KeyforgeError::internal(format!("Failed to install logger: {}", e)))?;

    Ok(LogGuard { _file: guard })
}

/// Create `path` and its parent directories, truncating an existing log
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(|e| {
            KeyforgeError::config(format!(
                "Cannot create log directory {}: {}",
                parent.display(),
                e
            ))
        })?;
    }

    File::create(path).map_err(|e| {
        KeyforgeError::config(format!("Cannot open log file {}: {}", path.display(), e))
    })
}
