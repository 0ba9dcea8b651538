// THEORY:
// Loader runs are batch jobs whose output is the exported samples; the log is a
// record of what was loaded, so it goes to a file rather than the terminal. The
// default level is `debug` (the report text and metadata are logged at that
// level). `RUST_LOG` overrides it in the usual `tracing_subscriber` syntax.

use std::fs::{File, OpenOptions};
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::EnvFilter;

use crate::error::{Error, Result};

pub const DEFAULT_LOG_FILE: &str = "logs/main.log";
const DEFAULT_DIRECTIVE: &str = "debug";

/// Opens `path` for appending, creating it and its parent directories.
pub fn open_log_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))?;
    }
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::io(path, e))
}

/// Installs a global subscriber that writes plain-text lines to `path`.
///
/// Returns `Ok(false)` if another subscriber was already installed.
pub fn init_file_logging(path: &Path) -> Result<bool> {
    let file = open_log_file(path)?;
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE));

    Ok(tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .try_init()
        .is_ok())
}
