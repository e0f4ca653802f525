//! Console and `install.log` logging for the installer.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Mutex;

use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Line written to the log file at the start of every run.
pub const LOG_SEPARATOR: &str = "----------------------------------------------------------------";

/// Open `path` for appending and mark the start of a new run.
pub fn open_log_file(path: &Path) -> std::io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{}", LOG_SEPARATOR)?;
    Ok(file)
}

/// Filter from the flags, then `RUST_LOG`, then the configured level.
pub fn log_filter(verbose: bool, debug: bool, level: &str) -> EnvFilter {
    if debug {
        EnvFilter::new("debug")
    } else if verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(level))
            .unwrap_or_else(|_| EnvFilter::new("warn"))
    }
}

/// Install the global subscriber: stderr always, plus `log_file` without
/// colour codes when given.
pub fn init_logging(filter: EnvFilter, log_file: Option<File>) -> Result<(), TryInitError> {
    let file_layer = log_file.map(|file| {
        fmt::layer()
            .with_ansi(false)
            .with_target(false)
            .with_writer(Mutex::new(file))
    });

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .with(filter)
        .try_init()
}
