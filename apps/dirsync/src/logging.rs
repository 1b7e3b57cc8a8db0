//! Console and file logging setup using tracing.
//!
//! The console layer follows `--console_log_level` unless `RUST_LOG` is set.
//! When `settings.log_file` is configured, a second plain-text layer appends
//! to `{mode}_{log_file}` at `settings.log_file_level`. Each layer filters
//! independently.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

use dirsync_engine::{mode_prefixed, SyncMode};

use crate::error::{CliError, CliResult};
use crate::ConsoleLevel;

/// Where the file layer writes, if anywhere.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileLogging {
    pub path: PathBuf,
    pub level: String,
}

impl FileLogging {
    /// File logging for a run mode, when a log file is configured.
    pub fn for_mode(log_file: Option<&Path>, level: &str, mode: SyncMode) -> Option<Self> {
        log_file.map(|path| Self {
            path: mode_prefixed(path, mode.as_str()),
            level: level.to_string(),
        })
    }
}

/// Map the configured file level onto an `EnvFilter` directive.
fn file_directive(level: &str) -> String {
    match level.to_ascii_lowercase().as_str() {
        "warning" => "warn".to_string(),
        "critical" => "error".to_string(),
        other => other.to_string(),
    }
}

/// Initialize the tracing subscriber.
///
/// # Errors
///
/// Fails when a filter directive is invalid, the log file cannot be opened,
/// or a subscriber is already installed.
pub fn init_logging(console: ConsoleLevel, file: Option<&FileLogging>) -> CliResult<()> {
    let console_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(console.directive()))
        .map_err(|e| CliError::Logging(format!("invalid console filter: {e}")))?;

    let console_layer = fmt::layer()
        .with_target(true)
        .with_writer(std::io::stderr)
        .with_filter(console_filter);

    let file_layer = match file {
        Some(file) => {
            let writer = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&file.path)
                .map_err(|e| {
                    CliError::Logging(format!("unable to open '{}': {e}", file.path.display()))
                })?;
            let filter = EnvFilter::try_new(file_directive(&file.level))
                .map_err(|e| CliError::Logging(format!("invalid log_file_level: {e}")))?;
            Some(
                fmt::layer()
                    .with_ansi(false)
                    .with_target(true)
                    .with_writer(Mutex::new(writer))
                    .with_filter(filter),
            )
        }
        None => None,
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| CliError::Logging(e.to_string()))?;

    tracing::debug!(console = console.directive(), "Logging initialized");
    Ok(())
}
