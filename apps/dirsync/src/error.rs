//! CLI error types and exit codes

use std::path::PathBuf;

use dirsync_directory::DirectoryError;
use dirsync_engine::EngineError;
use thiserror::Error;

/// Exit codes for the CLI
/// - 0: Run completed (see the run-status file for its outcome)
/// - 1: Fatal error
pub type CliResult<T> = Result<T, CliError>;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Directory error: {0}")]
    Directory(#[from] DirectoryError),

    #[error("Configuration error in '{}': {message}", path.display())]
    Config { path: PathBuf, message: String },

    #[error("Logging setup failed: {0}")]
    Logging(String),
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        1
    }

    /// Stable code for logs.
    pub fn error_code(&self) -> &'static str {
        match self {
            CliError::Engine(inner) => inner.error_code(),
            CliError::Directory(inner) => inner.error_code(),
            CliError::Config { .. } => "CONFIG",
            CliError::Logging(_) => "LOGGING",
        }
    }

    /// Print the error to stderr with appropriate formatting
    pub fn print(&self) {
        let use_color = std::env::var("NO_COLOR").is_err();
        if use_color {
            eprintln!("\x1b[31mError [{}]:\x1b[0m {}", self.error_code(), self);
        } else {
            eprintln!("Error [{}]: {}", self.error_code(), self);
        }

        let mut source = std::error::Error::source(self);
        while let Some(cause) = source {
            eprintln!("  caused by: {cause}");
            source = cause.source();
        }
    }
}
