//! Run status file.
//!
//! A single `True`/`False` line picked up by external monitoring, rewritten
//! on every run.

use std::path::{Path, PathBuf};

use tracing::debug;

use crate::engine::SyncMode;
use crate::error::{EngineError, EngineResult};

/// `path` with `{prefix}_` prepended to its file name.
pub fn mode_prefixed(path: &Path, prefix: &str) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!("{prefix}_{file_name}"))
}

/// Writes the pass/fail signal of a run.
#[derive(Debug, Clone)]
pub struct RunStatusWriter {
    path: PathBuf,
}

impl RunStatusWriter {
    /// Writer for `{mode}_{monitoring_log_file}`.
    pub fn new(monitoring_log_file: &Path, mode: SyncMode) -> Self {
        Self {
            path: mode_prefixed(monitoring_log_file, mode.as_str()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Overwrite the status file.
    pub fn write(&self, success: bool) -> EngineResult<()> {
        let text = if success { "True" } else { "False" };
        std::fs::write(&self.path, text).map_err(|source| EngineError::StatusWrite {
            path: self.path.clone(),
            source,
        })?;
        debug!(path = %self.path.display(), success, "Run status written");
        Ok(())
    }
}
