//! Engine error types
//!
//! Every `EngineError` that leaves a run aborts it. Recoverable failures are
//! never returned; they are accumulated in the run status instead.

use std::path::PathBuf;

use dirsync_directory::DirectoryError;
use thiserror::Error;

/// Fatal error raised during a reconciliation run.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A directory call failed fatally (search, password, manifest, connection).
    #[error(transparent)]
    Directory(#[from] DirectoryError),

    /// A configuration or table file could not be read.
    #[error("unable to read '{}': {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A configuration or table file is not valid YAML for its shape.
    #[error("unable to parse '{}': {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    /// The configuration is structurally valid but unusable.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// An attribute expected to hold one value held several.
    #[error("user '{user}' has {count} values for '{attribute}' where one was expected")]
    MultiValuedAttribute {
        user: String,
        attribute: String,
        count: usize,
    },

    /// The run status file could not be written.
    #[error("unable to write run status '{}': {source}", path.display())]
    StatusWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl EngineError {
    /// Get a stable error code for logs and monitoring.
    pub fn error_code(&self) -> &'static str {
        match self {
            EngineError::Directory(inner) => inner.error_code(),
            EngineError::ConfigRead { .. } => "CONFIG_READ",
            EngineError::ConfigParse { .. } => "CONFIG_PARSE",
            EngineError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            EngineError::MultiValuedAttribute { .. } => "MULTI_VALUED_ATTRIBUTE",
            EngineError::StatusWrite { .. } => "STATUS_WRITE",
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        EngineError::InvalidConfiguration {
            message: message.into(),
        }
    }
}

/// Result type for engine operations.
pub type EngineResult<T> = Result<T, EngineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directory_errors_keep_their_code() {
        let err: EngineError =
            DirectoryError::search_failed("dc=ex", "(cn=*)", Some(1), "operations error").into();
        assert_eq!(err.error_code(), "SEARCH_FAILED");
        assert!(err.to_string().contains("dc=ex"));
    }

    #[test]
    fn test_multi_valued_display() {
        let err = EngineError::MultiValuedAttribute {
            user: "johnd".to_string(),
            attribute: "mail".to_string(),
            count: 2,
        };
        assert_eq!(
            err.to_string(),
            "user 'johnd' has 2 values for 'mail' where one was expected"
        );
        assert_eq!(err.error_code(), "MULTI_VALUED_ATTRIBUTE");
    }

    #[test]
    fn test_invalid_configuration() {
        let err = EngineError::invalid_configuration("secondary base is empty");
        assert_eq!(err.error_code(), "INVALID_CONFIG");
        assert_eq!(
            err.to_string(),
            "invalid configuration: secondary base is empty"
        );
    }
}
