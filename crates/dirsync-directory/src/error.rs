//! Directory error types
//!
//! Error definitions with fatal/recoverable classification for run control.

use std::path::PathBuf;

use thiserror::Error;

/// Error that can occur while talking to a directory.
#[derive(Debug, Error)]
pub enum DirectoryError {
    // Read errors (always fatal to a run)
    /// A search returned a non-success result code.
    #[error("search failed under '{base}' with filter {filter}: {message}")]
    SearchFailed {
        base: String,
        filter: String,
        code: Option<u32>,
        message: String,
    },

    // Write errors (recoverable, accumulated into the run status)
    /// An add or modify returned a non-success result code.
    #[error("mutation of '{dn}' failed: {message}")]
    MutateFailed {
        dn: String,
        code: Option<u32>,
        message: String,
    },

    // Connection errors
    /// Failed to establish a connection to the directory.
    #[error("connection failed: {message}")]
    ConnectionFailed {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The bind credentials were rejected.
    #[error("authentication failed: invalid credentials")]
    AuthenticationFailed,

    // Configuration and data errors
    /// Connection or schema configuration is invalid.
    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },

    /// A value could not be interpreted.
    #[error("invalid data: {message}")]
    InvalidData { message: String },

    // Password capability errors
    /// No password satisfying the policy was produced within the retry budget.
    #[error("unable to generate a password satisfying the policy after {attempts} attempts")]
    PasswordExhausted { attempts: usize },

    /// A password could not be encoded for storage.
    #[error("password encoding failed: {message}")]
    PasswordEncoding { message: String },

    // Audit errors
    /// The audit manifest could not be appended to.
    #[error("unable to write audit manifest '{}': {source}", path.display())]
    ManifestWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl DirectoryError {
    /// Check if this error must abort the whole run.
    ///
    /// Only a single failed mutation is recoverable: the caller records it and
    /// moves on to the next entity.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, DirectoryError::MutateFailed { .. })
    }

    /// Get a stable error code for logs and monitoring.
    pub fn error_code(&self) -> &'static str {
        match self {
            DirectoryError::SearchFailed { .. } => "SEARCH_FAILED",
            DirectoryError::MutateFailed { .. } => "MUTATE_FAILED",
            DirectoryError::ConnectionFailed { .. } => "CONNECTION_FAILED",
            DirectoryError::AuthenticationFailed => "AUTH_FAILED",
            DirectoryError::InvalidConfiguration { .. } => "INVALID_CONFIG",
            DirectoryError::InvalidData { .. } => "INVALID_DATA",
            DirectoryError::PasswordExhausted { .. } => "PASSWORD_EXHAUSTED",
            DirectoryError::PasswordEncoding { .. } => "PASSWORD_ENCODING",
            DirectoryError::ManifestWriteFailed { .. } => "MANIFEST_WRITE_FAILED",
        }
    }

    /// Result code reported by the directory, when there was one.
    pub fn result_code(&self) -> Option<u32> {
        match self {
            DirectoryError::SearchFailed { code, .. } | DirectoryError::MutateFailed { code, .. } => {
                *code
            }
            _ => None,
        }
    }

    // Convenience constructors

    /// Create a search failure.
    pub fn search_failed(
        base: impl Into<String>,
        filter: impl Into<String>,
        code: Option<u32>,
        message: impl Into<String>,
    ) -> Self {
        DirectoryError::SearchFailed {
            base: base.into(),
            filter: filter.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a mutation failure.
    pub fn mutate_failed(dn: impl Into<String>, code: Option<u32>, message: impl Into<String>) -> Self {
        DirectoryError::MutateFailed {
            dn: dn.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a connection failure.
    pub fn connection_failed(message: impl Into<String>) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: None,
        }
    }

    /// Create a connection failure with a source error.
    pub fn connection_failed_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        DirectoryError::ConnectionFailed {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid configuration error.
    pub fn invalid_configuration(message: impl Into<String>) -> Self {
        DirectoryError::InvalidConfiguration {
            message: message.into(),
        }
    }

    /// Create an invalid data error.
    pub fn invalid_data(message: impl Into<String>) -> Self {
        DirectoryError::InvalidData {
            message: message.into(),
        }
    }
}

/// Result type for directory operations.
pub type DirectoryResult<T> = Result<T, DirectoryError>;
