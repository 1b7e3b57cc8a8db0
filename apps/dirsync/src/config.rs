//! Connection settings
//!
//! The engine reads the `schema` part of each directory section; the binary
//! reads the `connection` part from the same file.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use dirsync_engine::DirectoryRole;
use dirsync_ldap::LdapConfig;

use crate::error::{CliError, CliResult};

#[derive(Debug, Deserialize)]
struct ConnectionSection {
    connection: Option<LdapConfig>,
}

/// `connection` blocks of both directory sections.
#[derive(Debug, Deserialize)]
pub struct ConnectionsFile {
    #[serde(alias = "ad")]
    primary: ConnectionSection,

    #[serde(alias = "openldap")]
    secondary: ConnectionSection,

    #[serde(skip)]
    path: PathBuf,
}

impl ConnectionsFile {
    /// Parse the connection blocks of a configuration document.
    pub fn from_yaml_str(yaml: &str, path: &Path) -> CliResult<Self> {
        let mut file: Self = serde_yaml::from_str(yaml).map_err(|e| CliError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.path = path.to_path_buf();
        Ok(file)
    }

    pub fn load(path: &Path) -> CliResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|e| CliError::Config {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::from_yaml_str(&text, path)
    }

    /// Validated connection settings of one directory.
    pub fn connection(&self, role: DirectoryRole) -> CliResult<LdapConfig> {
        let section = match role {
            DirectoryRole::Primary => &self.primary,
            DirectoryRole::Secondary => &self.secondary,
        };
        let config = section.connection.clone().ok_or_else(|| CliError::Config {
            path: self.path.clone(),
            message: format!("{role} section has no connection block"),
        })?;
        config.validate()?;
        Ok(config)
    }
}
