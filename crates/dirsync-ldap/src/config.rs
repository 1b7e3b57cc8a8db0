//! LDAP connection configuration
//!
//! One `connection` block per directory in the run configuration.

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use dirsync_directory::{DirectoryError, DirectoryResult};

/// Configuration for one LDAP connection.
#[derive(Clone, Serialize, Deserialize)]
pub struct LdapConfig {
    /// LDAP server hostname or IP address.
    pub host: String,

    /// LDAP server port (389 for LDAP, 636 for LDAPS).
    #[serde(default = "default_ldap_port")]
    pub port: u16,

    /// Use SSL/TLS (LDAPS).
    #[serde(default)]
    pub use_ssl: bool,

    /// Use STARTTLS upgrade on plain LDAP connection.
    #[serde(default)]
    pub use_starttls: bool,

    /// Verify the server certificate.
    #[serde(default = "default_true")]
    pub verify_tls: bool,

    /// Bind DN for authentication (e.g., "cn=admin,dc=example,dc=com").
    pub bind_dn: String,

    /// Bind password, inline.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password: Option<String>,

    /// Name of an environment variable holding the bind password.
    /// Takes precedence over `bind_password`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bind_password_env: Option<String>,

    /// Connection timeout in seconds.
    #[serde(default = "default_connection_timeout")]
    pub connection_timeout_secs: u64,
}

impl std::fmt::Debug for LdapConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LdapConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("use_ssl", &self.use_ssl)
            .field("use_starttls", &self.use_starttls)
            .field("verify_tls", &self.verify_tls)
            .field("bind_dn", &self.bind_dn)
            .field(
                "bind_password",
                &self.bind_password.as_ref().map(|_| "***REDACTED***"),
            )
            .field("bind_password_env", &self.bind_password_env)
            .field("connection_timeout_secs", &self.connection_timeout_secs)
            .finish()
    }
}

fn default_ldap_port() -> u16 {
    389
}

fn default_true() -> bool {
    true
}

fn default_connection_timeout() -> u64 {
    30
}

impl LdapConfig {
    /// Create a new LDAP config with required fields.
    pub fn new(host: impl Into<String>, bind_dn: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: default_ldap_port(),
            use_ssl: false,
            use_starttls: false,
            verify_tls: true,
            bind_dn: bind_dn.into(),
            bind_password: None,
            bind_password_env: None,
            connection_timeout_secs: default_connection_timeout(),
        }
    }

    /// Set bind password.
    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.bind_password = Some(password.into());
        self
    }

    /// Read the bind password from an environment variable at connect time.
    pub fn with_password_env(mut self, variable: impl Into<String>) -> Self {
        self.bind_password_env = Some(variable.into());
        self
    }

    /// Enable SSL (LDAPS).
    #[must_use]
    pub fn with_ssl(mut self) -> Self {
        self.use_ssl = true;
        self.port = 636;
        self
    }

    /// Enable STARTTLS.
    #[must_use]
    pub fn with_starttls(mut self) -> Self {
        self.use_starttls = true;
        self
    }

    /// Get the LDAP URL.
    #[must_use]
    pub fn url(&self) -> String {
        let scheme = if self.use_ssl { "ldaps" } else { "ldap" };
        format!("{}://{}:{}", scheme, self.host, self.port)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> DirectoryResult<()> {
        if self.host.is_empty() {
            return Err(DirectoryError::invalid_configuration("host is required"));
        }

        if self.bind_dn.is_empty() {
            return Err(DirectoryError::invalid_configuration("bind_dn is required"));
        }

        if self.use_ssl && self.use_starttls {
            return Err(DirectoryError::invalid_configuration(
                "cannot use both SSL and STARTTLS",
            ));
        }

        if self.bind_password.is_none() && self.bind_password_env.is_none() {
            return Err(DirectoryError::invalid_configuration(
                "one of bind_password or bind_password_env is required",
            ));
        }

        Ok(())
    }

    /// Resolve the bind password, reading the environment when configured.
    pub fn resolve_password(&self) -> DirectoryResult<SecretString> {
        if let Some(variable) = &self.bind_password_env {
            return std::env::var(variable)
                .map(SecretString::from)
                .map_err(|_| {
                    DirectoryError::invalid_configuration(format!(
                        "environment variable '{variable}' holding the bind password is not set"
                    ))
                });
        }

        self.bind_password
            .clone()
            .map(SecretString::from)
            .ok_or_else(|| DirectoryError::invalid_configuration("no bind password configured"))
    }
}
