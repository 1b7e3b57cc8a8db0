//! # LDAP transport
//!
//! Blocking LDAP implementation of the dirsync directory traits, plus the
//! default password capability.
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_ldap::{LdapConfig, LdapDirectory};
//!
//! let config = LdapConfig::new("ldap.example.com", "cn=admin,dc=example,dc=com")
//!     .with_password_env("DIRSYNC_LDAP_PASSWORD")
//!     .with_starttls();
//!
//! let directory = LdapDirectory::connect("secondary", config)?;
//! ```

pub mod config;
pub mod connector;
pub mod password;

// Re-exports
pub use config::LdapConfig;
pub use connector::LdapDirectory;
pub use password::DefaultPasswordService;
