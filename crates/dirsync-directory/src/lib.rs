//! # Directory abstractions
//!
//! The vocabulary shared by the dirsync engine and its transports.
//!
//! The engine reads and writes both directories only through the
//! [`Directory`] traits defined here, so the reconciliation logic can be
//! driven by an LDAP connection in production and by a
//! [`MemoryDirectory`] in tests.
//!
//! ## Contents
//!
//! - Entries, attribute values, change records and search filters
//! - Directory capability traits and one-shot search results
//! - Environment wrappers: an audited production wrapper and a dry-run wrapper
//! - The password capability consumed when accounts are created or reset
//! - DN and filter escaping helpers
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_directory::{AuditManifest, AuditedDirectory, Filter, MemoryDirectory};
//!
//! let mut dir = AuditedDirectory::new(
//!     MemoryDirectory::new("secondary"),
//!     AuditManifest::new("manifest.log"),
//! );
//! let groups = dir.search("ou=Group,dc=example,dc=com", &Filter::object_class("posixGroup"), &["cn"])?;
//! ```

pub mod audit;
pub mod dn;
pub mod error;
pub mod memory;
pub mod operation;
pub mod password;
pub mod traits;

// Re-exports
pub use audit::{AuditManifest, AuditedDirectory, DryRunDirectory};
pub use error::{DirectoryError, DirectoryResult};
pub use memory::{MemoryDirectory, Mutation};
pub use operation::{AttributeValue, ChangeOperation, ChangeRecord, DirectoryEntry, Filter, NewEntry};
pub use password::{PasswordCapability, PasswordPolicy, PasswordScheme, MAX_GENERATION_ATTEMPTS};
pub use traits::{Directory, DirectoryMutate, DirectorySearch, SearchResults};
