//! # Reconciliation engine
//!
//! Keeps a secondary directory in line with an authoritative primary one.
//!
//! Two run modes share one configuration:
//!
//! - **group sync** flattens primary groups, pairs them with secondary groups
//!   of the same name and id, and applies membership differences behind a
//!   change-percentage safety gate;
//! - **user sync** creates missing secondary accounts, applies enable/disable
//!   masks and runs the four attribute passes.
//!
//! Every run works on a fresh [`SyncSession`]. Recoverable failures are
//! accumulated in its status; an [`EngineError`] aborts the run.
//!
//! ## Example
//!
//! ```ignore
//! use dirsync_engine::{RoleMap, RunOptions, SyncEngine, SyncMode, SyncSession};
//!
//! let mut engine = SyncEngine::new(&config, &exceptions, &countries, &passwords,
//!     RoleMap::new(&mut primary, &mut secondary));
//! let mut session = SyncSession::new(RunOptions::new().with_group_override(["admins"]));
//! engine.run(SyncMode::GroupSync, &mut session)?;
//! ```

pub mod allocator;
pub mod apply;
pub mod attributes;
pub mod config;
pub mod engine;
pub mod error;
pub mod flatten;
pub mod gate;
pub mod groups;
pub mod identity;
pub mod lifecycle;
pub mod role;
pub mod session;
pub mod snapshot;
pub mod status;
pub mod tables;

// Re-exports
pub use config::{DirectorySchema, SyncConfig, SyncSettings};
pub use engine::{SyncEngine, SyncMode};
pub use error::{EngineError, EngineResult};
pub use role::{DirectoryRole, RoleMap};
pub use session::{RunFailure, RunOptions, RunStatus, SyncSession};
pub use status::{mode_prefixed, RunStatusWriter};
pub use tables::{CountryControlTable, ExceptionTable, ExceptionTarget};
