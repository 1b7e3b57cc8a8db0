//! Per-run reconciliation state.
//!
//! A [`SyncSession`] is built fresh for every run and threaded by reference
//! through every component. It owns the run status, the run-time override
//! levers, and the two memoisation caches.

use std::collections::{BTreeSet, HashMap};

use crate::flatten::ObjectInfo;
use crate::identity::ResolvedIdentity;

/// One recoverable failure recorded during a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFailure {
    /// Group name, user key or DN the failure concerns.
    pub entity: String,
    /// Step that failed, e.g. `modify_group` or `resolve_identity`.
    pub phase: &'static str,
    pub message: String,
}

/// Accumulated pass/fail signal of a run.
#[derive(Debug, Clone, Default)]
pub struct RunStatus {
    failures: Vec<RunFailure>,
}

impl RunStatus {
    /// Record a recoverable failure; the run continues.
    pub fn record_failure(
        &mut self,
        entity: impl Into<String>,
        phase: &'static str,
        message: impl Into<String>,
    ) {
        self.failures.push(RunFailure {
            entity: entity.into(),
            phase,
            message: message.into(),
        });
    }

    /// True until any failure is recorded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failures(&self) -> &[RunFailure] {
        &self.failures
    }
}

/// Run-time levers of the safety gate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunOptions {
    /// Apply every group regardless of thresholds.
    pub universal_override: bool,
    /// Groups (by name, case-insensitive) applied regardless of thresholds.
    pub group_override: BTreeSet<String>,
}

impl RunOptions {
    /// Options with no override engaged.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_universal_override(mut self, enabled: bool) -> Self {
        self.universal_override = enabled;
        self
    }

    pub fn with_group_override<I, S>(mut self, groups: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.group_override
            .extend(groups.into_iter().map(|g| g.as_ref().to_lowercase()));
        self
    }

    /// Whether `group` is individually overridden.
    #[must_use]
    pub fn is_group_overridden(&self, group: &str) -> bool {
        self.group_override.contains(&group.to_lowercase())
    }
}

/// State owned by one reconciliation run.
#[derive(Debug, Default)]
pub struct SyncSession {
    pub status: RunStatus,
    pub options: RunOptions,
    /// Successful identity resolutions, keyed by the raw member reference.
    pub identities: HashMap<String, ResolvedIdentity>,
    /// Object classifications, keyed by the raw member reference.
    pub objects: HashMap<String, ObjectInfo>,
}

impl SyncSession {
    /// Fresh session with the given options.
    pub fn new(options: RunOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Shorthand for `status.record_failure`.
    pub fn record_failure(
        &mut self,
        entity: impl Into<String>,
        phase: &'static str,
        message: impl Into<String>,
    ) {
        self.status.record_failure(entity, phase, message);
    }

    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }
}
