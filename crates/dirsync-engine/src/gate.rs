//! Change-percentage safety gate.
//!
//! Every group's proposed changes are measured against the size of the
//! destination group. Changes over a threshold need an operator override,
//! except for small groups, which are always applied.

use tracing::debug;

use crate::config::SyncSettings;
use crate::session::RunOptions;

/// Thresholds applied to every group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeThresholds {
    pub total: u64,
    pub additions: u64,
    pub deletions: u64,
    /// Groups with fewer original members than this skip the thresholds.
    pub small_group_blind_update: usize,
}

impl From<&SyncSettings> for ChangeThresholds {
    fn from(settings: &SyncSettings) -> Self {
        Self {
            total: settings.total_change_threshold,
            additions: settings.additions_change_threshold,
            deletions: settings.deletions_change_threshold,
            small_group_blind_update: settings.small_group_blind_update,
        }
    }
}

/// Size of a proposed change set relative to the destination group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChangeSummary {
    /// Destination member count, floored at 1.
    pub original_len: usize,
    pub additions_len: usize,
    pub deletions_len: usize,
    pub total_change_percent: u64,
    pub additions_change_percent: u64,
    pub deletions_change_percent: u64,
}

impl ChangeSummary {
    /// Measure `additions` and `deletions` against `destination_len` members.
    pub fn new(destination_len: usize, additions: usize, deletions: usize) -> Self {
        let original_len = destination_len.max(1);
        let percent = |count: usize| (count as u64 * 100) / original_len as u64;

        Self {
            original_len,
            additions_len: additions,
            deletions_len: deletions,
            total_change_percent: percent(additions + deletions),
            additions_change_percent: percent(additions),
            deletions_change_percent: percent(deletions),
        }
    }

    pub fn has_changes(&self) -> bool {
        self.additions_len > 0 || self.deletions_len > 0
    }
}

/// Whether applying `summary` needs an override.
pub fn override_required(group: &str, summary: &ChangeSummary, thresholds: &ChangeThresholds) -> bool {
    debug!(
        group = %group,
        original_len = summary.original_len,
        total = summary.additions_len + summary.deletions_len,
        total_percent = summary.total_change_percent,
        additions = summary.additions_len,
        additions_percent = summary.additions_change_percent,
        deletions = summary.deletions_len,
        deletions_percent = summary.deletions_change_percent,
        "Change summary"
    );

    let mut required = false;
    if summary.total_change_percent > thresholds.total {
        debug!(group = %group, percent = summary.total_change_percent, threshold = thresholds.total, "Total change threshold breached");
        required = true;
    }
    if summary.deletions_change_percent > thresholds.deletions {
        debug!(group = %group, percent = summary.deletions_change_percent, threshold = thresholds.deletions, "Deletion threshold breached");
        required = true;
    }
    if summary.additions_change_percent > thresholds.additions {
        debug!(group = %group, percent = summary.additions_change_percent, threshold = thresholds.additions, "Addition threshold breached");
        required = true;
    }

    // Evaluated last: small groups never need an override.
    if required && summary.original_len < thresholds.small_group_blind_update {
        debug!(
            group = %group,
            small_group_blind_update = thresholds.small_group_blind_update,
            "Group below the small group floor, proceeding anyway"
        );
        required = false;
    }

    required
}

/// Outcome of the processing gate for one group.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessDecision {
    /// Nothing to add or delete.
    NoChanges,
    /// Within thresholds.
    Apply,
    /// Over thresholds, but an override is engaged.
    ApplyWithOverride,
    /// Over thresholds and no override: report and fail the run.
    Blocked,
}

impl ProcessDecision {
    pub fn applies(self) -> bool {
        matches!(self, ProcessDecision::Apply | ProcessDecision::ApplyWithOverride)
    }
}

/// Decide whether a group's changes are applied.
pub fn process_decision(
    group: &str,
    summary: &ChangeSummary,
    override_required: bool,
    options: &RunOptions,
) -> ProcessDecision {
    if !summary.has_changes() {
        return ProcessDecision::NoChanges;
    }
    if !override_required {
        return ProcessDecision::Apply;
    }
    if options.universal_override || options.is_group_overridden(group) {
        ProcessDecision::ApplyWithOverride
    } else {
        ProcessDecision::Blocked
    }
}
