//! Group reconciliation
//!
//! Pairs groups across directories and computes the member additions and
//! deletions that bring a secondary group in line with its flattened primary
//! counterpart.

use std::collections::BTreeSet;

use tracing::{debug, info, instrument};

use crate::gate::{override_required, ChangeSummary, ChangeThresholds};
use crate::identity::MemberResolver;
use crate::snapshot::{GroupRecord, GroupSnapshot};
use crate::tables::CountryControlTable;

/// Keys of groups present in both snapshots with equal ids.
pub fn eligible_groups(primary: &GroupSnapshot, secondary: &GroupSnapshot) -> Vec<String> {
    let mut eligible = Vec::new();
    for (key, source) in primary {
        match secondary.get(key) {
            Some(destination) if destination.id == source.id => {
                info!(group = %source.name, "Group exists in both directories with matching ids");
                eligible.push(key.clone());
            }
            Some(destination) => {
                debug!(
                    group = %source.name,
                    primary_id = ?source.id,
                    secondary_id = ?destination.id,
                    "Group id mismatch, skipping"
                );
            }
            None => debug!(group = %source.name, "Group only exists in one directory"),
        }
    }
    eligible
}

/// Resolved source members that are missing from the destination.
///
/// Unresolved, inactive and country-restricted members are never added.
pub fn compute_additions(
    group: &str,
    source_members: &BTreeSet<String>,
    destination_members: &BTreeSet<String>,
    resolver: &mut dyn MemberResolver,
    countries: &CountryControlTable,
) -> Vec<String> {
    let mut additions: Vec<String> = Vec::new();
    for member in source_members {
        let identity = resolver.resolve(member);
        if !identity.is_known() || !identity.account_active {
            continue;
        }
        if destination_members.contains(&identity.canonical_id)
            || additions.contains(&identity.canonical_id)
        {
            continue;
        }
        if !countries.allows(group, identity.country_code.as_deref()) {
            info!(
                group = %group,
                user = %identity.canonical_id,
                country = ?identity.country_code,
                "User not in an allowed country, excluded"
            );
            continue;
        }
        additions.push(identity.canonical_id);
    }
    additions
}

/// Destination members that no active source member resolves to.
///
/// Every source member is re-resolved for every destination member.
pub fn compute_deletions(
    source_members: &BTreeSet<String>,
    destination_members: &BTreeSet<String>,
    resolver: &mut dyn MemberResolver,
) -> Vec<String> {
    let mut deletions = Vec::new();
    for destination in destination_members {
        let mut found = false;
        for member in source_members {
            let identity = resolver.resolve(member);
            if identity.account_active && identity.canonical_id == *destination {
                found = true;
            }
        }
        if !found {
            deletions.push(destination.clone());
        }
    }
    deletions
}

/// Proposed changes for one eligible group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupPlan {
    /// Name as stored in the secondary directory.
    pub group: String,
    /// DN of the secondary group.
    pub dn: String,
    pub current_members: BTreeSet<String>,
    pub additions: Vec<String>,
    pub deletions: Vec<String>,
    pub summary: ChangeSummary,
    pub override_required: bool,
}

/// Compute additions, deletions and the threshold verdict for one group.
#[instrument(skip_all, fields(group = %destination.name))]
pub fn plan_group(
    source: &GroupRecord,
    destination: &GroupRecord,
    resolver: &mut dyn MemberResolver,
    countries: &CountryControlTable,
    thresholds: &ChangeThresholds,
) -> GroupPlan {
    let additions = compute_additions(
        &destination.name,
        &source.members,
        &destination.members,
        resolver,
        countries,
    );
    let deletions = compute_deletions(&source.members, &destination.members, resolver);
    let summary = ChangeSummary::new(destination.members.len(), additions.len(), deletions.len());
    let override_required = override_required(&destination.name, &summary, thresholds);

    GroupPlan {
        group: destination.name.clone(),
        dn: destination.dn.clone(),
        current_members: destination.members.clone(),
        additions,
        deletions,
        summary,
        override_required,
    }
}
