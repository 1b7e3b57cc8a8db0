//! Attribute synchronisation passes.
//!
//! Four passes run in a fixed order. Each reads the source account through a
//! two-tier lookup (pending change first, committed snapshot second) and
//! queues differences as pending changes on the destination account, so later
//! passes see what earlier passes proposed.

use std::collections::BTreeMap;

use deunicode::deunicode;
use tracing::{debug, info, instrument};

use dirsync_directory::AttributeValue;

use crate::config::SyncConfig;
use crate::role::DirectoryRole;
use crate::snapshot::{UserAccount, UserSnapshot};

/// Which attribute map a pass uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttributeClass {
    /// `local_copy_attrs`: mirror fields within one directory.
    LocalCopy,
    /// `remote_synced_attrs`: copy fields to the other directory.
    RemoteSynced,
}

/// One attribute synchronisation pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttributePass {
    pub source: DirectoryRole,
    pub destination: DirectoryRole,
    pub class: AttributeClass,
}

/// The passes, in the order they must run.
pub const PASSES: [AttributePass; 4] = [
    AttributePass {
        source: DirectoryRole::Primary,
        destination: DirectoryRole::Primary,
        class: AttributeClass::LocalCopy,
    },
    AttributePass {
        source: DirectoryRole::Primary,
        destination: DirectoryRole::Secondary,
        class: AttributeClass::RemoteSynced,
    },
    AttributePass {
        source: DirectoryRole::Secondary,
        destination: DirectoryRole::Secondary,
        class: AttributeClass::LocalCopy,
    },
    AttributePass {
        source: DirectoryRole::Secondary,
        destination: DirectoryRole::Primary,
        class: AttributeClass::RemoteSynced,
    },
];

impl AttributePass {
    /// Source-to-destination attribute names for this pass.
    pub fn mappings<'c>(&self, config: &'c SyncConfig) -> &'c BTreeMap<String, String> {
        let schema = config.schema(self.source);
        match self.class {
            AttributeClass::LocalCopy => &schema.local_copy_attrs,
            AttributeClass::RemoteSynced => &schema.remote_synced_attrs,
        }
    }
}

/// Value the destination should take, or `None` when nothing changes.
///
/// A pending source value is authoritative and copied as-is. Otherwise an
/// empty source never propagates, and values bound for the secondary
/// directory are transliterated to ASCII before comparison.
pub fn proposed_change(
    source: &UserAccount,
    source_attribute: &str,
    destination: &UserAccount,
    destination_attribute: &str,
    destination_role: DirectoryRole,
) -> Option<AttributeValue> {
    if let Some(pending) = source.pending(source_attribute) {
        return Some(pending.clone());
    }

    let value = source.value(source_attribute);
    if value.is_empty() {
        return None;
    }
    let candidate = match destination_role {
        DirectoryRole::Secondary => deunicode(value),
        DirectoryRole::Primary => value.to_string(),
    };

    (candidate != destination.value(destination_attribute)).then(|| AttributeValue::String(candidate))
}

/// Run one pass over every user. Returns the number of changes queued.
#[instrument(skip(snapshot, config), fields(source = %pass.source, destination = %pass.destination))]
pub fn run_pass(pass: &AttributePass, snapshot: &mut UserSnapshot, config: &SyncConfig) -> usize {
    let mappings = pass.mappings(config);
    if mappings.is_empty() {
        return 0;
    }

    let mut queued = 0;
    for (key, record) in snapshot.iter_mut() {
        if record.excluded {
            info!(user = %key, "User mapped to NONE in the exception table, not synchronised");
            continue;
        }
        if record.account(pass.source).is_none() || record.account(pass.destination).is_none() {
            continue;
        }

        for (source_attribute, destination_attribute) in mappings {
            let change = match (record.account(pass.source), record.account(pass.destination)) {
                (Some(source), Some(destination)) => proposed_change(
                    source,
                    source_attribute,
                    destination,
                    destination_attribute,
                    pass.destination,
                ),
                _ => None,
            };

            if let (Some(value), Some(destination)) = (change, record.account_mut(pass.destination)) {
                debug!(
                    user = %key,
                    attribute = %destination_attribute,
                    "Queued attribute change"
                );
                destination.set_pending(destination_attribute.clone(), value);
                queued += 1;
            }
        }
    }

    debug!(queued, "Attribute pass complete");
    queued
}

/// Run every pass in order.
pub fn run_all_passes(snapshot: &mut UserSnapshot, config: &SyncConfig) -> usize {
    PASSES
        .iter()
        .map(|pass| run_pass(pass, snapshot, config))
        .sum()
}
