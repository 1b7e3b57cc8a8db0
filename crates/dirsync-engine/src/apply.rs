//! Change application
//!
//! Turns group plans and pending user changes into directory mutations. A
//! rejected mutation is recorded in the run status and the run moves on; any
//! other directory error aborts it.

use tracing::{debug, error, info, instrument};

use dirsync_directory::{AttributeValue, ChangeOperation, ChangeRecord, Directory, DirectoryResult};

use crate::error::{EngineError, EngineResult};
use crate::groups::GroupPlan;
use crate::role::{DirectoryRole, RoleMap};
use crate::session::RunStatus;
use crate::snapshot::UserSnapshot;

/// Classify the outcome of one mutation.
///
/// Returns `Ok(true)` on success and `Ok(false)` after recording a recoverable
/// failure. Fatal errors propagate.
pub(crate) fn settle(
    result: DirectoryResult<()>,
    entity: &str,
    phase: &'static str,
    status: &mut RunStatus,
) -> EngineResult<bool> {
    match result {
        Ok(()) => Ok(true),
        Err(err) if err.is_fatal() => {
            error!(entity = %entity, phase, error = %err, code = err.error_code(), "Fatal directory error");
            Err(EngineError::Directory(err))
        }
        Err(err) => {
            error!(entity = %entity, phase, error = %err, "Directory rejected the change");
            status.record_failure(entity, phase, err.to_string());
            Ok(false)
        }
    }
}

fn as_values(members: &[String]) -> Vec<AttributeValue> {
    members.iter().map(|m| AttributeValue::String(m.clone())).collect()
}

/// Add then delete the planned members of one secondary group.
#[instrument(skip(directory, plan, status), fields(group = %plan.group))]
pub fn apply_group_changes(
    directory: &mut dyn Directory,
    members_attribute: &str,
    plan: &GroupPlan,
    status: &mut RunStatus,
) -> EngineResult<()> {
    if plan.additions.is_empty() {
        debug!("No members to add");
    } else {
        info!(members = ?plan.additions, "Adding members");
        let change = ChangeRecord::new(&plan.dn)
            .with(ChangeOperation::add(members_attribute, as_values(&plan.additions)));
        settle(directory.modify(&change), &plan.group, "modify_group", status)?;
    }

    if plan.deletions.is_empty() {
        debug!("No members to delete");
    } else {
        info!(members = ?plan.deletions, "Deleting members");
        let change = ChangeRecord::new(&plan.dn)
            .with(ChangeOperation::delete(members_attribute, as_values(&plan.deletions)));
        settle(directory.modify(&change), &plan.group, "modify_group", status)?;
    }

    Ok(())
}

/// Individual non-empty values of a pending change.
fn replacement_values(value: &AttributeValue) -> Vec<AttributeValue> {
    let values = match value {
        AttributeValue::Array(values) => values.clone(),
        single => vec![single.clone()],
    };
    values
        .into_iter()
        .filter(|v| !matches!(v, AttributeValue::String(s) if s.is_empty()))
        .collect()
}

/// One replace modify per directory per user holding pending changes.
///
/// Returns the number of modifies that succeeded.
#[instrument(skip_all)]
pub fn apply_user_changes(
    directories: &mut RoleMap<&mut dyn Directory>,
    snapshot: &UserSnapshot,
    status: &mut RunStatus,
) -> EngineResult<usize> {
    let mut applied = 0;
    for (key, record) in snapshot.iter() {
        if record.excluded {
            continue;
        }
        for role in DirectoryRole::ALL {
            let Some(account) = record.account(role) else {
                continue;
            };
            if account.pending.is_empty() {
                continue;
            }

            let mut change = ChangeRecord::new(&account.dn);
            for (attribute, value) in &account.pending {
                change.push(ChangeOperation::replace(attribute, replacement_values(value)));
            }

            info!(user = %key, role = %role, attributes = ?change.attributes(), "Modifying user");
            if settle(directories[role].modify(&change), key, "modify_user", status)? {
                applied += 1;
            }
        }
    }
    Ok(applied)
}
