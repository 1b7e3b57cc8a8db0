//! Reconciliation run orchestration.
//!
//! A [`SyncEngine`] borrows both directories and the run-wide tables, and
//! drives one group sync or one user sync against a fresh [`SyncSession`].

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use dirsync_directory::dn::escape_dn_value;
use dirsync_directory::{AttributeValue, ChangeOperation, ChangeRecord, Directory, NewEntry, PasswordCapability};

use crate::allocator::allocate_id;
use crate::apply::{apply_group_changes, apply_user_changes, settle};
use crate::attributes::run_all_passes;
use crate::config::SyncConfig;
use crate::error::EngineResult;
use crate::flatten::{flatten_group, DirectoryObjectLookup};
use crate::gate::{process_decision, ChangeThresholds, ProcessDecision};
use crate::groups::{eligible_groups, plan_group, GroupPlan};
use crate::identity::IdentityResolver;
use crate::lifecycle::UserLifecycle;
use crate::role::{DirectoryRole, RoleMap};
use crate::session::SyncSession;
use crate::snapshot::{build_group_snapshot, load_users, GroupRecord, GroupSnapshot, UserSnapshot};
use crate::tables::{CountryControlTable, ExceptionTable};

/// The two mutually exclusive run modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    GroupSync,
    UserSync,
}

impl SyncMode {
    /// Name used on the command line and as a file-name prefix.
    pub fn as_str(self) -> &'static str {
        match self {
            SyncMode::GroupSync => "group_sync",
            SyncMode::UserSync => "user_sync",
        }
    }
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Drives reconciliation runs over a pair of directories.
pub struct SyncEngine<'a> {
    config: &'a SyncConfig,
    exceptions: &'a ExceptionTable,
    countries: &'a CountryControlTable,
    passwords: &'a dyn PasswordCapability,
    directories: RoleMap<&'a mut dyn Directory>,
}

impl<'a> SyncEngine<'a> {
    pub fn new(
        config: &'a SyncConfig,
        exceptions: &'a ExceptionTable,
        countries: &'a CountryControlTable,
        passwords: &'a dyn PasswordCapability,
        directories: RoleMap<&'a mut dyn Directory>,
    ) -> Self {
        Self {
            config,
            exceptions,
            countries,
            passwords,
            directories,
        }
    }

    /// Run `mode` to completion.
    ///
    /// An error means the run aborted. Otherwise the outcome is in
    /// `session.status`.
    pub fn run(&mut self, mode: SyncMode, session: &mut SyncSession) -> EngineResult<()> {
        match mode {
            SyncMode::GroupSync => self.run_group_sync(session),
            SyncMode::UserSync => self.run_user_sync(session),
        }
    }

    /// Reconcile secondary group membership with the flattened primary groups.
    #[instrument(skip_all, fields(mode = "group_sync"))]
    pub fn run_group_sync(&mut self, session: &mut SyncSession) -> EngineResult<()> {
        info!("Starting group sync");
        let config = self.config;
        let primary_schema = config.schema(DirectoryRole::Primary);
        let secondary_schema = config.schema(DirectoryRole::Secondary);

        let mut primary_groups =
            build_group_snapshot(&mut *self.directories.primary, primary_schema, DirectoryRole::Primary)?;
        {
            let mut lookup =
                DirectoryObjectLookup::new(&mut *self.directories.primary, primary_schema, &mut session.objects);
            for group in primary_groups.values_mut() {
                let flattened = flatten_group(&group.dn, &group.members, &mut lookup)?;
                group.members = flattened.members;
            }
        }

        let mut secondary_groups = build_group_snapshot(
            &mut *self.directories.secondary,
            secondary_schema,
            DirectoryRole::Secondary,
        )?;

        for (key, source) in primary_groups.iter_mut() {
            if secondary_groups.contains_key(key) {
                continue;
            }
            if let Some(created) = self.create_group(source, session)? {
                secondary_groups.insert(key.clone(), created);
            }
        }

        let eligible = eligible_groups(&primary_groups, &secondary_groups);
        let plans = self.plan_groups(&eligible, &primary_groups, &secondary_groups, session);

        for plan in &plans {
            self.process_group(plan, session)?;
        }

        info!(
            groups = plans.len(),
            failures = session.status.failures().len(),
            "Group sync complete"
        );
        Ok(())
    }

    fn plan_groups(
        &mut self,
        eligible: &[String],
        primary_groups: &GroupSnapshot,
        secondary_groups: &GroupSnapshot,
        session: &mut SyncSession,
    ) -> Vec<GroupPlan> {
        let thresholds = ChangeThresholds::from(&self.config.settings);
        let RoleMap { primary, secondary } = &mut self.directories;
        let mut resolver = IdentityResolver::new(
            &mut **primary,
            &mut **secondary,
            self.config,
            self.exceptions,
            &mut session.identities,
            &mut session.status,
        );

        eligible
            .iter()
            .filter_map(|key| {
                let source = primary_groups.get(key)?;
                let destination = secondary_groups.get(key)?;
                Some(plan_group(source, destination, &mut resolver, self.countries, &thresholds))
            })
            .collect()
    }

    fn process_group(&mut self, plan: &GroupPlan, session: &mut SyncSession) -> EngineResult<()> {
        match process_decision(&plan.group, &plan.summary, plan.override_required, &session.options) {
            ProcessDecision::NoChanges => {
                debug!(group = %plan.group, "No membership changes");
                return Ok(());
            }
            ProcessDecision::Blocked => {
                warn!(group = %plan.group, members = ?plan.current_members, "Override required, current members");
                warn!(group = %plan.group, additions = ?plan.additions, "Override required, proposed additions");
                warn!(group = %plan.group, deletions = ?plan.deletions, "Override required, proposed deletions");
                session.record_failure(
                    plan.group.clone(),
                    "safety_gate",
                    format!(
                        "change of {}% exceeds thresholds and no override is set",
                        plan.summary.total_change_percent
                    ),
                );
                return Ok(());
            }
            ProcessDecision::ApplyWithOverride => {
                info!(group = %plan.group, "Running in override");
            }
            ProcessDecision::Apply => {}
        }

        let members_attribute = &self.config.secondary.schema.objects.group.members;
        apply_group_changes(
            &mut *self.directories.secondary,
            members_attribute,
            plan,
            &mut session.status,
        )
    }

    /// Create the secondary counterpart of a primary-only group.
    ///
    /// A freshly allocated id is written back to the primary group, and the
    /// primary record picks it up when the write succeeds.
    #[instrument(skip(self, source, session), fields(group = %source.name))]
    fn create_group(
        &mut self,
        source: &mut GroupRecord,
        session: &mut SyncSession,
    ) -> EngineResult<Option<GroupRecord>> {
        let config = self.config;
        let template = config.new_group_template()?;
        let schema = config.schema(DirectoryRole::Secondary);
        let group = &schema.objects.group;

        let id = match source.id {
            Some(id) => id,
            None => allocate_id(
                &mut *self.directories.secondary,
                &schema.base,
                &group.gid_number,
                template.min_member_number,
            )?,
        };

        let dn = format!("{}={},{}", group.name, escape_dn_value(&source.name), schema.group_base());
        let mut entry = NewEntry::new(dn, template.mask.object_class.clone());
        for (attribute, value) in &template.mask.attributes {
            entry.set(attribute.clone(), value.clone());
        }
        entry.set(group.name.clone(), source.name.clone());
        entry.set(group.gid_number.clone(), id);

        info!(dn = %entry.dn, id, "Creating group");
        let result = self.directories.secondary.add(&entry);
        if !settle(result, &source.name, "create_group", &mut session.status)? {
            return Ok(None);
        }

        if source.id.is_none() {
            let gid_attribute = &config.primary.schema.objects.group.gid_number;
            let change = ChangeRecord::new(&source.dn)
                .with(ChangeOperation::replace(gid_attribute, vec![AttributeValue::Integer(id)]));
            info!(dn = %source.dn, id, "Writing allocated id back to the primary group");
            let result = self.directories.primary.modify(&change);
            if settle(result, &source.name, "write_back_group_id", &mut session.status)? {
                source.id = Some(id);
            }
        }

        Ok(Some(GroupRecord {
            name: source.name.clone(),
            key: source.key.clone(),
            id: Some(id),
            dn: entry.dn,
            members: Default::default(),
            origin: DirectoryRole::Secondary,
        }))
    }

    /// Lifecycle, attribute passes and change application for every user.
    #[instrument(skip_all, fields(mode = "user_sync"))]
    pub fn run_user_sync(&mut self, session: &mut SyncSession) -> EngineResult<()> {
        info!("Starting user sync");
        let config = self.config;

        let mut snapshot = UserSnapshot::new();
        for role in DirectoryRole::ALL {
            load_users(&mut *self.directories[role], config, role, &mut snapshot)?;
        }
        info!(users = snapshot.len(), "User snapshot built");
        snapshot.apply_exceptions(self.exceptions);

        UserLifecycle::new(
            &mut *self.directories.secondary,
            config,
            self.passwords,
            &mut session.status,
        )
        .run(&mut snapshot)?;

        let queued = run_all_passes(&mut snapshot, config);
        let applied = apply_user_changes(&mut self.directories, &snapshot, &mut session.status)?;

        info!(
            queued,
            applied,
            failures = session.status.failures().len(),
            "User sync complete"
        );
        Ok(())
    }
}
