//! Directory snapshot builder
//!
//! Reads groups and users from one directory and normalises them into the
//! canonical in-memory model the reconciliation works on. Snapshots are never
//! mutated after they are built, except for the pending-change overlay carried
//! by each [`UserAccount`].

use std::collections::{BTreeMap, BTreeSet};

use deunicode::deunicode;
use tracing::{debug, info, instrument, warn};

use dirsync_directory::{AttributeValue, Directory, DirectoryEntry, DirectorySearch, Filter};

use crate::config::{DirectorySchema, SyncConfig};
use crate::error::{EngineError, EngineResult};
use crate::role::{DirectoryRole, RoleMap};
use crate::tables::{ExceptionTable, ExceptionTarget};

/// The only attribute allowed to hold several values on a user.
const OBJECT_CLASS: &str = "objectClass";

/// Canonical identity of a login: transliterated to ASCII and lower-cased.
#[must_use]
pub fn canonical_key(login: &str) -> String {
    deunicode(login).to_lowercase()
}

fn text_values(value: &AttributeValue) -> Vec<String> {
    value
        .to_byte_values()
        .into_iter()
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .collect()
}

// --- groups ---

/// A group as read from one directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupRecord {
    /// Name as stored in the directory.
    pub name: String,
    /// Lower-cased name used to pair groups across directories.
    pub key: String,
    /// Numeric group id; `None` when unassigned.
    pub id: Option<i64>,
    pub dn: String,
    /// Primary: member DNs (flattened once the snapshot is built).
    /// Secondary: member logins.
    pub members: BTreeSet<String>,
    pub origin: DirectoryRole,
}

impl GroupRecord {
    /// Normalise a raw group entry. Returns `None` when the name is missing.
    pub fn from_entry(
        entry: &DirectoryEntry,
        schema: &DirectorySchema,
        origin: DirectoryRole,
    ) -> Option<Self> {
        let names = schema.objects.group.name.as_str();
        let name = entry.get(names).and_then(|v| text_values(v).into_iter().next())?;

        let id = entry.get(&schema.objects.group.gid_number).and_then(|value| {
            let raw = text_values(value).into_iter().next()?;
            match raw.trim().parse::<i64>() {
                Ok(id) => Some(id),
                Err(_) => {
                    warn!(group = %name, value = %raw, "Group id is not numeric, treating as unassigned");
                    None
                }
            }
        });
        if id.is_none() {
            debug!(group = %name, "No group id");
        }

        let members = entry
            .get(&schema.objects.group.members)
            .map(text_values)
            .unwrap_or_default()
            .into_iter()
            .collect();

        Some(Self {
            key: name.to_lowercase(),
            name,
            id,
            dn: entry.dn.clone(),
            members,
            origin,
        })
    }
}

/// All groups of one directory, keyed by lower-cased name.
pub type GroupSnapshot = BTreeMap<String, GroupRecord>;

/// Read every group under `{groups},{base}`.
#[instrument(skip(directory, schema), fields(role = %role))]
pub fn build_group_snapshot(
    directory: &mut dyn Directory,
    schema: &DirectorySchema,
    role: DirectoryRole,
) -> EngineResult<GroupSnapshot> {
    let group = &schema.objects.group;
    let attributes = [group.name.as_str(), group.gid_number.as_str(), group.members.as_str()];
    let results = directory.search(
        &schema.group_base(),
        &Filter::object_class(&group.obj_class),
        &attributes,
    )?;

    let mut snapshot = GroupSnapshot::new();
    for entry in results {
        match GroupRecord::from_entry(&entry, schema, role) {
            Some(record) => {
                snapshot.insert(record.key.clone(), record);
            }
            None => warn!(dn = %entry.dn, "Group has no name attribute, skipping"),
        }
    }

    info!(groups = snapshot.len(), "Group snapshot built");
    Ok(snapshot)
}

// --- users ---

/// One user account in one directory, with its pending changes.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserAccount {
    pub dn: String,
    /// Scalar attributes as text.
    pub attributes: BTreeMap<String, String>,
    pub object_classes: Vec<String>,
    /// Changes proposed during this run, not yet applied.
    pub pending: BTreeMap<String, AttributeValue>,
}

impl UserAccount {
    /// Normalise a raw entry.
    ///
    /// Login attributes are lower-cased. Any attribute other than
    /// `objectClass` holding more than one value is a fatal error.
    pub fn from_entry(
        entry: &DirectoryEntry,
        login_attributes: &[&str],
        user: &str,
    ) -> EngineResult<Self> {
        let mut account = Self {
            dn: entry.dn.clone(),
            ..Self::default()
        };

        for (name, value) in &entry.attributes {
            let values = text_values(value);
            if name.eq_ignore_ascii_case(OBJECT_CLASS) {
                account.object_classes = values;
                continue;
            }
            if values.len() > 1 {
                return Err(EngineError::MultiValuedAttribute {
                    user: user.to_string(),
                    attribute: name.clone(),
                    count: values.len(),
                });
            }

            let mut text = values.into_iter().next().unwrap_or_default();
            if login_attributes.iter().any(|a| a.eq_ignore_ascii_case(name)) {
                text = text.to_lowercase();
            }
            account.attributes.insert(name.clone(), text);
        }

        Ok(account)
    }

    /// Committed value of an attribute (case-insensitive name).
    pub fn get(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .or_else(|| {
                self.attributes
                    .iter()
                    .find(|(k, _)| k.eq_ignore_ascii_case(name))
                    .map(|(_, v)| v)
            })
            .map(String::as_str)
    }

    /// Committed value, or the empty string when absent.
    pub fn value(&self, name: &str) -> &str {
        self.get(name).unwrap_or("")
    }

    /// Pending value of an attribute, if an earlier step proposed one.
    pub fn pending(&self, name: &str) -> Option<&AttributeValue> {
        self.pending.get(name).or_else(|| {
            self.pending
                .iter()
                .find(|(k, _)| k.eq_ignore_ascii_case(name))
                .map(|(_, v)| v)
        })
    }

    /// Propose a change.
    pub fn set_pending(&mut self, name: impl Into<String>, value: impl Into<AttributeValue>) {
        self.pending.insert(name.into(), value.into());
    }

    pub fn has_object_class(&self, object_class: &str) -> bool {
        self.object_classes
            .iter()
            .any(|oc| oc.eq_ignore_ascii_case(object_class))
    }
}

/// A user across both directories.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserRecord {
    pub accounts: RoleMap<Option<UserAccount>>,
    /// Mapped to `NONE` in the exception table.
    pub excluded: bool,
}

impl UserRecord {
    pub fn account(&self, role: DirectoryRole) -> Option<&UserAccount> {
        self.accounts[role].as_ref()
    }

    pub fn account_mut(&mut self, role: DirectoryRole) -> Option<&mut UserAccount> {
        self.accounts[role].as_mut()
    }

    /// Both accounts, when the user exists in both directories.
    pub fn both_mut(&mut self) -> Option<(&mut UserAccount, &mut UserAccount)> {
        match (&mut self.accounts.primary, &mut self.accounts.secondary) {
            (Some(primary), Some(secondary)) => Some((primary, secondary)),
            _ => None,
        }
    }

    fn is_empty(&self) -> bool {
        self.accounts.primary.is_none() && self.accounts.secondary.is_none()
    }
}

/// All users of both directories, keyed by canonical login.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserSnapshot {
    users: BTreeMap<String, UserRecord>,
}

impl UserSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store an account under `key`, replacing any previous one for `role`.
    pub fn insert_account(&mut self, key: impl Into<String>, role: DirectoryRole, account: UserAccount) {
        self.users.entry(key.into()).or_default().accounts[role] = Some(account);
    }

    pub fn get(&self, key: &str) -> Option<&UserRecord> {
        self.users.get(key)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut UserRecord> {
        self.users.get_mut(key)
    }

    /// Canonical keys in order.
    pub fn keys(&self) -> Vec<String> {
        self.users.keys().cloned().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &UserRecord)> {
        self.users.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&String, &mut UserRecord)> {
        self.users.iter_mut()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }

    /// Re-key or exclude primary accounts listed in the exception table.
    ///
    /// Moves are computed from the snapshot as loaded, so an account is
    /// re-keyed at most once.
    pub fn apply_exceptions(&mut self, exceptions: &ExceptionTable) {
        if exceptions.is_empty() {
            return;
        }

        let mut moves = Vec::new();
        for (key, record) in &mut self.users {
            if record.accounts.primary.is_none() {
                continue;
            }
            match exceptions.get(key) {
                Some(ExceptionTarget::Excluded) => {
                    info!(user = %key, "User excluded by the exception table");
                    record.excluded = true;
                }
                Some(ExceptionTarget::Mapped(target)) if target != key => {
                    moves.push((key.clone(), target.clone()));
                }
                _ => {}
            }
        }

        for (from, to) in moves {
            let Some(record) = self.users.get_mut(&from) else {
                continue;
            };
            let Some(account) = record.accounts.primary.take() else {
                continue;
            };
            if record.is_empty() {
                self.users.remove(&from);
            }
            debug!(user = %from, target = %to, "User re-keyed by the exception table");
            self.insert_account(to, DirectoryRole::Primary, account);
        }
    }
}

/// Attributes requested for users of `role`.
///
/// The union of the login attribute, `objectClass`, the role-specific control
/// attributes, both sides of the remote-sync maps that touch this directory,
/// the not-synced attributes and both sides of the local-copy map.
pub fn user_attributes(config: &SyncConfig, role: DirectoryRole) -> Vec<String> {
    let schema = config.schema(role);
    let other = config.schema(role.other());
    let user = &schema.objects.user;

    let mut attributes = BTreeSet::new();
    attributes.insert(user.name.clone());
    attributes.insert(OBJECT_CLASS.to_string());
    match role {
        DirectoryRole::Primary => {
            attributes.insert(user.account_control.clone());
            attributes.insert(user.country.clone());
        }
        DirectoryRole::Secondary => {
            attributes.extend(schema.enable_user_mask.keys().cloned());
            attributes.extend(schema.disable_user_mask.keys().cloned());
        }
    }
    attributes.extend(schema.remote_synced_attrs.keys().cloned());
    attributes.extend(other.remote_synced_attrs.values().cloned());
    attributes.extend(schema.not_synced_attrs.iter().cloned());
    attributes.extend(schema.local_copy_attrs.keys().cloned());
    attributes.extend(schema.local_copy_attrs.values().cloned());

    attributes.into_iter().collect()
}

/// Read every user of `role` under its `user_sync_ous` into `snapshot`.
#[instrument(skip(directory, config, snapshot), fields(role = %role))]
pub fn load_users(
    directory: &mut dyn Directory,
    config: &SyncConfig,
    role: DirectoryRole,
    snapshot: &mut UserSnapshot,
) -> EngineResult<()> {
    let schema = config.schema(role);
    let login = schema.objects.user.name.as_str();
    let login_attributes = [
        config.primary.schema.objects.user.name.as_str(),
        config.secondary.schema.objects.user.name.as_str(),
    ];
    let attributes = user_attributes(config, role);
    let attributes: Vec<&str> = attributes.iter().map(String::as_str).collect();
    let filter = Filter::object_class(&schema.objects.user.obj_class);

    for base in schema.user_sync_bases() {
        let results = directory.search(&base, &filter, &attributes)?;
        debug!(base = %base, users = results.len(), "Users found");

        for entry in results {
            let Some(raw_login) = entry.get(login).and_then(|v| text_values(v).into_iter().next())
            else {
                warn!(dn = %entry.dn, attribute = %login, "User has no login attribute, skipping");
                continue;
            };
            let key = canonical_key(&raw_login);
            let account = UserAccount::from_entry(&entry, &login_attributes, &key)?;
            snapshot.insert_account(key, role, account);
        }
    }

    Ok(())
}
