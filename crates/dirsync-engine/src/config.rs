//! Run configuration
//!
//! The YAML file has three sections: `settings`, `primary` (alias `ad`) and
//! `secondary` (alias `openldap`). Each directory section carries a `schema`
//! consumed here and a `connection` block consumed by the binary, which this
//! model ignores.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use dirsync_directory::{AttributeValue, PasswordPolicy};

use crate::error::{EngineError, EngineResult};
use crate::role::DirectoryRole;

/// Number of character classes every generated password must contain.
const REQUIRED_PASSWORD_CLASSES: usize = 4;

/// Complete engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Thresholds, file locations and password policy.
    pub settings: SyncSettings,

    /// The authoritative directory.
    #[serde(alias = "ad")]
    pub primary: DirectorySection,

    /// The directory kept in sync.
    #[serde(alias = "openldap")]
    pub secondary: DirectorySection,
}

/// One directory section of the configuration file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DirectorySection {
    /// Attribute names and locations for this directory.
    pub schema: DirectorySchema,
}

/// Global run settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Maximum combined change percentage applied without an override.
    #[serde(default = "default_total_change_threshold")]
    pub total_change_threshold: u64,

    /// Maximum addition percentage applied without an override.
    #[serde(default = "default_additions_change_threshold")]
    pub additions_change_threshold: u64,

    /// Maximum deletion percentage applied without an override.
    #[serde(default = "default_deletions_change_threshold")]
    pub deletions_change_threshold: u64,

    /// Groups with fewer members than this are always applied.
    #[serde(default = "default_small_group_blind_update")]
    pub small_group_blind_update: usize,

    /// Length of generated passwords.
    #[serde(default = "default_password_length")]
    pub password_length: usize,

    /// Special characters available to generated passwords.
    #[serde(default = "default_special_password_characters")]
    pub special_password_characters: String,

    /// Characters generated passwords must not contain.
    #[serde(default)]
    pub banned_password_chars: String,

    /// Audit manifest written in the `prod` environment.
    #[serde(default = "default_manifest_path")]
    pub manifest_path: PathBuf,

    /// Run status file; the run mode is prefixed to its file name.
    #[serde(default = "default_monitoring_log_file")]
    pub monitoring_log_file: PathBuf,

    /// Optional log file; the run mode is prefixed to its file name.
    #[serde(default)]
    pub log_file: Option<PathBuf>,

    /// Level of the log file.
    #[serde(default = "default_log_file_level")]
    pub log_file_level: String,

    /// YAML map of primary login to secondary login or `NONE`.
    #[serde(default)]
    pub exception_file: Option<PathBuf>,

    /// YAML map of group name to allowed country codes.
    #[serde(default)]
    pub country_control_file: Option<PathBuf>,

    /// Primary account-control codes that mean "enabled".
    #[serde(default = "default_active_account_codes", alias = "ms_ad_active_account_ids")]
    pub active_account_codes: Vec<i64>,
}

fn default_total_change_threshold() -> u64 {
    20
}

fn default_additions_change_threshold() -> u64 {
    20
}

fn default_deletions_change_threshold() -> u64 {
    10
}

fn default_small_group_blind_update() -> usize {
    10
}

fn default_password_length() -> usize {
    20
}

fn default_special_password_characters() -> String {
    "!#%+-=?@^_".to_string()
}

fn default_manifest_path() -> PathBuf {
    PathBuf::from("manifest.log")
}

fn default_monitoring_log_file() -> PathBuf {
    PathBuf::from("monitoring.log")
}

fn default_log_file_level() -> String {
    "info".to_string()
}

fn default_active_account_codes() -> Vec<i64> {
    vec![512, 66048]
}

impl SyncSettings {
    /// Password policy derived from the settings.
    pub fn password_policy(&self) -> PasswordPolicy {
        PasswordPolicy::new(self.password_length, self.special_password_characters.clone())
            .with_banned(self.banned_password_chars.clone())
    }
}

/// Attribute names and locations for one directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DirectorySchema {
    /// Directory base DN.
    pub base: String,

    /// Group container relative to `base`.
    pub groups: String,

    /// User container relative to `base`.
    pub users: String,

    /// User containers, relative to `base`, searched during user sync.
    #[serde(default)]
    pub user_sync_ous: Vec<String>,

    /// Object class and attribute names.
    pub objects: ObjectSchema,

    /// Attributes copied to the other directory: this directory's attribute to
    /// the other directory's attribute.
    #[serde(default)]
    pub remote_synced_attrs: BTreeMap<String, String>,

    /// Attributes mirrored within this directory: source to destination.
    #[serde(default)]
    pub local_copy_attrs: BTreeMap<String, String>,

    /// Attributes read but never written.
    #[serde(default)]
    pub not_synced_attrs: Vec<String>,

    /// Template for groups created in this directory.
    #[serde(default)]
    pub new_group: Option<NewObjectTemplate>,

    /// Template for users created in this directory.
    #[serde(default)]
    pub new_user: Option<NewObjectTemplate>,

    /// Prefix of the security identifiers allocated to new accounts.
    #[serde(default)]
    pub sid_prefix: Option<String>,

    /// Object class that carries the SID and NT password.
    #[serde(default = "default_sid_object_class")]
    pub sid_object_class: String,

    /// Parent of new home directories.
    #[serde(default = "default_home_directory_prefix")]
    pub home_directory_prefix: String,

    /// Attribute values of an enabled account.
    #[serde(default)]
    pub enable_user_mask: BTreeMap<String, AttributeValue>,

    /// Attribute values of a disabled account.
    #[serde(default)]
    pub disable_user_mask: BTreeMap<String, AttributeValue>,
}

fn default_sid_object_class() -> String {
    "sambaSamAccount".to_string()
}

fn default_home_directory_prefix() -> String {
    "/home".to_string()
}

impl DirectorySchema {
    /// `{groups},{base}`.
    #[must_use]
    pub fn group_base(&self) -> String {
        join_dn(&self.groups, &self.base)
    }

    /// `{users},{base}`.
    #[must_use]
    pub fn user_base(&self) -> String {
        join_dn(&self.users, &self.base)
    }

    /// `{ou},{base}` for every user sync container.
    pub fn user_sync_bases(&self) -> Vec<String> {
        self.user_sync_ous
            .iter()
            .map(|ou| join_dn(ou, &self.base))
            .collect()
    }
}

fn join_dn(relative: &str, base: &str) -> String {
    if relative.is_empty() {
        base.to_string()
    } else {
        format!("{relative},{base}")
    }
}

/// Object class and attribute names for groups and users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectSchema {
    pub group: GroupObjectSchema,
    pub user: UserObjectSchema,
}

/// Group attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupObjectSchema {
    /// Object class of groups.
    pub obj_class: String,
    /// Group name attribute.
    pub name: String,
    /// Numeric group id attribute.
    pub gid_number: String,
    /// Member attribute.
    pub members: String,
}

/// User attribute names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserObjectSchema {
    /// Object class of users.
    pub obj_class: String,
    /// Login attribute.
    pub name: String,
    #[serde(default = "default_account_control")]
    pub account_control: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default = "default_uid_number")]
    pub uid_number: String,
    #[serde(default = "default_sid")]
    pub sid: String,
    #[serde(default = "default_password")]
    pub password: String,
    #[serde(default = "default_nt_password")]
    pub nt_password: String,
    #[serde(default = "default_home_directory")]
    pub home_directory: String,
}

fn default_account_control() -> String {
    "userAccountControl".to_string()
}

fn default_country() -> String {
    "c".to_string()
}

fn default_uid_number() -> String {
    "uidNumber".to_string()
}

fn default_sid() -> String {
    "sambaSID".to_string()
}

fn default_password() -> String {
    "userPassword".to_string()
}

fn default_nt_password() -> String {
    "sambaNTPassword".to_string()
}

fn default_home_directory() -> String {
    "homeDirectory".to_string()
}

/// Template for an entry created by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewObjectTemplate {
    /// Object classes and fixed attributes.
    pub mask: ObjectMask,
    /// Lowest numeric id handed out to new objects.
    #[serde(default)]
    pub min_member_number: i64,
}

/// Object classes and fixed attributes of a new entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectMask {
    #[serde(rename = "objectClass")]
    pub object_class: Vec<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, AttributeValue>,
}

impl SyncConfig {
    /// Parse a configuration document.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(yaml)
    }

    /// Read, parse and validate a configuration file.
    pub fn load(path: &Path) -> EngineResult<Self> {
        let text = std::fs::read_to_string(path).map_err(|source| EngineError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_yaml_str(&text).map_err(|source| EngineError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Schema of a directory role.
    pub fn schema(&self, role: DirectoryRole) -> &DirectorySchema {
        match role {
            DirectoryRole::Primary => &self.primary.schema,
            DirectoryRole::Secondary => &self.secondary.schema,
        }
    }

    /// Template for new secondary groups.
    pub fn new_group_template(&self) -> EngineResult<&NewObjectTemplate> {
        self.secondary
            .schema
            .new_group
            .as_ref()
            .ok_or_else(|| EngineError::invalid_configuration("secondary schema has no new_group"))
    }

    /// Template for new secondary users.
    pub fn new_user_template(&self) -> EngineResult<&NewObjectTemplate> {
        self.secondary
            .schema
            .new_user
            .as_ref()
            .ok_or_else(|| EngineError::invalid_configuration("secondary schema has no new_user"))
    }

    /// Check the configuration for values the engine cannot work with.
    pub fn validate(&self) -> EngineResult<()> {
        for role in DirectoryRole::ALL {
            let schema = self.schema(role);
            if schema.base.trim().is_empty() {
                return Err(EngineError::invalid_configuration(format!(
                    "{role} schema base is empty"
                )));
            }
            if schema.objects.user.name.is_empty() || schema.objects.group.name.is_empty() {
                return Err(EngineError::invalid_configuration(format!(
                    "{role} schema is missing a name attribute"
                )));
            }
        }

        let secondary = &self.secondary.schema;
        if secondary.new_group.is_none() {
            return Err(EngineError::invalid_configuration(
                "secondary schema has no new_group template",
            ));
        }
        if secondary.new_user.is_none() {
            return Err(EngineError::invalid_configuration(
                "secondary schema has no new_user template",
            ));
        }
        if secondary.sid_prefix.as_deref().unwrap_or("").is_empty() {
            return Err(EngineError::invalid_configuration(
                "secondary schema has new_user but no sid_prefix",
            ));
        }
        if let Some(missing) = secondary
            .enable_user_mask
            .keys()
            .find(|k| !secondary.disable_user_mask.contains_key(*k))
        {
            return Err(EngineError::invalid_configuration(format!(
                "enable_user_mask attribute '{missing}' has no disable_user_mask value"
            )));
        }

        if self.settings.password_length < REQUIRED_PASSWORD_CLASSES {
            return Err(EngineError::invalid_configuration(format!(
                "password_length {} cannot hold {} character classes",
                self.settings.password_length, REQUIRED_PASSWORD_CLASSES
            )));
        }
        if self.settings.special_password_characters.is_empty() {
            return Err(EngineError::invalid_configuration(
                "special_password_characters is empty",
            ));
        }

        Ok(())
    }
}
