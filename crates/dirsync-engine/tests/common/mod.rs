//! Common test utilities for dirsync-engine integration tests.

#![allow(dead_code)]

use std::cell::Cell;

use secrecy::SecretString;

use dirsync_directory::{
    Directory, DirectoryEntry, DirectoryError, DirectoryResult, MemoryDirectory, PasswordCapability,
    PasswordPolicy, PasswordScheme,
};
use dirsync_engine::{
    CountryControlTable, EngineResult, ExceptionTable, RoleMap, RunOptions, SyncConfig, SyncEngine,
    SyncMode, SyncSession,
};

pub const AD_BASE: &str = "DC=example,DC=com";
pub const LDAP_BASE: &str = "dc=example,dc=com";

/// Configuration shared by every integration test.
pub const CONFIG: &str = r#"
settings:
  total_change_threshold: 20
  additions_change_threshold: 20
  deletions_change_threshold: 10
  small_group_blind_update: 10
  password_length: 16
ad:
  schema:
    base: DC=example,DC=com
    groups: OU=Groups
    users: OU=Users
    user_sync_ous: [OU=Users]
    objects:
      group: {obj_class: group, name: cn, gid_number: gidNumber, members: member}
      user: {obj_class: user, name: sAMAccountName}
    remote_synced_attrs:
      mail: mail
      givenName: givenName
openldap:
  schema:
    base: dc=example,dc=com
    groups: ou=Group
    users: ou=People
    user_sync_ous: [ou=People]
    objects:
      group: {obj_class: posixGroup, name: cn, gid_number: gidNumber, members: memberUid}
      user: {obj_class: posixAccount, name: uid}
    remote_synced_attrs:
      uidNumber: uidNumber
    local_copy_attrs:
      givenName: gecos
    new_group:
      mask:
        objectClass: [top, posixGroup]
      min_member_number: 5000
    new_user:
      mask:
        objectClass: [top, posixAccount, sambaSamAccount]
        attributes:
          gidNumber: 100
          loginShell: /bin/bash
      min_member_number: 10000
    sid_prefix: S-1-5-21-1-2-3-
    enable_user_mask:
      sambaAcctFlags: "[U          ]"
    disable_user_mask:
      sambaAcctFlags: "[DU         ]"
"#;

pub const ENABLED_FLAGS: &str = "[U          ]";
pub const DISABLED_FLAGS: &str = "[DU         ]";

// =============================================================================
// Tracing
// =============================================================================

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("dirsync_engine=debug")
        .with_test_writer()
        .try_init();
}

// =============================================================================
// Entry factories
// =============================================================================

pub fn ad_user_dn(cn: &str) -> String {
    format!("CN={cn},OU=Users,{AD_BASE}")
}

pub fn ad_group_dn(name: &str) -> String {
    format!("CN={name},OU=Groups,{AD_BASE}")
}

pub fn ldap_user_dn(login: &str) -> String {
    format!("uid={login},ou=People,{LDAP_BASE}")
}

pub fn ldap_group_dn(name: &str) -> String {
    format!("cn={name},ou=Group,{LDAP_BASE}")
}

/// An active primary user with no country.
pub fn ad_user(cn: &str, login: &str) -> DirectoryEntry {
    ad_user_with(cn, login, 512, None)
}

pub fn ad_user_with(cn: &str, login: &str, control: i64, country: Option<&str>) -> DirectoryEntry {
    let mut entry = DirectoryEntry::new(ad_user_dn(cn))
        .with("objectClass", vec!["top", "person", "organizationalPerson", "user"])
        .with("cn", cn)
        .with("sAMAccountName", login)
        .with("userAccountControl", control);
    if let Some(country) = country {
        entry = entry.with("c", country);
    }
    entry
}

/// A primary group. `members` are full DNs.
pub fn ad_group(name: &str, gid: Option<i64>, members: &[String]) -> DirectoryEntry {
    let mut entry = DirectoryEntry::new(ad_group_dn(name))
        .with("objectClass", vec!["top", "group"])
        .with("cn", name)
        .with("member", members.to_vec());
    if let Some(gid) = gid {
        entry = entry.with("gidNumber", gid);
    }
    entry
}

/// A complete, enabled secondary account.
pub fn ldap_user(login: &str, uid_number: i64) -> DirectoryEntry {
    DirectoryEntry::new(ldap_user_dn(login))
        .with("objectClass", vec!["top", "posixAccount", "sambaSamAccount"])
        .with("uid", login)
        .with("cn", login)
        .with("uidNumber", uid_number)
        .with("sambaSID", format!("S-1-5-21-1-2-3-{uid_number}"))
        .with("sambaAcctFlags", ENABLED_FLAGS)
}

/// A secondary group. `members` are logins.
pub fn ldap_group(name: &str, gid: i64, members: &[&str]) -> DirectoryEntry {
    DirectoryEntry::new(ldap_group_dn(name))
        .with("objectClass", vec!["top", "posixGroup"])
        .with("cn", name)
        .with("gidNumber", gid)
        .with("memberUid", members.to_vec())
}

/// Member DNs of primary users by common name.
pub fn dns(cns: &[&str]) -> Vec<String> {
    cns.iter().map(|cn| ad_user_dn(cn)).collect()
}

// =============================================================================
// Password double
// =============================================================================

/// Deterministic password capability that counts generations.
#[derive(Default)]
pub struct RecordingPasswords {
    pub generated: Cell<usize>,
}

impl PasswordCapability for RecordingPasswords {
    fn generate(&self, policy: &PasswordPolicy) -> DirectoryResult<SecretString> {
        if policy.length < 4 {
            return Err(DirectoryError::PasswordExhausted { attempts: 1000 });
        }
        self.generated.set(self.generated.get() + 1);
        Ok(SecretString::from(format!("Pw#{}aB", self.generated.get())))
    }

    fn encode(&self, _secret: &SecretString, scheme: PasswordScheme) -> DirectoryResult<Vec<u8>> {
        Ok(match scheme {
            PasswordScheme::SaltedHash => b"{CRYPT}$6$rounds=5000$test".to_vec(),
            PasswordScheme::LegacyHash => b"8846F7EAEE8FB117AD06BDD830B7586C".to_vec(),
        })
    }
}

// =============================================================================
// Harness
// =============================================================================

/// Both directories, the tables and the configuration of one test.
pub struct Harness {
    pub config: SyncConfig,
    pub primary: MemoryDirectory,
    pub secondary: MemoryDirectory,
    pub exceptions: ExceptionTable,
    pub countries: CountryControlTable,
    pub passwords: RecordingPasswords,
}

impl Harness {
    pub fn new() -> Self {
        init_tracing();
        Self {
            config: SyncConfig::from_yaml_str(CONFIG).expect("test configuration parses"),
            primary: MemoryDirectory::new("primary"),
            secondary: MemoryDirectory::new("secondary"),
            exceptions: ExceptionTable::default(),
            countries: CountryControlTable::default(),
            passwords: RecordingPasswords::default(),
        }
    }

    pub fn with_primary(mut self, entry: DirectoryEntry) -> Self {
        self.primary.insert(entry);
        self
    }

    pub fn with_secondary(mut self, entry: DirectoryEntry) -> Self {
        self.secondary.insert(entry);
        self
    }

    pub fn with_exceptions(mut self, exceptions: ExceptionTable) -> Self {
        self.exceptions = exceptions;
        self
    }

    pub fn with_countries(mut self, countries: CountryControlTable) -> Self {
        self.countries = countries;
        self
    }

    /// Run one mode with fresh session state.
    pub fn run(&mut self, mode: SyncMode, options: RunOptions) -> (SyncSession, EngineResult<()>) {
        let mut session = SyncSession::new(options);
        let primary: &mut dyn Directory = &mut self.primary;
        let secondary: &mut dyn Directory = &mut self.secondary;
        let mut engine = SyncEngine::new(
            &self.config,
            &self.exceptions,
            &self.countries,
            &self.passwords,
            RoleMap::new(primary, secondary),
        );
        let result = engine.run(mode, &mut session);
        (session, result)
    }

    pub fn group_sync(&mut self) -> SyncSession {
        let (session, result) = self.run(SyncMode::GroupSync, RunOptions::new());
        result.expect("group sync completes");
        session
    }

    pub fn user_sync(&mut self) -> SyncSession {
        let (session, result) = self.run(SyncMode::UserSync, RunOptions::new());
        result.expect("user sync completes");
        session
    }

    /// Sorted `memberUid` values of a secondary group.
    pub fn ldap_members(&self, group: &str) -> Vec<String> {
        let mut members: Vec<String> = self
            .secondary
            .entry(&ldap_group_dn(group))
            .map(|entry| entry.get_strings("memberUid").into_iter().map(str::to_string).collect())
            .unwrap_or_default();
        members.sort();
        members
    }

    pub fn ldap_user(&self, login: &str) -> Option<&DirectoryEntry> {
        self.secondary.entry(&ldap_user_dn(login))
    }
}
