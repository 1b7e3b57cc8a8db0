//! User sync integration tests.
//!
//! Cover the lifecycle step, the four attribute passes and the final
//! replace modifies against in-memory directories.

mod common;

use common::*;
use dirsync_directory::{AttributeValue, DirectoryEntry, Mutation};
use dirsync_engine::{ExceptionTable, RunOptions, SyncMode};

fn modified_attributes(mutations: &[Mutation], dn: &str) -> Vec<String> {
    mutations
        .iter()
        .filter_map(|m| match m {
            Mutation::Modify(change) if change.dn.eq_ignore_ascii_case(dn) => Some(change),
            _ => None,
        })
        .flat_map(|change| change.attributes().into_iter().map(str::to_string))
        .collect()
}

// =============================================================================
// Attribute passes
// =============================================================================

#[test]
fn test_attributes_flow_through_every_pass() {
    let mut harness = Harness::new()
        .with_primary(
            ad_user("Zoe Z", "Zoë")
                .with("givenName", "Zoë")
                .with("mail", "zoe@example.com"),
        )
        .with_secondary(
            ldap_user("zoe", 10005)
                .with("givenName", "Zo")
                .with("mail", "old@example.com"),
        );

    let session = harness.user_sync();

    assert!(session.is_success(), "{:?}", session.status.failures());
    let zoe = harness.ldap_user("zoe").unwrap();
    assert_eq!(zoe.get_string("givenName"), Some("Zoe"));
    assert_eq!(zoe.get_string("mail"), Some("zoe@example.com"));
    assert_eq!(zoe.get_string("gecos"), Some("Zoe"));

    let ad = harness.primary.entry(&ad_user_dn("Zoe Z")).unwrap();
    assert_eq!(ad.get_i64("uidNumber"), Some(10005));

    // One replace per directory, no password reset.
    assert_eq!(harness.secondary.mutations().len(), 1);
    assert_eq!(harness.primary.mutations().len(), 1);
    assert_eq!(harness.passwords.generated.get(), 0);
}

#[test]
fn test_transliterated_value_already_in_place_is_not_rewritten() {
    let mut harness = Harness::new()
        .with_primary(
            ad_user("Zoe Z", "zoe")
                .with("givenName", "Zoë")
                .with("uidNumber", 10005_i64),
        )
        .with_secondary(
            ldap_user("zoe", 10005)
                .with("givenName", "Zoe")
                .with("gecos", "Zoe"),
        );

    let session = harness.user_sync();

    assert!(session.is_success());
    assert!(harness.secondary.mutations().is_empty());
    assert!(harness.primary.mutations().is_empty());
}

// =============================================================================
// Lifecycle
// =============================================================================

#[test]
fn test_primary_only_user_is_created_and_populated() {
    let mut harness = Harness::new()
        .with_primary(
            ad_user("Newbie", "newbie")
                .with("givenName", "New")
                .with("mail", "newbie@example.com"),
        )
        .with_secondary(ldap_user("old", 10000));

    let session = harness.user_sync();

    assert!(session.is_success(), "{:?}", session.status.failures());
    let newbie = harness.ldap_user("newbie").unwrap();
    assert_eq!(newbie.get_i64("uidNumber"), Some(10001));
    assert_eq!(newbie.get_string("sambaSID"), Some("S-1-5-21-1-2-3-10001"));
    assert_eq!(newbie.get_string("homeDirectory"), Some("/home/newbie"));
    assert_eq!(newbie.get_string("loginShell"), Some("/bin/bash"));
    assert_eq!(newbie.get_string("mail"), Some("newbie@example.com"));
    assert_eq!(newbie.get_string("gecos"), Some("New"));
    assert!(newbie.has("userPassword"));
    assert_eq!(
        newbie.get_string("sambaNTPassword"),
        Some("8846F7EAEE8FB117AD06BDD830B7586C")
    );
    assert_eq!(harness.passwords.generated.get(), 1);

    let ad = harness.primary.entry(&ad_user_dn("Newbie")).unwrap();
    assert_eq!(ad.get_i64("uidNumber"), Some(10001));

    // The secondary-only account is left alone.
    assert!(modified_attributes(harness.secondary.mutations(), &ldap_user_dn("old")).is_empty());
}

#[test]
fn test_inactive_user_is_disabled() {
    let mut harness = Harness::new()
        .with_primary(ad_user_with("Bob", "bob", 514, None))
        .with_secondary(ldap_user("bob", 10002));

    let session = harness.user_sync();

    assert!(session.is_success());
    let bob = harness.ldap_user("bob").unwrap();
    assert_eq!(bob.get_string("sambaAcctFlags"), Some(DISABLED_FLAGS));
    assert!(bob.has("userPassword"));
    assert!(bob.has("sambaNTPassword"));
    assert_eq!(harness.passwords.generated.get(), 1);
}

#[test]
fn test_active_user_is_re_enabled() {
    let mut harness = Harness::new()
        .with_primary(ad_user_with("Bob", "bob", 66048, None))
        .with_secondary(ldap_user("bob", 10002).with("sambaAcctFlags", DISABLED_FLAGS));

    harness.user_sync();

    let bob = harness.ldap_user("bob").unwrap();
    assert_eq!(bob.get_string("sambaAcctFlags"), Some(ENABLED_FLAGS));
}

#[test]
fn test_missing_sid_class_is_added() {
    let legacy = DirectoryEntry::new(ldap_user_dn("legacy"))
        .with("objectClass", vec!["top", "posixAccount"])
        .with("uid", "legacy")
        .with("uidNumber", 10003_i64)
        .with("sambaAcctFlags", ENABLED_FLAGS);
    let mut harness = Harness::new()
        .with_primary(ad_user("Legacy", "legacy"))
        .with_secondary(ldap_user("zoe", 10005))
        .with_secondary(legacy);

    let session = harness.user_sync();

    assert!(session.is_success(), "{:?}", session.status.failures());
    let legacy = harness.ldap_user("legacy").unwrap();
    assert!(legacy.has_object_class("sambaSamAccount"));
    assert_eq!(legacy.get_string("sambaSID"), Some("S-1-5-21-1-2-3-10006"));
    assert!(legacy.has("sambaNTPassword"));
    assert!(!legacy.has("userPassword"));
}

// =============================================================================
// Exceptions
// =============================================================================

#[test]
fn test_excluded_user_is_never_touched() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Backup", "svc_backup").with("mail", "backup@example.com"))
        .with_exceptions(ExceptionTable::from_map([("svc_backup", "NONE")]));

    let session = harness.user_sync();

    assert!(session.is_success());
    assert!(harness.ldap_user("svc_backup").is_none());
    assert!(harness.secondary.mutations().is_empty());
    assert!(harness.primary.mutations().is_empty());
}

#[test]
fn test_mapped_user_syncs_onto_target_account() {
    let mut harness = Harness::new()
        .with_primary(ad_user("John Ext", "jdoe.ext").with("givenName", "John"))
        .with_secondary(ldap_user("jdoe", 10010))
        .with_exceptions(ExceptionTable::from_map([("jdoe.ext", "jdoe")]));

    let session = harness.user_sync();

    assert!(session.is_success(), "{:?}", session.status.failures());
    assert!(harness.ldap_user("jdoe.ext").is_none());
    let jdoe = harness.ldap_user("jdoe").unwrap();
    assert_eq!(jdoe.get_string("givenName"), Some("John"));
    assert_eq!(jdoe.get_string("gecos"), Some("John"));
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_multi_valued_attribute_aborts() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Dup", "dup").with("mail", vec!["a@example.com", "b@example.com"]))
        .with_secondary(ldap_user("dup", 10020));

    let (_, result) = harness.run(SyncMode::UserSync, RunOptions::new());

    assert_eq!(result.unwrap_err().error_code(), "MULTI_VALUED_ATTRIBUTE");
    assert!(harness.secondary.mutations().is_empty());
}

#[test]
fn test_rejected_user_modify_is_recorded() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice").with("mail", "alice@example.com"))
        .with_primary(ad_user("Bob", "bob").with("mail", "bob@example.com"))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_user("bob", 10002));
    harness.secondary.fail_mutations_on(&ldap_user_dn("alice"));

    let session = harness.user_sync();

    assert!(!session.is_success());
    let failure = &session.status.failures()[0];
    assert_eq!(failure.phase, "modify_user");
    assert_eq!(failure.entity, "alice");
    assert_eq!(
        harness.ldap_user("bob").unwrap().get("mail"),
        Some(&AttributeValue::from("bob@example.com"))
    );
}
