//! Group sync integration tests.
//!
//! Both directories are in-memory; every test drives a full run through
//! `SyncEngine` and inspects the resulting secondary state.

mod common;

use common::*;
use dirsync_engine::{CountryControlTable, ExceptionTable, RunOptions, SyncMode};

/// Primary and secondary accounts for `count` users named u00, u01, ...
fn numbered_users(mut harness: Harness, count: usize) -> Harness {
    for i in 0..count {
        let login = format!("u{i:02}");
        harness = harness
            .with_primary(ad_user(&login.to_uppercase(), &login))
            .with_secondary(ldap_user(&login, 10_000 + i as i64));
    }
    harness
}

fn numbered_dns(count: usize) -> Vec<String> {
    (0..count).map(|i| ad_user_dn(&format!("U{i:02}"))).collect()
}

fn numbered_logins(count: usize) -> Vec<String> {
    (0..count).map(|i| format!("u{i:02}")).collect()
}

// =============================================================================
// Membership diff
// =============================================================================

#[test]
fn test_end_to_end_membership() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_user("Bob", "bob"))
        .with_primary(ad_group("devs", Some(1000), &dns(&["Alice", "Bob"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_user("bob", 10002))
        .with_secondary(ldap_user("carol", 10003))
        .with_secondary(ldap_group("devs", 1000, &["bob", "carol"]));

    let session = harness.group_sync();

    assert!(session.is_success());
    assert_eq!(harness.ldap_members("devs"), vec!["alice", "bob"]);
    assert_eq!(harness.secondary.mutations().len(), 2);
    assert!(harness.primary.mutations().is_empty());
}

#[test]
fn test_second_run_is_a_no_op() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_group("devs", Some(1000), &dns(&["Alice"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_group("devs", 1000, &[]));

    harness.group_sync();
    let applied = harness.secondary.mutations().len();
    let session = harness.group_sync();

    assert!(session.is_success());
    assert_eq!(harness.secondary.mutations().len(), applied);
}

#[test]
fn test_disabled_members_are_removed() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_user_with("Bob", "bob", 514, None))
        .with_primary(ad_group("devs", Some(1000), &dns(&["Alice", "Bob"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_user("bob", 10002))
        .with_secondary(ldap_group("devs", 1000, &["alice", "bob"]));

    let session = harness.group_sync();

    assert!(session.is_success());
    assert_eq!(harness.ldap_members("devs"), vec!["alice"]);
}

#[test]
fn test_id_mismatch_is_skipped() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_group("devs", Some(1000), &dns(&["Alice"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_group("devs", 1001, &[]));

    let session = harness.group_sync();

    assert!(session.is_success());
    assert!(harness.secondary.mutations().is_empty());
}

#[test]
fn test_nested_groups_with_cycle() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_user("Dave", "dave"))
        .with_primary(ad_group(
            "all",
            Some(2000),
            &[ad_group_dn("devs"), ad_user_dn("Dave")],
        ))
        .with_primary(ad_group(
            "devs",
            Some(2001),
            &[ad_group_dn("all"), ad_user_dn("Alice")],
        ))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_user("dave", 10004))
        .with_secondary(ldap_group("all", 2000, &[]))
        .with_secondary(ldap_group("devs", 2001, &[]));

    let session = harness.group_sync();

    assert!(session.is_success());
    assert_eq!(harness.ldap_members("all"), vec!["alice", "dave"]);
    assert_eq!(harness.ldap_members("devs"), vec!["alice", "dave"]);
}

// =============================================================================
// Identity resolution
// =============================================================================

#[test]
fn test_unresolvable_member_fails_run_but_others_apply() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_user("Ghost", "ghost"))
        .with_primary(ad_group("devs", Some(1000), &dns(&["Alice", "Ghost"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_group("devs", 1000, &[]));

    let session = harness.group_sync();

    assert!(!session.is_success());
    assert_eq!(session.status.failures()[0].phase, "resolve_identity");
    assert_eq!(harness.ldap_members("devs"), vec!["alice"]);
}

#[test]
fn test_exception_mapping_and_exclusion() {
    let mut harness = Harness::new()
        .with_primary(ad_user("John Ext", "jdoe.ext"))
        .with_primary(ad_user("Backup", "svc_backup"))
        .with_primary(ad_group("ops", Some(4100), &dns(&["John Ext", "Backup"])))
        .with_secondary(ldap_user("jdoe", 10010))
        .with_secondary(ldap_group("ops", 4100, &[]))
        .with_exceptions(ExceptionTable::from_map([
            ("jdoe.ext", "jdoe"),
            ("svc_backup", "NONE"),
        ]));

    let session = harness.group_sync();

    assert!(session.is_success(), "{:?}", session.status.failures());
    assert_eq!(harness.ldap_members("ops"), vec!["jdoe"]);
}

#[test]
fn test_country_control() {
    let mut harness = Harness::new()
        .with_primary(ad_user_with("Alice", "alice", 512, Some("GB")))
        .with_primary(ad_user_with("Tom", "tom", 512, Some("TW")))
        .with_primary(ad_user("Svc", "svc"))
        .with_primary(ad_group("export", Some(4000), &dns(&["Alice", "Tom", "Svc"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_user("tom", 10002))
        .with_secondary(ldap_user("svc", 10003))
        .with_secondary(ldap_group("export", 4000, &[]))
        .with_countries(CountryControlTable::from_map([("export", vec!["GB"])]));

    let session = harness.group_sync();

    assert!(session.is_success());
    assert_eq!(harness.ldap_members("export"), vec!["alice", "svc"]);
}

// =============================================================================
// Safety gate
// =============================================================================

fn big_group_harness() -> Harness {
    numbered_users(Harness::new(), 15)
        .with_primary(ad_group("big", Some(3000), &numbered_dns(15)))
        .with_secondary(ldap_group(
            "big",
            3000,
            &numbered_logins(10).iter().map(String::as_str).collect::<Vec<_>>(),
        ))
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_group("small", Some(3001), &dns(&["Alice"])))
        .with_secondary(ldap_user("alice", 10100))
        .with_secondary(ldap_group("small", 3001, &[]))
}

#[test]
fn test_threshold_breach_blocks_group() {
    let mut harness = big_group_harness();

    let session = harness.group_sync();

    assert!(!session.is_success());
    let failure = &session.status.failures()[0];
    assert_eq!(failure.phase, "safety_gate");
    assert_eq!(failure.entity, "big");
    assert_eq!(harness.ldap_members("big").len(), 10);
    // Other groups are still processed.
    assert_eq!(harness.ldap_members("small"), vec!["alice"]);
}

#[test]
fn test_universal_override_applies() {
    let mut harness = big_group_harness();

    let (session, result) = harness.run(
        SyncMode::GroupSync,
        RunOptions::new().with_universal_override(true),
    );

    result.unwrap();
    assert!(session.is_success());
    assert_eq!(harness.ldap_members("big").len(), 15);
}

#[test]
fn test_group_override_is_by_name() {
    let mut harness = big_group_harness();

    let (session, result) = harness.run(
        SyncMode::GroupSync,
        RunOptions::new().with_group_override(["BIG"]),
    );

    result.unwrap();
    assert!(session.is_success());
    assert_eq!(harness.ldap_members("big").len(), 15);
}

// =============================================================================
// Group creation
// =============================================================================

#[test]
fn test_new_group_with_allocated_id_is_written_back() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_user("Bob", "bob"))
        .with_primary(ad_group("ops", None, &dns(&["Alice"])))
        .with_primary(ad_group("web", Some(7000), &dns(&["Bob"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_user("bob", 10002))
        .with_secondary(ldap_group("legacy", 5000, &[]));

    let session = harness.group_sync();

    assert!(session.is_success(), "{:?}", session.status.failures());

    let ops = harness.secondary.entry(&ldap_group_dn("ops")).unwrap();
    assert_eq!(ops.get_i64("gidNumber"), Some(5001));
    assert!(ops.has_object_class("posixGroup"));
    assert_eq!(
        harness.primary.entry(&ad_group_dn("ops")).unwrap().get_i64("gidNumber"),
        Some(5001)
    );

    let web = harness.secondary.entry(&ldap_group_dn("web")).unwrap();
    assert_eq!(web.get_i64("gidNumber"), Some(7000));
    assert_eq!(harness.primary.mutations().len(), 1);

    assert_eq!(harness.ldap_members("ops"), vec!["alice"]);
    assert_eq!(harness.ldap_members("web"), vec!["bob"]);
}

#[test]
fn test_failed_write_back_is_recorded() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_group("ops", None, &dns(&["Alice"])))
        .with_secondary(ldap_user("alice", 10001));
    harness.primary.fail_mutations_on(&ad_group_dn("ops"));

    let session = harness.group_sync();

    assert!(!session.is_success());
    assert_eq!(session.status.failures()[0].phase, "write_back_group_id");
    assert!(harness.secondary.entry(&ldap_group_dn("ops")).is_some());
    // Ids now differ, so the group is not populated this run.
    assert!(harness.ldap_members("ops").is_empty());
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_rejected_modify_is_recorded() {
    let mut harness = Harness::new()
        .with_primary(ad_user("Alice", "alice"))
        .with_primary(ad_group("devs", Some(1000), &dns(&["Alice"])))
        .with_secondary(ldap_user("alice", 10001))
        .with_secondary(ldap_group("devs", 1000, &[]));
    harness.secondary.fail_mutations_on(&ldap_group_dn("devs"));

    let session = harness.group_sync();

    assert!(!session.is_success());
    assert_eq!(session.status.failures()[0].phase, "modify_group");
}

#[test]
fn test_search_failure_aborts() {
    let mut harness = Harness::new()
        .with_primary(ad_group("devs", Some(1000), &[]))
        .with_secondary(ldap_group("devs", 1000, &[]));
    harness.secondary.fail_searches(true);

    let (_, result) = harness.run(SyncMode::GroupSync, RunOptions::new());

    assert_eq!(result.unwrap_err().error_code(), "SEARCH_FAILED");
}
