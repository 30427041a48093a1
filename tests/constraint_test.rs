// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests for cross-stream uniqueness constraints.

use std::collections::BTreeMap;

use serde_json::json;
use tempfile::tempdir;
use vaultlog::{Annotations, AppendEvent, Error, Vault};

fn unique_email() -> Annotations {
    Annotations {
        constraint: BTreeMap::from([("unique-email".to_string(), vec!["email".to_string()])]),
        ..Default::default()
    }
}

#[test]
fn test_duplicate_value_in_another_stream_is_rejected() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let event =
        AppendEvent::new("u1", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    vault.append_event(event).unwrap();

    let event =
        AppendEvent::new("u2", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    let result = vault.append_event(event);
    assert!(matches!(
        result,
        Err(Error::ConstraintViolation { ref label, .. }) if label == "unique-email"
    ));

    // The rejected append left nothing behind.
    assert!(vault.reader().read_event_view("u2").unwrap().is_empty());
    let rtxn = vault.storage().env.read_txn().unwrap();
    assert!(vault.storage().keystore.get(&rtxn, "u2").unwrap().is_none());
    assert!(vault
        .storage()
        .stream_heads
        .get(&rtxn, "u2")
        .unwrap()
        .is_none());
}

#[test]
fn test_distinct_values_coexist() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let event =
        AppendEvent::new("u1", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    vault.append_event(event).unwrap();

    let event = AppendEvent::new("u2", 1, json!({"email": "grace@example.com"}))
        .annotations(unique_email());
    vault.append_event(event).unwrap();
}

#[test]
fn test_a_live_claim_blocks_even_its_own_stream() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let event =
        AppendEvent::new("u1", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    vault.append_event(event).unwrap();

    // The tuple is held outright; re-recording it is a conflict regardless
    // of who holds it. Later events simply omit the annotation.
    let event =
        AppendEvent::new("u1", 2, json!({"email": "ada@example.com"})).annotations(unique_email());
    assert!(matches!(
        vault.append_event(event),
        Err(Error::ConstraintViolation { .. })
    ));

    let event = AppendEvent::new("u1", 2, json!({"email": "ada@example.com"}));
    vault.append_event(event).unwrap();
}

#[test]
fn test_stream_deletion_releases_claims_for_reuse() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let event =
        AppendEvent::new("u1", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    vault.append_event(event).unwrap();

    vault.mark_stream_deleted("u1", 1_700_000_000).unwrap();

    // The tombstoned claim is reclaimable by a different stream.
    let event =
        AppendEvent::new("u2", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    vault.append_event(event).unwrap();

    // And the new owner now blocks everyone else again.
    let event =
        AppendEvent::new("u3", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    assert!(matches!(
        vault.append_event(event),
        Err(Error::ConstraintViolation { .. })
    ));
}

#[test]
fn test_dry_run_evaluate_reports_without_claiming() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let event =
        AppendEvent::new("u1", 1, json!({"email": "ada@example.com"})).annotations(unique_email());
    vault.append_event(event).unwrap();

    // Taken by another stream.
    let taken = vault
        .evaluate_constraint(
            "u2",
            "unique-email",
            &["email".to_string()],
            &json!({"email": "ada@example.com"}),
            false,
            1_700_000_000,
        )
        .unwrap();
    assert!(!taken);

    // Free value.
    let free = vault
        .evaluate_constraint(
            "u2",
            "unique-email",
            &["email".to_string()],
            &json!({"email": "grace@example.com"}),
            false,
            1_700_000_000,
        )
        .unwrap();
    assert!(free);

    // The dry run recorded nothing: the free value is still free.
    let event = AppendEvent::new("u3", 1, json!({"email": "grace@example.com"}))
        .annotations(unique_email());
    vault.append_event(event).unwrap();
}

#[test]
fn test_absent_keys_make_the_constraint_vacuous() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    // Neither document carries an email: nothing to claim, both pass.
    for stream in ["u1", "u2"] {
        let event = AppendEvent::new(stream, 1, json!({"name": "anon"})).annotations(unique_email());
        vault.append_event(event).unwrap();
    }
}

#[test]
fn test_multi_key_constraints_claim_the_tuple() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let annotations = Annotations {
        constraint: BTreeMap::from([(
            "unique-handle".to_string(),
            vec!["org".to_string(), "handle".to_string()],
        )]),
        ..Default::default()
    };

    let event = AppendEvent::new("u1", 1, json!({"org": "acme", "handle": "ada"}))
        .annotations(annotations.clone());
    vault.append_event(event).unwrap();

    // Same handle in a different org is a different tuple.
    let event = AppendEvent::new("u2", 1, json!({"org": "globex", "handle": "ada"}))
        .annotations(annotations.clone());
    vault.append_event(event).unwrap();

    // The exact tuple collides.
    let event = AppendEvent::new("u3", 1, json!({"org": "acme", "handle": "ada"}))
        .annotations(annotations);
    assert!(matches!(
        vault.append_event(event),
        Err(Error::ConstraintViolation { .. })
    ));
}

#[test]
fn test_define_rule_is_idempotent() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let keys = vec!["email".to_string()];
    vault
        .define_constraint_rule("unique-email", &keys, 1_700_000_000)
        .unwrap();
    vault
        .define_constraint_rule("unique-email", &keys, 1_700_000_999)
        .unwrap();

    let rtxn = vault.storage().env.read_txn().unwrap();
    let rules = vault.storage().constraint_rules.iter(&rtxn).unwrap().count();
    assert_eq!(rules, 1);
}
