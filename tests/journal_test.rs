// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

//! Integration tests for the journal append path and the decrypting views.

use serde_json::json;
use tempfile::tempdir;
use vaultlog::{AppendEvent, Error, Vault};

#[test]
fn test_append_and_read_round_trip() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    for seq in 1..=3u64 {
        let event = AppendEvent::new("account-1", seq, json!({"balance": seq * 100}))
            .created_at(1_700_000_000 + seq as i64);
        let ordering = vault.append_event(event).expect("append failed");
        assert_eq!(ordering, seq);
    }

    let view = vault.reader().read_event_view("account-1").unwrap();
    assert_eq!(view.len(), 3);
    for (i, event) in view.iter().enumerate() {
        let seq = (i + 1) as u64;
        assert_eq!(event.ordering, seq);
        assert_eq!(event.sequence_nr, seq);
        assert_eq!(event.stream_id, "account-1");
        assert_eq!(event.data, json!({"balance": seq * 100}));
        assert!(!event.is_deleted);
    }
}

#[test]
fn test_ordering_is_global_across_streams() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    vault
        .append_event(AppendEvent::new("a", 1, json!({"n": 1})))
        .unwrap();
    vault
        .append_event(AppendEvent::new("b", 1, json!({"n": 2})))
        .unwrap();
    vault
        .append_event(AppendEvent::new("a", 2, json!({"n": 3})))
        .unwrap();
    vault
        .append_event(AppendEvent::new("b", 2, json!({"n": 4})))
        .unwrap();

    let journal = vault.reader().read_journal().unwrap();
    assert_eq!(journal.len(), 4);
    let orderings: Vec<u64> = journal.iter().map(|e| e.ordering).collect();
    assert_eq!(orderings, vec![1, 2, 3, 4]);
    let payloads: Vec<u64> = journal
        .iter()
        .map(|e| e.data["n"].as_u64().unwrap())
        .collect();
    assert_eq!(payloads, vec![1, 2, 3, 4]);

    let view_a = vault.reader().read_event_view("a").unwrap();
    assert_eq!(
        view_a.iter().map(|e| e.ordering).collect::<Vec<_>>(),
        vec![1, 3]
    );
}

#[test]
fn test_out_of_order_append_leaves_no_trace() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let result = vault.append_event(AppendEvent::new("s1", 3, json!({"x": 1})));
    assert!(matches!(
        result,
        Err(Error::OutOfOrderSequence {
            expected: 1,
            actual: 3,
            ..
        })
    ));

    // Nothing was persisted: no row, no head, no key record.
    assert!(vault.reader().read_event_view("s1").unwrap().is_empty());
    let rtxn = vault.storage().env.read_txn().unwrap();
    assert!(vault.storage().keystore.get(&rtxn, "s1").unwrap().is_none());
    assert!(vault
        .storage()
        .stream_heads
        .get(&rtxn, "s1")
        .unwrap()
        .is_none());
    drop(rtxn);

    // The stream is still usable from sequence 1.
    vault
        .append_event(AppendEvent::new("s1", 1, json!({"x": 1})))
        .unwrap();

    // Skipping past the head is also rejected.
    let result = vault.append_event(AppendEvent::new("s1", 3, json!({"x": 2})));
    assert!(matches!(
        result,
        Err(Error::OutOfOrderSequence {
            expected: 2,
            actual: 3,
            ..
        })
    ));
}

#[test]
fn test_duplicate_sequence_is_a_conflict() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    vault
        .append_event(AppendEvent::new("s1", 1, json!({"writer": "w1"})))
        .unwrap();

    // A concurrent writer that lost the race re-appends the same sequence.
    let result = vault.append_event(AppendEvent::new("s1", 1, json!({"writer": "w2"})));
    assert!(matches!(
        result,
        Err(Error::SequenceConflict { sequence_nr: 1, .. })
    ));

    // The loser retries with the re-read head and succeeds.
    vault
        .append_event(AppendEvent::new("s1", 2, json!({"writer": "w2"})))
        .unwrap();

    let view = vault.reader().read_event_view("s1").unwrap();
    assert_eq!(view.len(), 2);
    assert_eq!(view[0].data["writer"], "w1");
}

#[test]
fn test_invalid_stream_ids_are_rejected() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let result = vault.append_event(AppendEvent::new("", 1, json!({})));
    assert!(matches!(result, Err(Error::InvalidStreamId(_))));

    let result = vault.append_event(AppendEvent::new("bad\0id", 1, json!({})));
    assert!(matches!(result, Err(Error::InvalidStreamId(_))));
}

#[test]
fn test_ordering_is_persistent_across_reopen() {
    let dir = tempdir().expect("Failed to create temp dir");

    {
        let mut vault = Vault::new(dir.path()).expect("Failed to open vault");
        assert_eq!(
            vault
                .append_event(AppendEvent::new("s1", 1, json!({"n": 1})))
                .unwrap(),
            1
        );
        assert_eq!(
            vault
                .append_event(AppendEvent::new("s1", 2, json!({"n": 2})))
                .unwrap(),
            2
        );
    }

    let mut vault = Vault::new(dir.path()).expect("Failed to reopen vault");
    assert_eq!(
        vault
            .append_event(AppendEvent::new("s1", 3, json!({"n": 3})))
            .unwrap(),
        3
    );

    let view = vault.reader().read_event_view("s1").unwrap();
    assert_eq!(view.len(), 3);
}

#[test]
fn test_metadata_and_tags_are_stored_verbatim() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    let event = AppendEvent::new("s1", 1, json!({"n": 1}))
        .metadata(json!({"correlation_id": "abc"}))
        .tags(vec!["billing".to_string(), "audit".to_string()]);
    vault.append_event(event).unwrap();

    let view = vault.reader().read_event_view("s1").unwrap();
    assert_eq!(view[0].metadata, json!({"correlation_id": "abc"}));
    assert_eq!(view[0].tags, vec!["billing", "audit"]);
}

#[test]
fn test_readers_are_cloneable_across_threads() {
    let dir = tempdir().expect("Failed to create temp dir");
    let mut vault = Vault::new(dir.path()).expect("Failed to open vault");

    for seq in 1..=10u64 {
        vault
            .append_event(AppendEvent::new("s1", seq, json!({"n": seq})))
            .unwrap();
    }

    let r1 = vault.reader();
    let r2 = r1.clone();

    std::thread::scope(|s| {
        for reader in [r1, r2] {
            s.spawn(move || {
                let view = reader.read_event_view("s1").unwrap();
                assert_eq!(view.len(), 10);
            });
        }
    });
}
