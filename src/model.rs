// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Per-event directives for the cipher policy engine and the constraint rule
/// engine. Stored verbatim alongside the event; never itself transformed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Annotations {
    /// Dotted field path -> algorithm selector, e.g. `{"profile.ssn": "sha256"}`.
    /// Unknown selectors fall back to `aes`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub encrypt: BTreeMap<String, String>,
    /// Rule label -> key paths, e.g. `{"unique-email": ["email"]}`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub constraint: BTreeMap<String, Vec<String>>,
}

impl Annotations {
    pub fn is_empty(&self) -> bool {
        self.encrypt.is_empty() && self.constraint.is_empty()
    }
}

/// One immutable row of the event journal.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Global insertion order across all streams. 1-based, gapless.
    pub ordering: u64,
    pub stream_id: String,
    /// 1-based position within the stream. Unique per `(stream_id, sequence_nr)`.
    pub sequence_nr: u64,
    pub created_at: i64,
    /// Structured payload; possibly partially ciphertext at rest.
    pub data: Value,
    #[serde(default)]
    pub metadata: Value,
    #[serde(default)]
    pub annotations: Annotations,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// One materialized-state row per `(stream_id, sequence_nr)`.
///
/// Metadata, annotations and tags are not stored here; the read view joins
/// them from the originating event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    pub ordering: u64,
    pub stream_id: String,
    pub sequence_nr: u64,
    pub created_at: i64,
    pub data: Value,
    #[serde(default)]
    pub is_deleted: bool,
}

/// A snapshot row joined with its source event's metadata at read time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotView {
    pub ordering: u64,
    pub stream_id: String,
    pub sequence_nr: u64,
    pub created_at: i64,
    pub data: Value,
    pub metadata: Value,
    pub annotations: Annotations,
    pub tags: Vec<String>,
    pub is_deleted: bool,
}

/// One encryption key record per stream.
///
/// Created exclusively by the journal append path on the stream's first
/// event. The key material is logically immutable; `is_deleted` is the only
/// mutable field (tombstoning suppresses decryption, it does not erase the
/// key).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EncryptionKeyRecord {
    pub stream_id: String,
    pub encryption_key: [u8; 32],
    pub created_at: i64,
    #[serde(default)]
    pub deleted_at: Option<i64>,
    #[serde(default)]
    pub is_deleted: bool,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A reusable uniqueness policy, unique by `(label, keys)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRule {
    pub label: String,
    pub keys: Vec<String>,
    pub created_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

/// A locked `(label, keys, values)` tuple owned by a stream.
///
/// `is_deleted` tracks the owning stream's deletion state; a tombstoned
/// record frees the tuple for reuse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstraintRecord {
    pub stream_id: String,
    pub label: String,
    pub keys: Vec<String>,
    pub values: Value,
    pub created_at: i64,
    #[serde(default)]
    pub is_deleted: bool,
}

/// Input to [`Vault::append_event`](crate::Vault::append_event).
#[derive(Debug, Clone, PartialEq)]
pub struct AppendEvent {
    pub stream_id: String,
    pub sequence_nr: u64,
    pub created_at: i64,
    pub data: Value,
    pub metadata: Value,
    pub annotations: Annotations,
    pub tags: Vec<String>,
}

impl AppendEvent {
    pub fn new(stream_id: impl Into<String>, sequence_nr: u64, data: Value) -> Self {
        Self {
            stream_id: stream_id.into(),
            sequence_nr,
            created_at: 0,
            data,
            metadata: Value::Object(serde_json::Map::new()),
            annotations: Annotations::default(),
            tags: Vec::new(),
        }
    }

    pub fn created_at(mut self, created_at: i64) -> Self {
        self.created_at = created_at;
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = metadata;
        self
    }

    pub fn annotations(mut self, annotations: Annotations) -> Self {
        self.annotations = annotations;
        self
    }

    pub fn tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }
}
