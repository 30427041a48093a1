// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

//! The cross-stream uniqueness constraint rule engine.
//!
//! A rule names a `(label, keys)` projection; evaluating an event projects
//! its data onto the keys and checks that the resulting `(label, keys,
//! values)` tuple is held by no live record. Recording binds the tuple to the
//! writing stream; tombstoning the stream releases every tuple it holds.

use serde_json::Value;

use crate::error::{Error, Result};
use crate::model::{ConstraintRecord, ConstraintRule};
use crate::path::FieldPath;
use crate::storage::{constraint_key, rule_key, Storage};

pub struct ConstraintEngine {
    storage: Storage,
}

impl ConstraintEngine {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Defines (or re-affirms) a uniqueness rule. Idempotent: an existing
    /// `(label, keys)` rule is left untouched.
    pub fn define_rule(
        &self,
        txn: &mut heed::RwTxn,
        label: &str,
        keys: &[String],
        created_at: i64,
    ) -> Result<()> {
        let key = rule_key(label, keys)?;
        if self.storage.constraint_rules.get(txn, &key)?.is_some() {
            return Ok(());
        }

        let rule = ConstraintRule {
            label: label.to_string(),
            keys: keys.to_vec(),
            created_at,
            is_deleted: false,
        };
        self.storage.constraint_rules.put(txn, &key, &rule)?;
        Ok(())
    }

    /// Projects `data` onto `keys` and checks the tuple for uniqueness.
    ///
    /// Returns `Ok(true)` when the tuple is free (recording it for
    /// `stream_id` if `record` is set) and `Ok(false)` when it is held and
    /// `record` is unset. A held tuple with `record` set fails with
    /// [`Error::ConstraintViolation`] so the surrounding append aborts.
    pub fn evaluate(
        &self,
        txn: &mut heed::RwTxn,
        stream_id: &str,
        label: &str,
        keys: &[String],
        data: &Value,
        record: bool,
        created_at: i64,
    ) -> Result<bool> {
        let values = project(keys, data);
        if values.as_object().is_some_and(|m| m.is_empty()) {
            // None of the constrained fields are present: nothing to lock.
            return Ok(true);
        }

        let key = constraint_key(label, keys, &values)?;
        if let Some(existing) = self.storage.constraints.get(txn, &key)? {
            if !existing.is_deleted {
                if record {
                    return Err(Error::ConstraintViolation {
                        label: label.to_string(),
                        values,
                    });
                }
                return Ok(false);
            }
            // Tombstoned: the tuple was released and may be reclaimed.
        }

        if record {
            self.define_rule(txn, label, keys, created_at)?;
            let held = ConstraintRecord {
                stream_id: stream_id.to_string(),
                label: label.to_string(),
                keys: keys.to_vec(),
                values,
                created_at,
                is_deleted: false,
            };
            self.storage.constraints.put(txn, &key, &held)?;
        }

        Ok(true)
    }

    /// Tombstones every constraint record owned by `stream_id`, freeing its
    /// tuples for reuse. Returns the number of released records.
    pub fn release(&self, txn: &mut heed::RwTxn, stream_id: &str) -> Result<usize> {
        let mut owned = Vec::new();
        {
            let mut iter = self.storage.constraints.iter(txn)?;
            while let Some((key, record)) = iter.next().transpose()? {
                if record.stream_id == stream_id && !record.is_deleted {
                    owned.push((key.to_vec(), record));
                }
            }
        }

        let released = owned.len();
        for (key, mut record) in owned {
            record.is_deleted = true;
            self.storage.constraints.put(txn, &key, &record)?;
        }

        Ok(released)
    }
}

/// Projects the event data onto the rule's key paths. Keys that are absent
/// or unresolvable in the document are left out of the projection.
fn project(keys: &[String], data: &Value) -> Value {
    let mut values = serde_json::Map::new();
    for key in keys {
        if let Ok(Some(value)) = FieldPath::parse(key).lookup(data) {
            values.insert(key.clone(), value.clone());
        }
    }
    Value::Object(values)
}
