// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

//! The single-open store handle: the event journal and snapshot store
//! append paths, stream deletion, and constraint rule administration.

use std::path::Path;

use heed::PutFlags;
use serde_json::Value;

use crate::constraint::ConstraintEngine;
use crate::error::{Error, Result};
use crate::hooks::{self, AppendContext, WriteHook};
use crate::keys::KeyRegistry;
use crate::model::{AppendEvent, EventRecord, SnapshotRecord};
use crate::storage::{stream_key, stream_prefix, Storage, StorageConfig};
use crate::timed_dbg;
use crate::view::ViewReader;

/// A single-open event store handle.
///
/// - **Writes** require `&mut self` (single-writer by construction; no locks).
/// - Use [`Vault::reader`] to get a cheap, cloneable reader view for
///   concurrent decrypting reads on other threads.
///
/// Every append runs in one LMDB write transaction: sequence validation, the
/// pre-commit hook chain (constraint gate, then key lookup/creation and field
/// encryption) and the row insert commit or abort together.
pub struct Vault {
    storage: Storage,
    registry: KeyRegistry,
    constraints: ConstraintEngine,
    hooks: Vec<Box<dyn WriteHook + Send + Sync>>,
    next_ordering: u64,
    next_snapshot_ordering: u64,
}

impl Vault {
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        Self::open(StorageConfig {
            path: path.as_ref().to_path_buf(),
            ..Default::default()
        })
    }

    pub fn open(config: StorageConfig) -> Result<Self> {
        let storage = Storage::open(config)?;

        let (next_ordering, next_snapshot_ordering) = {
            let rtxn = storage.env.read_txn()?;
            let last_event = storage.events.last(&rtxn)?.map(|(k, _)| k).unwrap_or(0);

            // Snapshots are keyed by stream, so their ordering counter is
            // recovered by scanning the values.
            let mut last_snapshot = 0;
            let mut iter = storage.snapshots.iter(&rtxn)?;
            while let Some((_, snapshot)) = iter.next().transpose()? {
                last_snapshot = last_snapshot.max(snapshot.ordering);
            }
            drop(iter);

            (last_event + 1, last_snapshot + 1)
        };

        let hooks = hooks::default_chain(&storage);
        let registry = KeyRegistry::new(storage.clone());
        let constraints = ConstraintEngine::new(storage.clone());

        Ok(Self {
            storage,
            registry,
            constraints,
            hooks,
            next_ordering,
            next_snapshot_ordering,
        })
    }

    /// Creates a cheap, cloneable reader view suitable for concurrent reads
    /// across threads. This does **not** open another LMDB environment.
    pub fn reader(&self) -> ViewReader {
        ViewReader::new(self.storage.clone())
    }

    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Appends one event to its stream.
    ///
    /// `sequence_nr` must be the stream's next expected value (1 for a new
    /// stream). The row insert is the only externally observable effect; key
    /// creation, constraint records and the encrypted payload commit with it
    /// or not at all. Returns the assigned global ordering.
    pub fn append_event(&mut self, event: AppendEvent) -> Result<u64> {
        validate_stream_id(&event.stream_id)?;
        let AppendEvent {
            stream_id,
            sequence_nr,
            created_at,
            mut data,
            metadata,
            annotations,
            tags,
        } = event;

        let mut wtxn = self.storage.env.write_txn()?;

        let head = self.storage.stream_heads.get(&wtxn, &stream_id)?;
        let expected = head.map_or(1, |h| h + 1);
        if sequence_nr != expected {
            // A sequence at or below the head lost a race with a concurrent
            // writer and is retryable; anything past the expected value is a
            // caller ordering bug.
            if head.is_some_and(|h| sequence_nr <= h) {
                return Err(Error::SequenceConflict {
                    stream_id,
                    sequence_nr,
                });
            }
            return Err(Error::OutOfOrderSequence {
                stream_id,
                expected,
                actual: sequence_nr,
            });
        }

        {
            let mut ctx = AppendContext {
                stream_id: &stream_id,
                sequence_nr,
                is_first: sequence_nr == 1,
                created_at,
                data: &mut data,
                annotations: &annotations,
            };
            for hook in &self.hooks {
                timed_dbg!(hook.name(), hook.run(&mut wtxn, &mut ctx))?;
            }
        }

        let ordering = self.next_ordering;
        let record = EventRecord {
            ordering,
            stream_id: stream_id.clone(),
            sequence_nr,
            created_at,
            data,
            metadata,
            annotations,
            is_deleted: false,
            tags,
        };

        timed_dbg!("put", {
            self.storage.events.put_with_flags(
                &mut wtxn,
                PutFlags::NO_OVERWRITE,
                &ordering,
                &record,
            )?;
            self.storage
                .stream_index
                .put(&mut wtxn, &stream_key(&stream_id, sequence_nr), &ordering)?;
            self.storage
                .stream_heads
                .put(&mut wtxn, &stream_id, &sequence_nr)
        })?;

        timed_dbg!("commit", wtxn.commit())?;

        self.next_ordering = ordering + 1;
        Ok(ordering)
    }

    /// Writes the materialized state at `(stream_id, sequence_nr)`.
    ///
    /// The co-keyed event must already exist: its annotations drive the same
    /// field encryption the journal applied, and the stream's key must have
    /// been created by that event's append. Never creates a key. Returns the
    /// snapshot's ordering.
    pub fn write_snapshot(
        &mut self,
        stream_id: &str,
        sequence_nr: u64,
        mut data: Value,
        created_at: i64,
    ) -> Result<u64> {
        validate_stream_id(stream_id)?;

        let mut wtxn = self.storage.env.write_txn()?;
        let key_bytes = stream_key(stream_id, sequence_nr);

        let source = self
            .storage
            .stream_index
            .get(&wtxn, &key_bytes)?
            .map(|ordering| self.storage.events.get(&wtxn, &ordering))
            .transpose()?
            .flatten()
            .ok_or_else(|| Error::MissingSourceEvent {
                stream_id: stream_id.to_string(),
                sequence_nr,
            })?;

        let key_record = self
            .registry
            .get(&wtxn, stream_id)?
            .ok_or_else(|| Error::KeyNotFound(stream_id.to_string()))?;

        crate::cipher::encrypt_document(
            &mut data,
            &source.annotations,
            &key_record.encryption_key,
            key_record.is_deleted,
        )?;

        let ordering = self.next_snapshot_ordering;
        let record = SnapshotRecord {
            ordering,
            stream_id: stream_id.to_string(),
            sequence_nr,
            created_at,
            data,
            is_deleted: false,
        };
        self.storage.snapshots.put(&mut wtxn, &key_bytes, &record)?;
        wtxn.commit()?;

        self.next_snapshot_ordering = ordering + 1;
        Ok(ordering)
    }

    /// Soft-deletes a stream in one transaction: tombstones its key record,
    /// its journal and snapshot rows, and releases every constraint it owns.
    ///
    /// The key material is not erased; from here on the read view returns the
    /// stored ciphertext verbatim (crypto-erasure).
    pub fn mark_stream_deleted(&mut self, stream_id: &str, deleted_at: i64) -> Result<()> {
        validate_stream_id(stream_id)?;

        let mut wtxn = self.storage.env.write_txn()?;

        self.registry.mark_deleted(&mut wtxn, stream_id, deleted_at)?;

        let prefix = stream_prefix(stream_id);

        let orderings = {
            let mut orderings = Vec::new();
            let mut iter = self.storage.stream_index.prefix_iter(&wtxn, &prefix)?;
            while let Some((_, ordering)) = iter.next().transpose()? {
                orderings.push(ordering);
            }
            orderings
        };
        for ordering in orderings {
            if let Some(mut event) = self.storage.events.get(&wtxn, &ordering)? {
                event.is_deleted = true;
                self.storage.events.put(&mut wtxn, &ordering, &event)?;
            }
        }

        let snapshots = {
            let mut snapshots = Vec::new();
            let mut iter = self.storage.snapshots.prefix_iter(&wtxn, &prefix)?;
            while let Some((key, snapshot)) = iter.next().transpose()? {
                snapshots.push((key.to_vec(), snapshot));
            }
            snapshots
        };
        for (key, mut snapshot) in snapshots {
            snapshot.is_deleted = true;
            self.storage.snapshots.put(&mut wtxn, &key, &snapshot)?;
        }

        self.constraints.release(&mut wtxn, stream_id)?;

        wtxn.commit()?;
        Ok(())
    }

    /// Defines a reusable uniqueness rule. Idempotent.
    pub fn define_constraint_rule(
        &mut self,
        label: &str,
        keys: &[String],
        created_at: i64,
    ) -> Result<()> {
        let mut wtxn = self.storage.env.write_txn()?;
        self.constraints.define_rule(&mut wtxn, label, keys, created_at)?;
        wtxn.commit()?;
        Ok(())
    }

    /// Evaluates a uniqueness rule against `data` outside the append path.
    ///
    /// With `record` unset this is a pure check (`false` means the projected
    /// tuple is already held). With `record` set a free tuple is locked for
    /// `stream_id` and a held tuple fails with
    /// [`Error::ConstraintViolation`].
    pub fn evaluate_constraint(
        &mut self,
        stream_id: &str,
        label: &str,
        keys: &[String],
        data: &Value,
        record: bool,
        created_at: i64,
    ) -> Result<bool> {
        let mut wtxn = self.storage.env.write_txn()?;
        let outcome =
            self.constraints
                .evaluate(&mut wtxn, stream_id, label, keys, data, record, created_at)?;
        wtxn.commit()?;
        Ok(outcome)
    }
}

fn validate_stream_id(stream_id: &str) -> Result<()> {
    if stream_id.is_empty() || stream_id.as_bytes().contains(&crate::constants::STREAM_KEY_SEP) {
        return Err(Error::InvalidStreamId(stream_id.to_string()));
    }
    Ok(())
}
