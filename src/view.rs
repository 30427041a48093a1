//! The decrypting read view composer.
//!
//! Stored rows are joined with the key registry and run through the cipher
//! policy engine in reverse. A row whose stream has no key record never went
//! through an encrypting append and is surfaced as-is (plaintext
//! pass-through); a row whose stream is tombstoned is surfaced as stored
//! (crypto-erasure). Snapshot rows additionally join metadata, annotations
//! and tags from their co-keyed event.

use std::collections::BTreeMap;

use crate::cipher;
use crate::error::Result;
use crate::model::{Annotations, EncryptionKeyRecord, EventRecord, SnapshotRecord, SnapshotView};
use crate::storage::{stream_key, stream_prefix, Storage};

/// A cheap, cloneable reader view that can be sent to other threads.
///
/// Internally this is just another handle to the same LMDB environment; all
/// reads are pure and take short-lived read transactions.
#[derive(Clone)]
pub struct ViewReader {
    storage: Storage,
}

impl ViewReader {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Reads one stream's events in global ordering order, with reversible
    /// fields restored to plaintext.
    pub fn read_event_view(&self, stream_id: &str) -> Result<Vec<EventRecord>> {
        let rtxn = self.storage.env.read_txn()?;

        let key_record = self.storage.keystore.get(&rtxn, stream_id)?;

        let mut events = Vec::new();
        let prefix = stream_prefix(stream_id);
        let mut orderings = Vec::new();
        {
            let mut iter = self.storage.stream_index.prefix_iter(&rtxn, &prefix)?;
            while let Some((_, ordering)) = iter.next().transpose()? {
                orderings.push(ordering);
            }
        }
        orderings.sort_unstable();

        for ordering in orderings {
            let Some(mut event) = self.storage.events.get(&rtxn, &ordering)? else {
                continue;
            };
            decrypt_row(&mut event.data, &event.annotations, key_record.as_ref())?;
            events.push(event);
        }

        Ok(events)
    }

    /// Reads the whole journal across streams in total ordering order, with
    /// the same per-stream decryption rules as [`read_event_view`].
    ///
    /// [`read_event_view`]: Self::read_event_view
    pub fn read_journal(&self) -> Result<Vec<EventRecord>> {
        let rtxn = self.storage.env.read_txn()?;

        let mut key_records: BTreeMap<String, Option<EncryptionKeyRecord>> = BTreeMap::new();
        let mut events = Vec::new();
        {
            let mut iter = self.storage.events.iter(&rtxn)?;
            while let Some((_, event)) = iter.next().transpose()? {
                events.push(event);
            }
        }

        for event in &mut events {
            let key_record = match key_records.get(&event.stream_id) {
                Some(cached) => cached.clone(),
                None => {
                    let fetched = self.storage.keystore.get(&rtxn, &event.stream_id)?;
                    key_records.insert(event.stream_id.clone(), fetched.clone());
                    fetched
                }
            };
            decrypt_row(&mut event.data, &event.annotations, key_record.as_ref())?;
        }

        Ok(events)
    }

    /// Reads one stream's snapshots in snapshot ordering order, joined with
    /// each source event's metadata, annotations and tags (empty when the
    /// event row is gone) and decrypted with the event's annotations.
    pub fn read_snapshot_view(&self, stream_id: &str) -> Result<Vec<SnapshotView>> {
        let rtxn = self.storage.env.read_txn()?;

        let key_record = self.storage.keystore.get(&rtxn, stream_id)?;

        let mut snapshots = Vec::new();
        {
            let prefix = stream_prefix(stream_id);
            let mut iter = self.storage.snapshots.prefix_iter(&rtxn, &prefix)?;
            while let Some((_, snapshot)) = iter.next().transpose()? {
                snapshots.push(snapshot);
            }
        }
        snapshots.sort_unstable_by_key(|s| s.ordering);

        let mut views = Vec::new();
        for snapshot in snapshots {
            let source = self
                .storage
                .stream_index
                .get(&rtxn, &stream_key(stream_id, snapshot.sequence_nr))?
                .map(|ordering| self.storage.events.get(&rtxn, &ordering))
                .transpose()?
                .flatten();

            let (metadata, annotations, tags) = match source {
                Some(event) => (event.metadata, event.annotations, event.tags),
                None => (
                    serde_json::Value::Object(serde_json::Map::new()),
                    Annotations::default(),
                    Vec::new(),
                ),
            };

            let SnapshotRecord {
                ordering,
                stream_id,
                sequence_nr,
                created_at,
                mut data,
                is_deleted,
            } = snapshot;

            decrypt_row(&mut data, &annotations, key_record.as_ref())?;

            views.push(SnapshotView {
                ordering,
                stream_id,
                sequence_nr,
                created_at,
                data,
                metadata,
                annotations,
                tags,
                is_deleted,
            });
        }

        Ok(views)
    }

    /// Reads one stored journal row without decryption.
    pub fn raw_event(&self, stream_id: &str, sequence_nr: u64) -> Result<Option<EventRecord>> {
        let rtxn = self.storage.env.read_txn()?;
        let event = self
            .storage
            .stream_index
            .get(&rtxn, &stream_key(stream_id, sequence_nr))?
            .map(|ordering| self.storage.events.get(&rtxn, &ordering))
            .transpose()?
            .flatten();
        Ok(event)
    }

    /// Reads one stored snapshot row without decryption.
    pub fn raw_snapshot(
        &self,
        stream_id: &str,
        sequence_nr: u64,
    ) -> Result<Option<SnapshotRecord>> {
        let rtxn = self.storage.env.read_txn()?;
        Ok(self
            .storage
            .snapshots
            .get(&rtxn, &stream_key(stream_id, sequence_nr))?)
    }
}

fn decrypt_row(
    data: &mut serde_json::Value,
    annotations: &Annotations,
    key_record: Option<&EncryptionKeyRecord>,
) -> Result<()> {
    match key_record {
        Some(record) => cipher::decrypt_document(
            data,
            annotations,
            &record.encryption_key,
            record.is_deleted,
        ),
        // No key record: the row never went through an encrypting append.
        None => Ok(()),
    }
}
