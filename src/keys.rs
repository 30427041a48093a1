// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

//! The per-stream encryption key registry.
//!
//! One [`EncryptionKeyRecord`] per stream, created exactly once by the
//! journal append path on the stream's first event. Tombstoning flips
//! `is_deleted` without erasing the key material: crypto-erasure is a
//! read-policy decision, and an undelete stays possible.

use rand::RngCore;

use crate::constants::KEY_SIZE;
use crate::error::{Error, Result};
use crate::model::EncryptionKeyRecord;
use crate::storage::Storage;

/// Manages encryption key records for streams.
///
/// All methods operate inside a caller-provided transaction so key creation
/// commits or aborts atomically with the append it belongs to.
pub struct KeyRegistry {
    storage: Storage,
}

impl KeyRegistry {
    pub fn new(storage: Storage) -> Self {
        Self { storage }
    }

    /// Returns the stream's key record, creating it when `is_first` is set.
    ///
    /// A first-event call that finds an existing record returns it instead of
    /// failing: a racing writer for the same first event must re-read the
    /// winner's key, not abort the append. A non-first call that finds no
    /// record fails with [`Error::KeyNotFound`] — the append order was
    /// violated upstream.
    pub fn ensure_key(
        &self,
        txn: &mut heed::RwTxn,
        stream_id: &str,
        is_first: bool,
        created_at: i64,
    ) -> Result<EncryptionKeyRecord> {
        if let Some(record) = self.storage.keystore.get(txn, stream_id)? {
            return Ok(record);
        }

        if !is_first {
            return Err(Error::KeyNotFound(stream_id.to_string()));
        }

        let mut encryption_key = [0u8; KEY_SIZE];
        rand::thread_rng().fill_bytes(&mut encryption_key);

        let record = EncryptionKeyRecord {
            stream_id: stream_id.to_string(),
            encryption_key,
            created_at,
            deleted_at: None,
            is_deleted: false,
            tags: Vec::new(),
        };
        self.storage.keystore.put(txn, stream_id, &record)?;
        Ok(record)
    }

    /// Looks up a stream's key record without creating one.
    pub fn get(
        &self,
        txn: &heed::RoTxn<'_>,
        stream_id: &str,
    ) -> Result<Option<EncryptionKeyRecord>> {
        Ok(self.storage.keystore.get(txn, stream_id)?)
    }

    /// Tombstones the stream's key record. The key material stays in place.
    ///
    /// Fails with [`Error::KeyNotFound`] when the stream never had a key
    /// (no event was ever appended for it).
    pub fn mark_deleted(
        &self,
        txn: &mut heed::RwTxn,
        stream_id: &str,
        deleted_at: i64,
    ) -> Result<()> {
        let mut record = self
            .storage
            .keystore
            .get(txn, stream_id)?
            .ok_or_else(|| Error::KeyNotFound(stream_id.to_string()))?;

        record.is_deleted = true;
        record.deleted_at = Some(deleted_at);
        self.storage.keystore.put(txn, stream_id, &record)?;
        Ok(())
    }
}
