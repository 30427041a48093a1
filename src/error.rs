// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

use thiserror::Error;

/// Custom error type for VaultLog operations.
#[derive(Error, Debug)]
pub enum Error {
    /// IO error occurred (e.g., file system issues).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// LMDB storage error (via `heed`).
    #[error("LMDB error: {0}")]
    Heed(#[from] heed::Error),

    /// JSON (de)serialization failed.
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Named database missing from the environment.
    #[error("Database not found: {0}")]
    DatabaseNotFound(String),

    /// Stream id is empty or contains a NUL byte.
    #[error("Invalid stream id: {0:?}")]
    InvalidStreamId(String),

    /// Caller supplied a sequence number that is not the stream's next
    /// expected value. Retryable after re-reading the stream head.
    #[error("Out of order sequence for stream {stream_id}: expected {expected}, got {actual}")]
    OutOfOrderSequence {
        stream_id: String,
        expected: u64,
        actual: u64,
    },

    /// A concurrent writer already appended this `(stream_id, sequence_nr)`.
    /// Retryable by the loser after re-reading the current head.
    #[error("Sequence conflict: stream {stream_id} sequence {sequence_nr} already exists")]
    SequenceConflict { stream_id: String, sequence_nr: u64 },

    /// No encryption key record exists for the stream. On the write path this
    /// indicates corrupted append ordering and is fatal.
    #[error("Key not found for stream {0}")]
    KeyNotFound(String),

    /// A field-level encrypt/decrypt operation failed for one dotted path.
    /// Write-path policy: the whole write is rejected.
    #[error("Field cipher error at {path:?}: {reason}")]
    FieldCipher { path: String, reason: String },

    /// A uniqueness rule already holds the projected values.
    #[error("Constraint violation for rule {label:?}: values {values} already constrained")]
    ConstraintViolation {
        label: String,
        values: serde_json::Value,
    },

    /// Snapshot written for a `(stream_id, sequence_nr)` with no source event.
    #[error("Missing source event for snapshot {stream_id}/{sequence_nr}")]
    MissingSourceEvent { stream_id: String, sequence_nr: u64 },
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub(crate) fn field_cipher(path: &str, reason: impl std::fmt::Display) -> Self {
        Self::FieldCipher {
            path: path.to_string(),
            reason: reason.to_string(),
        }
    }
}
