// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

//! The pre-commit hook chain of the journal write path.
//!
//! Hooks run in order inside the same write transaction as the row insert,
//! before it; any hook failure aborts the whole transaction. The default
//! chain is the constraint gate (over plaintext data) followed by field
//! encryption.

use serde_json::Value;

use crate::cipher;
use crate::constraint::ConstraintEngine;
use crate::error::Result;
use crate::keys::KeyRegistry;
use crate::model::Annotations;
use crate::storage::Storage;

/// The mutable state of one append as it moves through the hook chain.
pub struct AppendContext<'a> {
    pub stream_id: &'a str,
    pub sequence_nr: u64,
    /// Whether this is the stream's first event (`sequence_nr == 1`).
    pub is_first: bool,
    pub created_at: i64,
    /// The payload; hooks may transform it in place.
    pub data: &'a mut Value,
    pub annotations: &'a Annotations,
}

/// A step of the pre-commit chain.
///
/// Implementations must be side-effect-free outside the transaction: every
/// write they perform goes through `txn` so a later failure rolls the whole
/// append back.
pub trait WriteHook {
    fn name(&self) -> &'static str;

    fn run(&self, txn: &mut heed::RwTxn, ctx: &mut AppendContext<'_>) -> Result<()>;
}

/// Enforces every `(label, keys)` rule named by the event's `constraint`
/// annotations, recording the projected tuples for the writing stream.
///
/// Runs before encryption so projections see plaintext values.
pub struct ConstraintGate {
    engine: ConstraintEngine,
}

impl ConstraintGate {
    pub fn new(storage: Storage) -> Self {
        Self {
            engine: ConstraintEngine::new(storage),
        }
    }
}

impl WriteHook for ConstraintGate {
    fn name(&self) -> &'static str {
        "constraint_gate"
    }

    fn run(&self, txn: &mut heed::RwTxn, ctx: &mut AppendContext<'_>) -> Result<()> {
        for (label, keys) in &ctx.annotations.constraint {
            self.engine.evaluate(
                txn,
                ctx.stream_id,
                label,
                keys,
                ctx.data,
                true,
                ctx.created_at,
            )?;
        }
        Ok(())
    }
}

/// Ensures the stream's encryption key exists (creating it on the first
/// event) and encrypts annotated payload fields in place.
pub struct FieldEncryption {
    registry: KeyRegistry,
}

impl FieldEncryption {
    pub fn new(storage: Storage) -> Self {
        Self {
            registry: KeyRegistry::new(storage),
        }
    }
}

impl WriteHook for FieldEncryption {
    fn name(&self) -> &'static str {
        "field_encryption"
    }

    fn run(&self, txn: &mut heed::RwTxn, ctx: &mut AppendContext<'_>) -> Result<()> {
        let key_record =
            self.registry
                .ensure_key(txn, ctx.stream_id, ctx.is_first, ctx.created_at)?;
        cipher::encrypt_document(
            ctx.data,
            ctx.annotations,
            &key_record.encryption_key,
            key_record.is_deleted,
        )
    }
}

/// The default chain: constraint gate first, field encryption second.
pub fn default_chain(storage: &Storage) -> Vec<Box<dyn WriteHook + Send + Sync>> {
    vec![
        Box::new(ConstraintGate::new(storage.clone())),
        Box::new(FieldEncryption::new(storage.clone())),
    ]
}
