use crate::constants;
use crate::error::Result;
use crate::model::{ConstraintRecord, ConstraintRule, EncryptionKeyRecord, EventRecord, SnapshotRecord};
use heed::{types::*, Database, Env, EnvOpenOptions};
use std::path::PathBuf;

// Type aliases for readability
pub type EventsDb = Database<U64<heed::byteorder::BE>, SerdeJson<EventRecord>>;
pub type StreamIndexDb = Database<Bytes, U64<heed::byteorder::BE>>;
pub type StreamHeadsDb = Database<Str, U64<heed::byteorder::BE>>;
pub type SnapshotsDb = Database<Bytes, SerdeJson<SnapshotRecord>>;
pub type KeyStoreDb = Database<Str, SerdeJson<EncryptionKeyRecord>>;
pub type ConstraintRulesDb = Database<Bytes, SerdeJson<ConstraintRule>>;
pub type ConstraintsDb = Database<Bytes, SerdeJson<ConstraintRecord>>;

/// Composite `(stream_id, sequence_nr)` key for the stream index and the
/// snapshot store. The stream id is NUL-terminated so prefix scans of one
/// stream never bleed into another.
pub fn stream_key(stream_id: &str, sequence_nr: u64) -> Vec<u8> {
    let mut buf = Vec::with_capacity(stream_id.len() + 1 + 8);
    buf.extend_from_slice(stream_id.as_bytes());
    buf.push(constants::STREAM_KEY_SEP);
    buf.extend_from_slice(&sequence_nr.to_be_bytes());
    buf
}

/// Prefix matching every composite key of one stream.
pub fn stream_prefix(stream_id: &str) -> Vec<u8> {
    let mut buf = Vec::with_capacity(stream_id.len() + 1);
    buf.extend_from_slice(stream_id.as_bytes());
    buf.push(constants::STREAM_KEY_SEP);
    buf
}

/// Canonical key for a constraint rule: compact JSON of `(label, keys)`.
pub fn rule_key(label: &str, keys: &[String]) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&(label, keys))?)
}

/// Canonical key for a constraint record: compact JSON of
/// `(label, keys, values)`. `serde_json` maps are ordered by key, so equal
/// projections always encode identically.
pub fn constraint_key(label: &str, keys: &[String], values: &serde_json::Value) -> Result<Vec<u8>> {
    Ok(serde_json::to_vec(&(label, keys, values))?)
}

/// Configuration for opening a VaultLog storage environment.
#[derive(Clone)]
pub struct StorageConfig {
    pub path: PathBuf,
    pub map_size: usize,
    pub max_dbs: u32,
    pub create_dir: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("vaultlog.mdb"),
            map_size: constants::DEFAULT_MAP_SIZE,
            max_dbs: constants::DEFAULT_MAX_DBS,
            create_dir: true,
        }
    }
}

#[derive(Clone)]
pub struct Storage {
    pub env: Env,
    // Buckets
    pub events: EventsDb,
    pub stream_index: StreamIndexDb, // Key: stream id + NUL + seq (BE)
    pub stream_heads: StreamHeadsDb, // stream id -> max sequence_nr
    pub snapshots: SnapshotsDb,
    pub keystore: KeyStoreDb,
    pub constraint_rules: ConstraintRulesDb,
    pub constraints: ConstraintsDb,
}

impl Storage {
    pub fn open(config: StorageConfig) -> Result<Self> {
        if config.create_dir {
            std::fs::create_dir_all(&config.path)?;
        }

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(config.map_size)
                .max_dbs(config.max_dbs)
                .open(&config.path)?
        };

        let mut txn = env.write_txn()?;
        let events = env.create_database(&mut txn, Some(constants::EVENTS_DB_NAME))?;
        let stream_index = env.create_database(&mut txn, Some(constants::STREAM_INDEX_DB_NAME))?;
        let stream_heads = env.create_database(&mut txn, Some(constants::STREAM_HEADS_DB_NAME))?;
        let snapshots = env.create_database(&mut txn, Some(constants::SNAPSHOTS_DB_NAME))?;
        let keystore = env.create_database(&mut txn, Some(constants::KEYSTORE_DB_NAME))?;
        let constraint_rules =
            env.create_database(&mut txn, Some(constants::CONSTRAINT_RULES_DB_NAME))?;
        let constraints = env.create_database(&mut txn, Some(constants::CONSTRAINTS_DB_NAME))?;
        txn.commit()?;

        Ok(Self {
            env,
            events,
            stream_index,
            stream_heads,
            snapshots,
            keystore,
            constraint_rules,
            constraints,
        })
    }
}
