// This file is part of VaultLog.
//
// This Source Code Form is subject to the terms of the Mozilla Public License
// v. 2.0. If a copy of the MPL was not distributed with this file, You can
// obtain one at http://mozilla.org/MPL/2.0/.

pub const EVENTS_DB_NAME: &str = "events";
pub const STREAM_INDEX_DB_NAME: &str = "stream_index";
pub const STREAM_HEADS_DB_NAME: &str = "stream_heads";
pub const SNAPSHOTS_DB_NAME: &str = "snapshots";
pub const KEYSTORE_DB_NAME: &str = "keystore";
pub const CONSTRAINT_RULES_DB_NAME: &str = "constraint_rules";
pub const CONSTRAINTS_DB_NAME: &str = "constraints";

pub const DEFAULT_MAP_SIZE: usize = 10 * 1024 * 1024; // 10 MB
pub const DEFAULT_MAX_DBS: u32 = 10;

/// AES-256 key material size in bytes.
pub const KEY_SIZE: usize = 32;
/// AES-GCM nonce size in bytes.
pub const NONCE_SIZE: usize = 12;
/// Salt size for the salted `md5` selector.
pub const MD5_SALT_SIZE: usize = 8;

/// Separator between the stream id and the sequence number in composite keys.
/// Stream ids are rejected if they contain this byte.
pub const STREAM_KEY_SEP: u8 = 0x00;
