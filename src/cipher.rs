//! The field cipher policy engine.
//!
//! Given a JSON document, the `encrypt` annotation map and a stream key, this
//! module transforms annotated fields in place. Reversible fields (`aes`) are
//! AES-256-GCM sealed and restored on read; irreversible fields (digests and
//! adaptive hashes) are one-way and their decrypt is a deliberate no-op.
//!
//! Once a stream is tombstoned both directions are no-ops over the whole
//! document: the stored ciphertext is returned verbatim (crypto-erasure).

use aes_gcm::{
    aead::{Aead, KeyInit, Payload},
    Aes256Gcm, Key, Nonce,
};
use hmac::{Hmac, Mac};
use md5::Md5;
use rand::RngCore;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::constants::{KEY_SIZE, MD5_SALT_SIZE, NONCE_SIZE};
use crate::error::{Error, Result};
use crate::model::Annotations;
use crate::path::FieldPath;

type HmacSha256 = Hmac<Sha256>;

/// A field algorithm selector with a total mapping from annotation strings.
///
/// Unknown or absent selector values map to [`Algorithm::Aes`] explicitly;
/// there is no silent fall-through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Algorithm {
    /// Symmetric authenticated encryption keyed by the stream key. Reversible.
    Aes,
    /// One-way unkeyed digest.
    Sha256,
    /// One-way keyed digest using the stream key.
    Hmac,
    /// Adaptive salted hash at the given work factor.
    Bcrypt { cost: u32 },
    /// Salted one-way hash.
    Md5,
}

impl Algorithm {
    pub fn from_selector(selector: &str) -> Self {
        match selector {
            "sha256" => Self::Sha256,
            "hmac" => Self::Hmac,
            "bcrypt" => Self::Bcrypt { cost: 5 },
            "bcrypt6" => Self::Bcrypt { cost: 6 },
            "bcrypt7" => Self::Bcrypt { cost: 7 },
            "bcrypt8" => Self::Bcrypt { cost: 8 },
            "md5" => Self::Md5,
            _ => Self::Aes,
        }
    }

    pub fn is_reversible(&self) -> bool {
        matches!(self, Self::Aes)
    }
}

/// Encrypts every annotated field of `data` in place.
///
/// Paths absent from the document are skipped; a traversal type mismatch or
/// a cipher failure rejects the whole document (write-path policy: never
/// persist partial plaintext).
pub fn encrypt_document(
    data: &mut Value,
    annotations: &Annotations,
    key: &[u8; KEY_SIZE],
    is_deleted: bool,
) -> Result<()> {
    if is_deleted {
        return Ok(());
    }

    for (raw_path, selector) in &annotations.encrypt {
        let algorithm = Algorithm::from_selector(selector);
        let path = FieldPath::parse(raw_path);
        let Some(value) = path
            .lookup_mut(data)
            .map_err(|e| Error::field_cipher(raw_path, e))?
        else {
            continue;
        };
        encrypt_field(raw_path, value, algorithm, key)?;
    }

    Ok(())
}

/// Decrypts every reversible annotated field of `data` in place.
///
/// Irreversible selectors are left as stored: callers must not assume a
/// round-trip for those. When the stream is tombstoned the document is
/// returned unchanged regardless of selector.
pub fn decrypt_document(
    data: &mut Value,
    annotations: &Annotations,
    key: &[u8; KEY_SIZE],
    is_deleted: bool,
) -> Result<()> {
    if is_deleted {
        return Ok(());
    }

    for (raw_path, selector) in &annotations.encrypt {
        let algorithm = Algorithm::from_selector(selector);
        if !algorithm.is_reversible() {
            continue;
        }
        let path = FieldPath::parse(raw_path);
        let Some(value) = path
            .lookup_mut(data)
            .map_err(|e| Error::field_cipher(raw_path, e))?
        else {
            continue;
        };
        decrypt_field(raw_path, value, key)?;
    }

    Ok(())
}

fn encrypt_field(
    raw_path: &str,
    value: &mut Value,
    algorithm: Algorithm,
    key: &[u8; KEY_SIZE],
) -> Result<()> {
    let replacement = match algorithm {
        Algorithm::Aes => {
            // Compact JSON as plaintext so every value type round-trips
            // exactly; the dotted path is bound in as AAD.
            let plaintext = serde_json::to_vec(&*value)?;
            let sealed = aes_seal(key, &plaintext, raw_path.as_bytes())
                .map_err(|reason| Error::field_cipher(raw_path, reason))?;
            hex::encode(sealed)
        }
        Algorithm::Sha256 => hex::encode(Sha256::digest(text_form(value).as_bytes())),
        Algorithm::Hmac => {
            let mut mac = <HmacSha256 as Mac>::new_from_slice(key)
                .map_err(|e| Error::field_cipher(raw_path, e))?;
            mac.update(text_form(value).as_bytes());
            hex::encode(mac.finalize().into_bytes())
        }
        Algorithm::Bcrypt { cost } => bcrypt::hash(text_form(value), cost)
            .map_err(|e| Error::field_cipher(raw_path, e))?,
        Algorithm::Md5 => {
            let mut salt = [0u8; MD5_SALT_SIZE];
            rand::thread_rng().fill_bytes(&mut salt);
            let mut hasher = Md5::new();
            hasher.update(salt);
            hasher.update(text_form(value).as_bytes());
            format!("{}${}", hex::encode(salt), hex::encode(hasher.finalize()))
        }
    };

    *value = Value::String(replacement);
    Ok(())
}

fn decrypt_field(raw_path: &str, value: &mut Value, key: &[u8; KEY_SIZE]) -> Result<()> {
    let Value::String(stored) = &*value else {
        return Err(Error::field_cipher(raw_path, "ciphertext is not a string"));
    };

    let sealed =
        hex::decode(stored).map_err(|e| Error::field_cipher(raw_path, e))?;
    let plaintext = aes_open(key, &sealed, raw_path.as_bytes())
        .map_err(|reason| Error::field_cipher(raw_path, reason))?;
    *value = serde_json::from_slice(&plaintext)
        .map_err(|e| Error::field_cipher(raw_path, e))?;
    Ok(())
}

/// The text form a one-way selector hashes: string values as-is, everything
/// else as compact JSON.
fn text_form(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Seals plaintext with AES-256-GCM. Returns the 12-byte nonce followed by
/// the ciphertext.
fn aes_seal(key: &[u8; KEY_SIZE], plaintext: &[u8], aad: &[u8]) -> std::result::Result<Vec<u8>, String> {
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    rand::thread_rng().fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let payload = Payload {
        msg: plaintext,
        aad,
    };

    let mut ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| format!("encryption failed: {e}"))?;

    let mut sealed = nonce_bytes.to_vec();
    sealed.append(&mut ciphertext);
    Ok(sealed)
}

/// Opens a sealed AES-256-GCM payload. Expects the input to start with the
/// 12-byte nonce.
fn aes_open(key: &[u8; KEY_SIZE], sealed: &[u8], aad: &[u8]) -> std::result::Result<Vec<u8>, String> {
    if sealed.len() < NONCE_SIZE {
        return Err(format!(
            "sealed payload too short: expected at least {NONCE_SIZE} bytes, got {}",
            sealed.len()
        ));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_SIZE);
    let cipher = Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key));
    let nonce = Nonce::from_slice(nonce_bytes);

    let payload = Payload {
        msg: ciphertext,
        aad,
    };

    cipher
        .decrypt(nonce, payload)
        .map_err(|e| format!("decryption failed: {e}"))
}
