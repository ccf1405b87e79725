//! One-way key fingerprints binding a destroyed key to its shred run
//!
//! ```text
//! fingerprint = SHA-256( "serase-key-fingerprint-v1"
//!                        || key (32)
//!                        || run_id (16)
//!                        || salt (16)
//!                        || len(target) (8, BE) || target
//!                        || original_size (8, BE) )
//! ```
//!
//! Captured once per key while it is still Consumed; after destruction
//! there is nothing left to fingerprint.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::chunk::RunSalt;
use crate::error::CryptoError;
use crate::keys::ConsumedKey;

const DOMAIN: &[u8] = b"serase-key-fingerprint-v1";

/// Run identity mixed into the fingerprint.
#[derive(Debug, Clone)]
pub struct RunMetadata {
    pub run_id: Uuid,
    pub salt: RunSalt,
    /// Canonical target path
    pub target: String,
    pub original_size: u64,
}

/// SHA-256 fingerprint of a one-time key, shown as 64 lowercase hex chars.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyFingerprint([u8; 32]);

impl KeyFingerprint {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        self.0.iter().map(|b| format!("{b:02x}")).collect()
    }

    /// Parse a 64-char hex string.
    pub fn from_hex(hex: &str) -> Option<Self> {
        if hex.len() != 64 || !hex.is_ascii() {
            return None;
        }
        let mut bytes = [0u8; 32];
        for (i, byte) in bytes.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&hex[i * 2..i * 2 + 2], 16).ok()?;
        }
        Some(Self(bytes))
    }
}

impl std::fmt::Display for KeyFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl std::fmt::Debug for KeyFingerprint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "KeyFingerprint({})", self.to_hex())
    }
}

impl Serialize for KeyFingerprint {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for KeyFingerprint {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        KeyFingerprint::from_hex(&s)
            .ok_or_else(|| serde::de::Error::custom("fingerprint must be 64 hex chars"))
    }
}

/// Fingerprint the consumed key together with its run identity.
///
/// Fails with `InvalidState` once the key is destroyed and with
/// `FingerprintAlreadyCaptured` on a second call for the same key.
pub fn capture_fingerprint(
    key: &ConsumedKey,
    meta: &RunMetadata,
) -> Result<KeyFingerprint, CryptoError> {
    let digest = key.with_key_for_fingerprint(|key_bytes| {
        let mut hasher = Sha256::new();
        hasher.update(DOMAIN);
        hasher.update(key_bytes);
        hasher.update(meta.run_id.as_bytes());
        hasher.update(meta.salt);
        hasher.update((meta.target.len() as u64).to_be_bytes());
        hasher.update(meta.target.as_bytes());
        hasher.update(meta.original_size.to_be_bytes());
        hasher.finalize()
    })?;

    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(&digest);
    tracing::debug!(key_id = %key.key_id(), run_id = %meta.run_id, "key fingerprint captured");
    Ok(KeyFingerprint(bytes))
}
