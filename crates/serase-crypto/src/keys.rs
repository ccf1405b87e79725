//! One-time key lifecycle: generate → consume → destroy
//!
//! Each shred run owns exactly one `KeyLifecycle`. The key bytes live in a
//! single storage cell shared (never copied) between the lifecycle and the
//! `ConsumedKey` handle it hands out. Destroying through the handle zeroizes
//! that cell, so every holder observes the destruction at once.
//!
//! Dropping either the lifecycle or the handle destroys the key if nobody did
//! so explicitly, which covers early returns and panics in the shred pipeline.

use chrono::{DateTime, Utc};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::KEY_SIZE;

/// Usage state of a one-time key. Transitions are linear.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeyState {
    Fresh,
    Consumed,
    Destroyed,
}

impl std::fmt::Display for KeyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyState::Fresh => write!(f, "fresh"),
            KeyState::Consumed => write!(f, "consumed"),
            KeyState::Destroyed => write!(f, "destroyed"),
        }
    }
}

struct KeySlot {
    bytes: [u8; KEY_SIZE],
    state: KeyState,
    /// Highest chunk index sealed so far; chunks are sealed in index order
    last_index: Option<u64>,
    fingerprinted: bool,
}

impl KeySlot {
    fn wipe(&mut self) {
        self.bytes.zeroize();
        self.state = KeyState::Destroyed;
    }
}

impl Drop for KeySlot {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Lock the slot even if a previous holder panicked; wiping must still work.
fn lock(slot: &Mutex<KeySlot>) -> MutexGuard<'_, KeySlot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner of a single one-time key for the duration of one shred run.
pub struct KeyLifecycle {
    id: Uuid,
    created_at: DateTime<Utc>,
    slot: Arc<Mutex<KeySlot>>,
}

impl KeyLifecycle {
    /// Generate a Fresh 256-bit key from the OS RNG.
    ///
    /// The key bytes are written directly into the shared slot, so no other
    /// copy of the material ever exists.
    pub fn generate() -> Self {
        let slot = Arc::new(Mutex::new(KeySlot {
            bytes: [0u8; KEY_SIZE],
            state: KeyState::Fresh,
            last_index: None,
            fingerprinted: false,
        }));
        OsRng.fill_bytes(&mut lock(&slot).bytes);

        let id = Uuid::new_v4();
        tracing::debug!(key_id = %id, "one-time key generated");
        Self {
            id,
            created_at: Utc::now(),
            slot,
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn state(&self) -> KeyState {
        lock(&self.slot).state
    }

    /// Transition Fresh → Consumed and hand out the only usable handle.
    pub fn consume(&mut self) -> Result<ConsumedKey, CryptoError> {
        let mut slot = lock(&self.slot);
        if slot.state != KeyState::Fresh {
            return Err(CryptoError::InvalidState {
                expected: KeyState::Fresh,
                found: slot.state,
            });
        }
        slot.state = KeyState::Consumed;
        drop(slot);

        tracing::debug!(key_id = %self.id, "one-time key consumed");
        Ok(ConsumedKey {
            key_id: self.id,
            slot: Arc::clone(&self.slot),
        })
    }

    /// Zeroize the key and transition Consumed → Destroyed.
    ///
    /// A second call fails with `AlreadyDestroyed` and leaves the state as is.
    pub fn destroy(&self, handle: &ConsumedKey) -> Result<(), CryptoError> {
        if handle.key_id != self.id {
            return Err(CryptoError::ForeignHandle);
        }
        handle.destroy()
    }
}

impl Drop for KeyLifecycle {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        match slot.state {
            KeyState::Destroyed => {}
            KeyState::Consumed => {
                tracing::warn!(
                    key_id = %self.id,
                    "consumed key left scope without explicit destruction; destroying"
                );
                slot.wipe();
            }
            KeyState::Fresh => slot.wipe(),
        }
    }
}

impl std::fmt::Debug for KeyLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyLifecycle")
            .field("id", &self.id)
            .field("created_at", &self.created_at)
            .field("state", &self.state())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

/// Capability to use a consumed one-time key.
///
/// Not `Clone`: there is exactly one handle per key.
pub struct ConsumedKey {
    key_id: Uuid,
    slot: Arc<Mutex<KeySlot>>,
}

impl ConsumedKey {
    pub fn key_id(&self) -> Uuid {
        self.key_id
    }

    pub fn state(&self) -> KeyState {
        lock(&self.slot).state
    }

    pub fn is_destroyed(&self) -> bool {
        self.state() == KeyState::Destroyed
    }

    /// Zeroize the key material and mark it Destroyed.
    pub fn destroy(&self) -> Result<(), CryptoError> {
        let mut slot = lock(&self.slot);
        match slot.state {
            KeyState::Destroyed => Err(CryptoError::AlreadyDestroyed),
            KeyState::Fresh => Err(CryptoError::InvalidState {
                expected: KeyState::Consumed,
                found: KeyState::Fresh,
            }),
            KeyState::Consumed => {
                slot.wipe();
                tracing::debug!(key_id = %self.key_id, "one-time key destroyed");
                Ok(())
            }
        }
    }

    /// Run `f` with the key bytes for encrypting chunk `index`.
    ///
    /// Chunks must be sealed in increasing index order; an index at or below
    /// one already sealed is rejected, so no (key, index) pair is sealed twice.
    pub(crate) fn with_key_for_index<R>(
        &self,
        index: u64,
        f: impl FnOnce(&[u8; KEY_SIZE]) -> R,
    ) -> Result<R, CryptoError> {
        let mut slot = lock(&self.slot);
        if slot.state != KeyState::Consumed {
            return Err(CryptoError::AuthBinding { state: slot.state });
        }
        if slot.last_index.is_some_and(|last| index <= last) {
            return Err(CryptoError::NonceReuse { index });
        }
        slot.last_index = Some(index);
        Ok(f(&slot.bytes))
    }

    /// Run `f` with the key bytes for opening an already sealed chunk.
    pub(crate) fn with_key<R>(&self, f: impl FnOnce(&[u8; KEY_SIZE]) -> R) -> Result<R, CryptoError> {
        let slot = lock(&self.slot);
        if slot.state != KeyState::Consumed {
            return Err(CryptoError::AuthBinding { state: slot.state });
        }
        Ok(f(&slot.bytes))
    }

    /// Run `f` with the key bytes for the single fingerprint of this key.
    pub(crate) fn with_key_for_fingerprint<R>(
        &self,
        f: impl FnOnce(&[u8; KEY_SIZE]) -> R,
    ) -> Result<R, CryptoError> {
        let mut slot = lock(&self.slot);
        if slot.state != KeyState::Consumed {
            return Err(CryptoError::InvalidState {
                expected: KeyState::Consumed,
                found: slot.state,
            });
        }
        if slot.fingerprinted {
            return Err(CryptoError::FingerprintAlreadyCaptured);
        }
        slot.fingerprinted = true;
        Ok(f(&slot.bytes))
    }

    #[cfg(test)]
    pub(crate) fn raw_bytes_for_test(&self) -> [u8; KEY_SIZE] {
        lock(&self.slot).bytes
    }
}

impl Drop for ConsumedKey {
    fn drop(&mut self) {
        let mut slot = lock(&self.slot);
        if slot.state == KeyState::Consumed {
            tracing::warn!(
                key_id = %self.key_id,
                "key handle dropped without explicit destruction; destroying"
            );
            slot.wipe();
        }
    }
}

impl std::fmt::Debug for ConsumedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsumedKey")
            .field("key_id", &self.key_id)
            .field("state", &self.state())
            .field("bytes", &"[REDACTED]")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_is_fresh() {
        let key = KeyLifecycle::generate();
        assert_eq!(key.state(), KeyState::Fresh);
    }

    #[test]
    fn test_generated_keys_differ() {
        let mut k1 = KeyLifecycle::generate();
        let mut k2 = KeyLifecycle::generate();
        let h1 = k1.consume().unwrap();
        let h2 = k2.consume().unwrap();
        assert_ne!(h1.raw_bytes_for_test(), h2.raw_bytes_for_test());
    }

    #[test]
    fn test_linear_lifecycle() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        assert_eq!(key.state(), KeyState::Consumed);
        assert_eq!(handle.state(), KeyState::Consumed);

        key.destroy(&handle).unwrap();
        assert_eq!(key.state(), KeyState::Destroyed);
        assert!(handle.is_destroyed());
    }

    #[test]
    fn test_consume_twice_is_invalid_state() {
        let mut key = KeyLifecycle::generate();
        let _handle = key.consume().unwrap();
        let err = key.consume().unwrap_err();
        assert_eq!(
            err,
            CryptoError::InvalidState {
                expected: KeyState::Fresh,
                found: KeyState::Consumed,
            }
        );
    }

    #[test]
    fn test_destroy_twice_is_already_destroyed() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        key.destroy(&handle).unwrap();

        assert_eq!(key.destroy(&handle), Err(CryptoError::AlreadyDestroyed));
        assert_eq!(handle.destroy(), Err(CryptoError::AlreadyDestroyed));
        assert_eq!(key.state(), KeyState::Destroyed);
    }

    #[test]
    fn test_destroy_zeroizes_material() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        assert_ne!(handle.raw_bytes_for_test(), [0u8; KEY_SIZE]);

        key.destroy(&handle).unwrap();
        assert_eq!(handle.raw_bytes_for_test(), [0u8; KEY_SIZE]);
    }

    #[test]
    fn test_consume_after_destroy_is_invalid_state() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        handle.destroy().unwrap();
        assert!(matches!(
            key.consume(),
            Err(CryptoError::InvalidState {
                found: KeyState::Destroyed,
                ..
            })
        ));
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut k1 = KeyLifecycle::generate();
        let mut k2 = KeyLifecycle::generate();
        let _h1 = k1.consume().unwrap();
        let h2 = k2.consume().unwrap();

        assert_eq!(k1.destroy(&h2), Err(CryptoError::ForeignHandle));
        assert_eq!(k2.state(), KeyState::Consumed);
    }

    #[test]
    fn test_drop_destroys_consumed_key() {
        let handle = {
            let mut key = KeyLifecycle::generate();
            key.consume().unwrap()
        };
        assert!(handle.is_destroyed());
        assert_eq!(handle.raw_bytes_for_test(), [0u8; KEY_SIZE]);
    }

    #[test]
    fn test_dropping_handle_destroys_key() {
        let mut key = KeyLifecycle::generate();
        drop(key.consume().unwrap());
        assert_eq!(key.state(), KeyState::Destroyed);
    }

    #[test]
    fn test_drop_during_panic_destroys_key() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || {
            let _owned = key;
            panic!("pipeline blew up");
        }));
        assert!(result.is_err());
        assert!(handle.is_destroyed());
    }

    #[test]
    fn test_destroyed_key_rejects_use() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        handle.destroy().unwrap();

        let err = handle.with_key_for_index(0, |_| ()).unwrap_err();
        assert_eq!(
            err,
            CryptoError::AuthBinding {
                state: KeyState::Destroyed
            }
        );
    }

    #[test]
    fn test_indices_must_increase() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();

        handle.with_key_for_index(0, |_| ()).unwrap();
        handle.with_key_for_index(5, |_| ()).unwrap();
        assert_eq!(
            handle.with_key_for_index(3, |_| ()),
            Err(CryptoError::NonceReuse { index: 3 })
        );
        assert_eq!(
            handle.with_key_for_index(5, |_| ()),
            Err(CryptoError::NonceReuse { index: 5 })
        );
        handle.with_key_for_index(u64::MAX, |_| ()).unwrap();
        assert!(handle.with_key_for_index(u64::MAX, |_| ()).is_err());
    }

    #[test]
    fn test_generated_material_lives_only_in_slot() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        assert_ne!(handle.raw_bytes_for_test(), [0u8; KEY_SIZE]);
        assert_eq!(Arc::strong_count(&key.slot), 2);
    }

    #[test]
    fn test_debug_redacts_material() {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        assert!(format!("{key:?}").contains("[REDACTED]"));
        assert!(format!("{handle:?}").contains("[REDACTED]"));
    }
}
