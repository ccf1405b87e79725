//! Per-chunk XChaCha20-Poly1305 encryption for in-place shredding
//!
//! Chunks are sealed in detached mode so the ciphertext is exactly as long
//! as the plaintext and can overwrite the original byte range:
//! ```text
//! nonce = run_salt (16 bytes) || chunk_index (8 bytes, big-endian)
//! AAD   = chunk_index (8 bytes, big-endian) || run_salt (16 bytes)
//! file range [offset, offset+len) ← ciphertext (len bytes)
//! tag (16 bytes) kept in the ChunkRecord only
//! ```
//!
//! The nonce layout is injective in (salt, index), so one key never sees the
//! same nonce twice; the key handle additionally refuses any index that is
//! not above the last one sealed.

use chacha20poly1305::{
    aead::{AeadInPlace, KeyInit},
    Tag, XChaCha20Poly1305, XNonce,
};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::keys::ConsumedKey;
use crate::{NONCE_SIZE, SALT_SIZE, TAG_SIZE};

/// Random per-run salt mixed into every nonce and AAD.
pub type RunSalt = [u8; SALT_SIZE];

/// Output of sealing one chunk.
#[derive(Clone, PartialEq, Eq)]
pub struct ChunkRecord {
    pub index: u64,
    pub nonce: [u8; NONCE_SIZE],
    /// Same length as the plaintext it replaces
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

impl std::fmt::Debug for ChunkRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChunkRecord")
            .field("index", &self.index)
            .field("len", &self.ciphertext.len())
            .finish_non_exhaustive()
    }
}

/// Generate a fresh random run salt.
pub fn generate_salt() -> RunSalt {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive the nonce for chunk `index`: `salt || index_be`.
pub fn derive_nonce(salt: &RunSalt, index: u64) -> [u8; NONCE_SIZE] {
    let mut nonce = [0u8; NONCE_SIZE];
    nonce[..SALT_SIZE].copy_from_slice(salt);
    nonce[SALT_SIZE..].copy_from_slice(&index.to_be_bytes());
    nonce
}

/// Encrypt one chunk under a consumed one-time key.
///
/// - `key`: handle from `KeyLifecycle::consume`; must still be Consumed
/// - `salt`: the run salt
/// - `index`: zero-based chunk index; must be above every index already
///   sealed under this key
/// - `plaintext`: at most `chunk_size` bytes
pub fn encrypt_chunk(
    key: &ConsumedKey,
    salt: &RunSalt,
    index: u64,
    plaintext: &[u8],
    chunk_size: usize,
) -> Result<ChunkRecord, CryptoError> {
    if plaintext.len() > chunk_size {
        return Err(CryptoError::ChunkTooLarge {
            index,
            len: plaintext.len(),
            max: chunk_size,
        });
    }

    let nonce = derive_nonce(salt, index);
    let aad = build_aad(index, salt);
    // Holds plaintext until sealed; wiped on every early return.
    let mut buffer = Zeroizing::new(plaintext.to_vec());

    let tag = key
        .with_key_for_index(index, |key_bytes| {
            let cipher = XChaCha20Poly1305::new(key_bytes.into());
            cipher.encrypt_in_place_detached(
                XNonce::from_slice(&nonce),
                &aad,
                buffer.as_mut_slice(),
            )
        })?
        .map_err(|_| CryptoError::Encryption { index })?;

    let mut tag_bytes = [0u8; TAG_SIZE];
    tag_bytes.copy_from_slice(&tag);

    Ok(ChunkRecord {
        index,
        nonce,
        ciphertext: std::mem::take(&mut *buffer),
        tag: tag_bytes,
    })
}

/// Decrypt a sealed chunk. Only used to verify dry runs while the key is
/// still Consumed; a shredded file is never decrypted.
///
/// Any corruption of ciphertext, tag, index or salt yields `TagMismatch`
/// and no plaintext at all.
pub fn decrypt_chunk(
    key: &ConsumedKey,
    salt: &RunSalt,
    record: &ChunkRecord,
) -> Result<Vec<u8>, CryptoError> {
    let nonce = derive_nonce(salt, record.index);
    let aad = build_aad(record.index, salt);
    let mut buffer = Zeroizing::new(record.ciphertext.clone());

    key.with_key(|key_bytes| {
        let cipher = XChaCha20Poly1305::new(key_bytes.into());
        cipher.decrypt_in_place_detached(
            XNonce::from_slice(&nonce),
            &aad,
            buffer.as_mut_slice(),
            Tag::from_slice(&record.tag),
        )
    })?
    .map_err(|_| CryptoError::TagMismatch {
        index: record.index,
    })?;

    Ok(std::mem::take(&mut *buffer))
}

/// Build AAD: chunk_index (8 bytes BE) || salt (16 bytes)
fn build_aad(index: u64, salt: &RunSalt) -> [u8; 8 + SALT_SIZE] {
    let mut aad = [0u8; 8 + SALT_SIZE];
    aad[..8].copy_from_slice(&index.to_be_bytes());
    aad[8..].copy_from_slice(salt);
    aad
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::{KeyLifecycle, KeyState};
    use proptest::prelude::*;

    const CHUNK: usize = 4096;

    fn consumed() -> (KeyLifecycle, ConsumedKey) {
        let mut key = KeyLifecycle::generate();
        let handle = key.consume().unwrap();
        (key, handle)
    }

    #[test]
    fn test_encrypt_decrypt_roundtrip() {
        let (_key, handle) = consumed();
        let salt = generate_salt();
        let plaintext = b"hello, shredded world!";

        let record = encrypt_chunk(&handle, &salt, 0, plaintext, CHUNK).unwrap();
        assert_eq!(record.ciphertext.len(), plaintext.len());
        assert_ne!(&record.ciphertext[..], &plaintext[..]);

        let decrypted = decrypt_chunk(&handle, &salt, &record).unwrap();
        assert_eq!(&decrypted, plaintext);
    }

    #[test]
    fn test_encrypt_empty_chunk() {
        let (_key, handle) = consumed();
        let salt = generate_salt();

        let record = encrypt_chunk(&handle, &salt, 0, b"", CHUNK).unwrap();
        assert!(record.ciphertext.is_empty());
        assert_eq!(decrypt_chunk(&handle, &salt, &record).unwrap(), b"");
    }

    #[test]
    fn test_destroyed_key_is_not_bound() {
        let (_key, handle) = consumed();
        handle.destroy().unwrap();

        let err = encrypt_chunk(&handle, &generate_salt(), 0, b"x", CHUNK).unwrap_err();
        assert_eq!(
            err,
            CryptoError::AuthBinding {
                state: KeyState::Destroyed
            }
        );
    }

    #[test]
    fn test_repeated_index_fails_fast() {
        let (_key, handle) = consumed();
        let salt = generate_salt();

        encrypt_chunk(&handle, &salt, 7, b"first", CHUNK).unwrap();
        let err = encrypt_chunk(&handle, &salt, 7, b"second", CHUNK).unwrap_err();
        assert_eq!(err, CryptoError::NonceReuse { index: 7 });
    }

    #[test]
    fn test_rejected_seal_returns_no_ciphertext() {
        let (_key, handle) = consumed();
        let salt = generate_salt();

        encrypt_chunk(&handle, &salt, 1, b"first", CHUNK).unwrap();
        let err = encrypt_chunk(&handle, &salt, 0, b"late plaintext", CHUNK).unwrap_err();
        assert_eq!(err, CryptoError::NonceReuse { index: 0 });

        // the handle stays usable for later indices
        let record = encrypt_chunk(&handle, &salt, 2, b"next", CHUNK).unwrap();
        assert_eq!(decrypt_chunk(&handle, &salt, &record).unwrap(), b"next");
    }

    #[test]
    fn test_oversized_chunk_rejected() {
        let (_key, handle) = consumed();
        let data = vec![0u8; 17];
        let err = encrypt_chunk(&handle, &generate_salt(), 0, &data, 16).unwrap_err();
        assert_eq!(
            err,
            CryptoError::ChunkTooLarge {
                index: 0,
                len: 17,
                max: 16
            }
        );
    }

    #[test]
    fn test_decrypt_wrong_salt() {
        let (_key, handle) = consumed();
        let record = encrypt_chunk(&handle, &[1u8; SALT_SIZE], 0, b"data", CHUNK).unwrap();
        let err = decrypt_chunk(&handle, &[2u8; SALT_SIZE], &record).unwrap_err();
        assert_eq!(err, CryptoError::TagMismatch { index: 0 });
    }

    #[test]
    fn test_decrypt_wrong_index() {
        let (_key, handle) = consumed();
        let salt = generate_salt();
        let mut record = encrypt_chunk(&handle, &salt, 0, b"data", CHUNK).unwrap();
        record.index = 1;
        assert_eq!(
            decrypt_chunk(&handle, &salt, &record),
            Err(CryptoError::TagMismatch { index: 1 })
        );
    }

    #[test]
    fn test_decrypt_with_other_key_fails() {
        let (_k1, h1) = consumed();
        let (_k2, h2) = consumed();
        let salt = generate_salt();

        let record = encrypt_chunk(&h1, &salt, 0, b"secret data", CHUNK).unwrap();
        assert!(decrypt_chunk(&h2, &salt, &record).is_err());
    }

    #[test]
    fn test_decrypt_after_destroy_is_auth_binding() {
        let (_key, handle) = consumed();
        let salt = generate_salt();
        let record = encrypt_chunk(&handle, &salt, 0, b"secret", CHUNK).unwrap();
        handle.destroy().unwrap();

        assert!(matches!(
            decrypt_chunk(&handle, &salt, &record),
            Err(CryptoError::AuthBinding { .. })
        ));
    }

    #[test]
    fn test_nonce_layout() {
        let salt = [0xAAu8; SALT_SIZE];
        let nonce = derive_nonce(&salt, 0x0102);
        assert_eq!(&nonce[..SALT_SIZE], &salt);
        assert_eq!(&nonce[SALT_SIZE..], &0x0102u64.to_be_bytes());
    }

    proptest! {
        #[test]
        fn nonce_is_injective(
            salt_a in any::<[u8; SALT_SIZE]>(),
            salt_b in any::<[u8; SALT_SIZE]>(),
            i in any::<u64>(),
            j in any::<u64>(),
        ) {
            prop_assume!(salt_a != salt_b || i != j);
            prop_assert_ne!(derive_nonce(&salt_a, i), derive_nonce(&salt_b, j));
        }

        #[test]
        fn any_bit_flip_is_detected(
            data in proptest::collection::vec(any::<u8>(), 1..=512),
            bit in any::<usize>(),
        ) {
            let (_key, handle) = consumed();
            let salt = generate_salt();
            let mut record = encrypt_chunk(&handle, &salt, 3, &data, CHUNK).unwrap();

            let total_bits = (record.ciphertext.len() + TAG_SIZE) * 8;
            let bit = bit % total_bits;
            let byte = bit / 8;
            if byte < record.ciphertext.len() {
                record.ciphertext[byte] ^= 1 << (bit % 8);
            } else {
                record.tag[byte - record.ciphertext.len()] ^= 1 << (bit % 8);
            }

            prop_assert_eq!(
                decrypt_chunk(&handle, &salt, &record),
                Err(CryptoError::TagMismatch { index: 3 })
            );
        }
    }
}
