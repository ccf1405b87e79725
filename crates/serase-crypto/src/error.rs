use thiserror::Error;

use crate::keys::KeyState;

/// Key lifecycle and chunk cipher failures.
///
/// None of these are recoverable by retrying: they indicate either a logic
/// fault in the caller or an integrity violation in the data.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CryptoError {
    #[error("invalid key state: expected {expected}, found {found}")]
    InvalidState { expected: KeyState, found: KeyState },

    #[error("key is not bound for encryption (state: {state})")]
    AuthBinding { state: KeyState },

    #[error("authentication tag mismatch on chunk {index}")]
    TagMismatch { index: u64 },

    #[error("key already destroyed")]
    AlreadyDestroyed,

    #[error("nonce reuse: chunk {index} was already encrypted under this key")]
    NonceReuse { index: u64 },

    #[error("chunk {index} is {len} bytes, exceeds chunk size {max}")]
    ChunkTooLarge { index: u64, len: usize, max: usize },

    #[error("key handle belongs to a different key")]
    ForeignHandle,

    #[error("fingerprint already captured for this key")]
    FingerprintAlreadyCaptured,

    #[error("chunk {index} encryption failed")]
    Encryption { index: u64 },
}
