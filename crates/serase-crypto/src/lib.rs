//! serase-crypto: crypto-shred primitives
//!
//! A file is shredded by encrypting it in place under a one-time key and then
//! destroying that key. This crate holds the three pieces that make the
//! guarantee checkable:
//!
//! ```text
//! KeyLifecycle (Fresh → Consumed → Destroyed)
//!   ├── ConsumedKey handle ──► chunk AEAD: XChaCha20-Poly1305
//!   │                           key=one-time key, nonce=salt||index, AAD=index||salt
//!   └── capture_fingerprint ──► SHA-256(domain || key || run id || salt || target || size)
//! ```
//!
//! Key material never leaves the lifecycle's storage cell; the handle only
//! borrows it for the duration of a single AEAD call.

pub mod chunk;
pub mod error;
pub mod fingerprint;
pub mod keys;

pub use chunk::{decrypt_chunk, derive_nonce, encrypt_chunk, generate_salt, ChunkRecord, RunSalt};
pub use error::CryptoError;
pub use fingerprint::{capture_fingerprint, KeyFingerprint, RunMetadata};
pub use keys::{ConsumedKey, KeyLifecycle, KeyState};

/// Size of a one-time key in bytes (256-bit)
pub const KEY_SIZE: usize = 32;

/// Size of an XChaCha20-Poly1305 nonce (192-bit)
pub const NONCE_SIZE: usize = 24;

/// Size of a Poly1305 authentication tag
pub const TAG_SIZE: usize = 16;

/// Size of the per-run salt mixed into every nonce
pub const SALT_SIZE: usize = 16;
