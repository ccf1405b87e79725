use std::path::PathBuf;
use thiserror::Error;

use serase_crypto::CryptoError;

#[derive(Debug, Error)]
pub enum ShredError {
    /// Key lifecycle misuse or cryptographic integrity violation. Never retried.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("run conflict: a shred of {} is already in progress", .target.display())]
    RunConflict { target: PathBuf },

    #[error("target not found: {}", .0.display())]
    TargetNotFound(PathBuf),

    #[error("not a regular file: {}", .0.display())]
    NotARegularFile(PathBuf),

    #[error(
        "I/O failure during {context} after {chunks_completed} chunks ({bytes_completed} bytes): {source}"
    )]
    Io {
        context: &'static str,
        chunks_completed: u64,
        bytes_completed: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("run cancelled: {0}")]
    Cancelled(String),

    #[error("dry-run verification failed on chunk {index}")]
    VerificationMismatch { index: u64 },

    #[error("run {run_id} has not reached a terminal state")]
    NotTerminal { run_id: uuid::Uuid },

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("persisting certificate to {}: {source}", .path.display())]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ShredError {
    /// Whether the caller may retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShredError::RunConflict { .. })
    }
}
