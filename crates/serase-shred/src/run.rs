//! Shred run bookkeeping: stage machine, chunk log, terminal status.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use serase_core::{EraseMode, Outcome};
use serase_crypto::{KeyFingerprint, RunSalt, NONCE_SIZE, TAG_SIZE};

/// Pipeline stage. Runs move forward through
/// Idle → Reading → Encrypting → Overwriting → (Reading …) → Finalizing
/// and end in exactly one of Completed, Failed or Aborted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineStage {
    Idle,
    Reading,
    Encrypting,
    Overwriting,
    Finalizing,
    Completed,
    Failed,
    Aborted,
}

impl PipelineStage {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PipelineStage::Completed | PipelineStage::Failed | PipelineStage::Aborted
        )
    }

    fn may_advance_to(self, next: PipelineStage) -> bool {
        use PipelineStage::*;
        match (self, next) {
            (_, Failed) | (_, Aborted) => !self.is_terminal(),
            (Idle, Reading) | (Idle, Finalizing) => true,
            (Reading, Encrypting) => true,
            (Encrypting, Overwriting) => true,
            (Overwriting, Reading) | (Overwriting, Finalizing) => true,
            (Finalizing, Completed) => true,
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunStatus {
    InProgress,
    Completed,
    Failed { reason: String },
    Aborted { reason: String },
}

/// One overwritten byte range. The ciphertext itself lives in the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkEntry {
    pub index: u64,
    pub offset: u64,
    pub len: u64,
    pub nonce: [u8; NONCE_SIZE],
    pub tag: [u8; TAG_SIZE],
}

/// A single file-shred operation.
#[derive(Debug, Clone)]
pub struct ShredRun {
    pub id: Uuid,
    pub target: PathBuf,
    pub mode: EraseMode,
    pub original_size: u64,
    pub chunk_size: usize,
    pub salt: RunSalt,
    pub stage: PipelineStage,
    pub status: RunStatus,
    pub fingerprint: Option<KeyFingerprint>,
    /// Set once the one-time key has been wiped, on every exit path
    pub key_destroyed: bool,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    chunks: Vec<ChunkEntry>,
}

impl ShredRun {
    pub fn new(target: &Path, mode: EraseMode, chunk_size: usize, salt: RunSalt) -> Self {
        Self {
            id: Uuid::new_v4(),
            target: target.to_path_buf(),
            mode,
            original_size: 0,
            chunk_size,
            salt,
            stage: PipelineStage::Idle,
            status: RunStatus::InProgress,
            fingerprint: None,
            key_destroyed: false,
            started_at: Utc::now(),
            ended_at: None,
            chunks: Vec::new(),
        }
    }

    pub fn chunks(&self) -> &[ChunkEntry] {
        &self.chunks
    }

    pub fn chunks_completed(&self) -> u64 {
        self.chunks.len() as u64
    }

    pub fn bytes_completed(&self) -> u64 {
        self.chunks.iter().map(|c| c.len).sum()
    }

    pub fn is_terminal(&self) -> bool {
        self.stage.is_terminal()
    }

    /// Move to the next pipeline stage; out-of-order transitions are a logic
    /// fault and are ignored with an error log.
    pub fn advance(&mut self, next: PipelineStage) {
        if self.stage == next {
            return;
        }
        if !self.stage.may_advance_to(next) {
            tracing::error!(run_id = %self.id, from = ?self.stage, to = ?next, "illegal stage transition");
            debug_assert!(false, "illegal stage transition {:?} -> {:?}", self.stage, next);
            return;
        }
        tracing::trace!(run_id = %self.id, from = ?self.stage, to = ?next, "stage");
        self.stage = next;
    }

    /// Append the entry for the next chunk. Entries are strictly index-ordered.
    pub fn record_chunk(&mut self, entry: ChunkEntry) {
        debug_assert_eq!(entry.index, self.chunks.len() as u64, "chunk log out of order");
        self.chunks.push(entry);
    }

    pub fn complete(&mut self) {
        self.advance(PipelineStage::Completed);
        self.status = RunStatus::Completed;
        self.ended_at = Some(Utc::now());
    }

    pub fn fail(&mut self, reason: String) {
        self.advance(PipelineStage::Failed);
        self.status = RunStatus::Failed { reason };
        self.ended_at = Some(Utc::now());
    }

    pub fn abort(&mut self, reason: String) {
        self.advance(PipelineStage::Aborted);
        self.status = RunStatus::Aborted { reason };
        self.ended_at = Some(Utc::now());
    }

    /// Certificate outcome for a terminal run; `None` while in progress.
    pub fn outcome(&self) -> Option<Outcome> {
        match &self.status {
            RunStatus::InProgress => None,
            RunStatus::Completed => Some(Outcome::Success),
            RunStatus::Failed { reason } => Some(Outcome::Failure {
                reason: reason.clone(),
            }),
            RunStatus::Aborted { reason } => Some(Outcome::Aborted {
                reason: reason.clone(),
            }),
        }
    }
}
