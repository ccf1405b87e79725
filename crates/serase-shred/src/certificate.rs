//! Certificate binder: turns a terminal operation into an immutable,
//! sealed `CertificateRecord`.
//!
//! The seal is the BLAKE3 hash of the record's JSON with `seal` set to the
//! empty string. Field order is the struct declaration order, so the JSON is
//! canonical for a given record.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use serase_core::{CertificateRecord, EraseMode, MediaKind, Operation, Outcome};
use serase_crypto::KeyFingerprint;

use crate::error::ShredError;
use crate::run::ShredRun;

/// What a certificate is bound to.
#[derive(Debug, Clone, Copy)]
pub enum Binding<'a> {
    FileShred {
        run: &'a ShredRun,
        fingerprint: Option<&'a KeyFingerprint>,
    },
    DiskErase {
        device: &'a str,
        media_kind: MediaKind,
    },
}

/// Build and seal a certificate.
///
/// Refuses shred runs that have not reached a terminal state.
pub fn build_certificate(
    binding: Binding<'_>,
    mode: EraseMode,
    outcome: Outcome,
    started_at: DateTime<Utc>,
    ended_at: DateTime<Utc>,
) -> Result<CertificateRecord, ShredError> {
    let mut record = match binding {
        Binding::FileShred { run, fingerprint } => {
            if !run.is_terminal() {
                return Err(ShredError::NotTerminal { run_id: run.id });
            }
            CertificateRecord {
                id: Uuid::new_v4(),
                operation: Operation::FileShred,
                target: run.target.display().to_string(),
                mode,
                media_kind: None,
                key_fingerprint: fingerprint.map(KeyFingerprint::to_hex),
                original_size: Some(run.original_size),
                chunk_count: Some(run.chunks_completed()),
                started_at,
                ended_at,
                outcome,
                seal: String::new(),
            }
        }
        Binding::DiskErase { device, media_kind } => CertificateRecord {
            id: Uuid::new_v4(),
            operation: Operation::DiskErase,
            target: device.to_string(),
            mode,
            media_kind: Some(media_kind),
            key_fingerprint: None,
            original_size: None,
            chunk_count: None,
            started_at,
            ended_at,
            outcome,
            seal: String::new(),
        },
    };

    record.seal = seal(&record)?;
    Ok(record)
}

/// Certificate for a terminal shred run, taking every field from the run.
pub fn file_certificate(run: &ShredRun) -> Result<CertificateRecord, ShredError> {
    let outcome = run
        .outcome()
        .ok_or(ShredError::NotTerminal { run_id: run.id })?;
    let ended_at = run.ended_at.unwrap_or_else(Utc::now);
    build_certificate(
        Binding::FileShred {
            run,
            fingerprint: run.fingerprint.as_ref(),
        },
        run.mode,
        outcome,
        run.started_at,
        ended_at,
    )
}

/// Compute the seal of `record`, ignoring its current `seal` field.
pub fn seal(record: &CertificateRecord) -> Result<String, ShredError> {
    let mut unsealed = record.clone();
    unsealed.seal = String::new();
    let canonical = serde_json::to_vec(&unsealed)
        .map_err(|e| ShredError::Certificate(format!("serializing record: {e}")))?;
    Ok(blake3::hash(&canonical).to_hex().to_string())
}

/// Check that `record.seal` matches its contents.
pub fn verify_seal(record: &CertificateRecord) -> bool {
    match seal(record) {
        Ok(expected) => !record.seal.is_empty() && expected == record.seal,
        Err(_) => false,
    }
}
