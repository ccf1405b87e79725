use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of storage device, as reported by the media probe
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MediaKind {
    #[serde(rename = "ATA")]
    Ata,
    #[serde(rename = "NVMe")]
    Nvme,
    Unknown,
}

impl std::fmt::Display for MediaKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MediaKind::Ata => write!(f, "ATA"),
            MediaKind::Nvme => write!(f, "NVMe"),
            MediaKind::Unknown => write!(f, "Unknown"),
        }
    }
}

/// Whether an operation touched real storage or was simulated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum EraseMode {
    Real,
    DryRun,
}

impl EraseMode {
    pub fn from_dry_run(dry_run: bool) -> Self {
        if dry_run {
            EraseMode::DryRun
        } else {
            EraseMode::Real
        }
    }

    pub fn is_dry_run(self) -> bool {
        self == EraseMode::DryRun
    }
}

impl std::fmt::Display for EraseMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EraseMode::Real => write!(f, "real"),
            EraseMode::DryRun => write!(f, "dry-run"),
        }
    }
}

/// Operation recorded in a certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Operation {
    DiskErase,
    FileShred,
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Operation::DiskErase => write!(f, "disk-erase"),
            Operation::FileShred => write!(f, "file-shred"),
        }
    }
}

/// Terminal result of an erase or shred operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum Outcome {
    Success,
    Failure { reason: String },
    Aborted { reason: String },
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Success => write!(f, "success"),
            Outcome::Failure { reason } => write!(f, "failure ({reason})"),
            Outcome::Aborted { reason } => write!(f, "aborted ({reason})"),
        }
    }
}

/// The compliance artifact for one erase or shred operation.
///
/// Field names are stable. Optional fields are omitted from the JSON form
/// when absent; which ones are present depends only on `operation`, never
/// on `mode`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CertificateRecord {
    /// Unique certificate identifier (UUID v4)
    pub id: Uuid,
    pub operation: Operation,
    /// Device path or canonical file path
    pub target: String,
    pub mode: EraseMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_kind: Option<MediaKind>,
    /// Hex SHA-256 fingerprint of the destroyed one-time key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key_fingerprint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_size: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chunk_count: Option<u64>,
    pub started_at: DateTime<Utc>,
    pub ended_at: DateTime<Utc>,
    pub outcome: Outcome,
    /// BLAKE3 over the canonical JSON of every other field (hex)
    #[serde(default)]
    pub seal: String,
}

impl CertificateRecord {
    /// Field names present in the serialized record (sorted).
    pub fn field_names(&self) -> Vec<String> {
        match serde_json::to_value(self) {
            Ok(serde_json::Value::Object(map)) => map.keys().cloned().collect(),
            _ => Vec::new(),
        }
    }
}
