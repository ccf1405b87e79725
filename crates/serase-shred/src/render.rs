//! Certificate rendering and persistence.
//!
//! The sealed JSON record is the source of truth. The rendered document is a
//! convenience copy for humans and lists exactly the fields the record has.

use std::fs;
use std::path::{Path, PathBuf};

use serase_core::{CertificateRecord, Operation};

use crate::error::ShredError;

/// Rendered, human-readable form of a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    pub media_type: &'static str,
    /// File extension without the dot
    pub extension: &'static str,
    pub body: Vec<u8>,
}

pub trait CertificateRenderer {
    fn render(&self, record: &CertificateRecord) -> Result<Document, ShredError>;
}

/// Plain-text certificate, one `key: value` line per field.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextRenderer;

impl CertificateRenderer for TextRenderer {
    fn render(&self, record: &CertificateRecord) -> Result<Document, ShredError> {
        let value = serde_json::to_value(record)
            .map_err(|e| ShredError::Certificate(format!("serializing record: {e}")))?;
        let serde_json::Value::Object(fields) = value else {
            return Err(ShredError::Certificate("record is not a JSON object".into()));
        };

        let mut out = String::new();
        out.push_str("SecureErase Certificate\n");
        out.push_str("=======================\n\n");

        for (name, field) in &fields {
            let text = match (name.as_str(), field) {
                ("outcome", _) => record.outcome.to_string(),
                (_, serde_json::Value::String(s)) => s.clone(),
                (_, other) => other.to_string(),
            };
            out.push_str(&format!("{name}: {text}\n"));
        }

        Ok(Document {
            media_type: "text/plain; charset=utf-8",
            extension: "txt",
            body: out.into_bytes(),
        })
    }
}

/// Where a certificate ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedCertificate {
    pub record_path: PathBuf,
    pub document_path: Option<PathBuf>,
}

pub trait CertificateStore {
    fn persist(
        &self,
        record: &CertificateRecord,
        document: Option<&Document>,
    ) -> Result<PersistedCertificate, ShredError>;
}

/// Writes `<prefix>_<YYYYmmddHHMMSS>.json` (and the document) into a directory.
#[derive(Debug, Clone)]
pub struct DirectoryStore {
    dir: PathBuf,
}

impl DirectoryStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn stem(&self, record: &CertificateRecord) -> String {
        let prefix = match record.operation {
            Operation::DiskErase => "disk_erase",
            Operation::FileShred => "file_shred",
        };
        let stem = format!("{prefix}_{}", record.ended_at.format("%Y%m%d%H%M%S"));
        if self.dir.join(format!("{stem}.json")).exists() {
            // same operation finished within the same second
            let id = record.id.simple().to_string();
            format!("{stem}_{}", &id[..8])
        } else {
            stem
        }
    }
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<(), ShredError> {
    fs::write(path, bytes).map_err(|source| ShredError::Persist {
        path: path.to_path_buf(),
        source,
    })
}

impl CertificateStore for DirectoryStore {
    fn persist(
        &self,
        record: &CertificateRecord,
        document: Option<&Document>,
    ) -> Result<PersistedCertificate, ShredError> {
        fs::create_dir_all(&self.dir).map_err(|source| ShredError::Persist {
            path: self.dir.clone(),
            source,
        })?;

        let stem = self.stem(record);
        let record_path = self.dir.join(format!("{stem}.json"));
        let json = serde_json::to_vec_pretty(record)
            .map_err(|e| ShredError::Certificate(format!("serializing record: {e}")))?;
        write_file(&record_path, &json)?;

        let document_path = match document {
            Some(doc) => {
                let path = self.dir.join(format!("{stem}.{}", doc.extension));
                write_file(&path, &doc.body)?;
                Some(path)
            }
            None => None,
        };

        tracing::info!(
            certificate_id = %record.id,
            path = %record_path.display(),
            "certificate written"
        );

        Ok(PersistedCertificate {
            record_path,
            document_path,
        })
    }
}
