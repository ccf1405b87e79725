use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{SeraseError, SeraseResult};

/// Top-level configuration (loaded from serase.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SeraseConfig {
    pub shred: ShredConfig,
    pub disk: DiskConfig,
    pub certificates: CertificateConfig,
    pub log: LogConfig,
}

impl SeraseConfig {
    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist.
    pub fn load(path: &Path) -> SeraseResult<Self> {
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)
            .map_err(|e| SeraseError::Config(format!("parsing {}: {e}", path.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the shred pipeline cannot operate with.
    pub fn validate(&self) -> SeraseResult<()> {
        if self.shred.chunk_size == 0 {
            return Err(SeraseError::Config("shred.chunk_size must be > 0".into()));
        }
        if self.shred.timeout_secs == Some(0) {
            return Err(SeraseError::Config(
                "shred.timeout_secs must be > 0 when set".into(),
            ));
        }
        Ok(())
    }
}

/// Crypto-shred pipeline settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ShredConfig {
    /// Bytes per authenticated-encryption chunk (default: 1 MiB)
    pub chunk_size: usize,
    /// In dry-run mode, decrypt the first synthetic chunk and compare it
    /// against the original bytes (default: true)
    pub verify_dry_run: bool,
    /// Abort a run at the next chunk boundary after this many seconds
    pub timeout_secs: Option<u64>,
}

impl Default for ShredConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1024 * 1024,
            verify_dry_run: true,
            timeout_secs: None,
        }
    }
}

/// Whole-device erase command settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DiskConfig {
    /// Prefix erase commands with `sudo`
    pub use_sudo: bool,
    /// nvme-cli binary
    pub nvme_bin: String,
    /// hdparm binary
    pub hdparm_bin: String,
    /// Temporary ATA security password set before SECURITY ERASE UNIT
    pub hdparm_password: String,
    /// NVMe secure erase setting passed as `--ses` (1 = user data erase)
    pub nvme_ses: u8,
}

impl Default for DiskConfig {
    fn default() -> Self {
        Self {
            use_sudo: true,
            nvme_bin: "nvme".into(),
            hdparm_bin: "hdparm".into(),
            hdparm_password: "p".into(),
            nvme_ses: 1,
        }
    }
}

/// Where certificates are written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CertificateConfig {
    /// Output directory for certificate records and documents
    pub dir: PathBuf,
    /// Also write the rendered human-readable document next to the JSON record
    pub write_document: bool,
}

impl Default for CertificateConfig {
    fn default() -> Self {
        Self {
            dir: PathBuf::from("certificates"),
            write_document: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}
