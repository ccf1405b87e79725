//! Whole-device erase collaborators.
//!
//! The orchestrator only sees the `MediaProbe` and `DiskEraser` traits. The
//! default implementations shell out to the vendor tooling:
//!
//! - NVMe: `nvme format <dev> --ses=<n>`
//! - ATA:  `hdparm --user-master u --security-set-pass <pw> <dev>`
//!   then  `hdparm --user-master u --security-erase <pw> <dev>`

use std::process::Command;

use serase_core::config::DiskConfig;
use serase_core::MediaKind;

/// Result reported by an eraser
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EraseResult {
    Success,
    Failure(String),
}

pub trait MediaProbe: Send + Sync {
    fn detect(&self, device: &str) -> MediaKind;
}

pub trait DiskEraser: Send + Sync {
    fn erase(&self, device: &str, kind: MediaKind, dry_run: bool) -> EraseResult;
}

/// Classifies devices by their kernel name, unless a kind is forced.
#[derive(Debug, Clone, Default)]
pub struct DevicePathProbe {
    forced: Option<MediaKind>,
}

impl DevicePathProbe {
    pub fn new() -> Self {
        Self::default()
    }

    /// Always report `kind` (the CLI's `--nvme` flag).
    pub fn forced(kind: MediaKind) -> Self {
        Self { forced: Some(kind) }
    }
}

impl MediaProbe for DevicePathProbe {
    fn detect(&self, device: &str) -> MediaKind {
        if let Some(kind) = self.forced {
            return kind;
        }
        let name = device.rsplit('/').next().unwrap_or(device);
        if name.starts_with("nvme") {
            MediaKind::Nvme
        } else if name.starts_with("sd") || name.starts_with("hd") {
            MediaKind::Ata
        } else {
            MediaKind::Unknown
        }
    }
}

/// Runs nvme-cli / hdparm.
#[derive(Debug, Clone)]
pub struct CommandEraser {
    config: DiskConfig,
}

impl CommandEraser {
    pub fn new(config: DiskConfig) -> Self {
        Self { config }
    }

    /// Command lines that would be run for `device`, in order.
    pub fn plan(&self, device: &str, kind: MediaKind) -> Option<Vec<Vec<String>>> {
        let cfg = &self.config;
        let steps = match kind {
            MediaKind::Nvme => vec![vec![
                cfg.nvme_bin.clone(),
                "format".into(),
                device.into(),
                format!("--ses={}", cfg.nvme_ses),
            ]],
            MediaKind::Ata => vec![
                vec![
                    cfg.hdparm_bin.clone(),
                    "--user-master".into(),
                    "u".into(),
                    "--security-set-pass".into(),
                    cfg.hdparm_password.clone(),
                    device.into(),
                ],
                vec![
                    cfg.hdparm_bin.clone(),
                    "--user-master".into(),
                    "u".into(),
                    "--security-erase".into(),
                    cfg.hdparm_password.clone(),
                    device.into(),
                ],
            ],
            MediaKind::Unknown => return None,
        };

        Some(
            steps
                .into_iter()
                .map(|argv| {
                    if cfg.use_sudo {
                        std::iter::once("sudo".to_string()).chain(argv).collect()
                    } else {
                        argv
                    }
                })
                .collect(),
        )
    }

    fn run_step(argv: &[String]) -> Result<(), String> {
        let (program, args) = argv.split_first().ok_or("empty command line")?;
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| format!("spawning {program}: {e}"))?;
        if status.success() {
            Ok(())
        } else {
            Err(format!("{} exited with {status}", argv.join(" ")))
        }
    }
}

impl DiskEraser for CommandEraser {
    fn erase(&self, device: &str, kind: MediaKind, dry_run: bool) -> EraseResult {
        let Some(plan) = self.plan(device, kind) else {
            return EraseResult::Failure(format!("unsupported media kind {kind} for {device}"));
        };

        for argv in &plan {
            if dry_run {
                tracing::info!(device, command = %argv.join(" "), "dry-run: would run");
                continue;
            }
            tracing::info!(device, command = %argv.join(" "), "running erase step");
            if let Err(reason) = Self::run_step(argv) {
                tracing::error!(device, "erase step failed: {reason}");
                return EraseResult::Failure(reason);
            }
        }
        EraseResult::Success
    }
}

/// Eraser that never touches a device. Used for every dry-run disk request.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimulatedEraser;

impl DiskEraser for SimulatedEraser {
    fn erase(&self, device: &str, kind: MediaKind, _dry_run: bool) -> EraseResult {
        tracing::info!(device, kind = %kind, "dry-run: would securely erase device");
        EraseResult::Success
    }
}
