//! Erasure orchestrator: the single entry point for erase requests.
//!
//! Disk requests go to the media probe and disk eraser; file requests go to
//! the shred pipeline. Both produce exactly one sealed certificate. Dry runs
//! of a disk are routed to `SimulatedEraser`, so the real eraser is never
//! invoked for them.

use std::path::PathBuf;

use chrono::Utc;
use tracing::{info, warn};

use serase_core::config::SeraseConfig;
use serase_core::{CertificateRecord, EraseMode, MediaKind, Outcome};

use crate::certificate::{build_certificate, file_certificate, Binding};
use crate::disk::{CommandEraser, DevicePathProbe, DiskEraser, EraseResult, MediaProbe, SimulatedEraser};
use crate::error::ShredError;
use crate::pipeline::{RunControl, ShredPipeline};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EraseTarget {
    Disk { device: String },
    File { path: PathBuf },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EraseRequest {
    pub target: EraseTarget,
    pub dry_run: bool,
}

impl EraseRequest {
    pub fn disk(device: impl Into<String>, dry_run: bool) -> Self {
        Self {
            target: EraseTarget::Disk {
                device: device.into(),
            },
            dry_run,
        }
    }

    pub fn file(path: impl Into<PathBuf>, dry_run: bool) -> Self {
        Self {
            target: EraseTarget::File { path: path.into() },
            dry_run,
        }
    }
}

pub struct Orchestrator {
    pipeline: ShredPipeline,
    probe: Box<dyn MediaProbe>,
    eraser: Box<dyn DiskEraser>,
    simulator: SimulatedEraser,
}

impl Orchestrator {
    /// Default collaborators: device-name probe and nvme-cli/hdparm eraser.
    pub fn new(config: &SeraseConfig) -> Self {
        Self::with_collaborators(
            ShredPipeline::new(&config.shred),
            Box::new(DevicePathProbe::new()),
            Box::new(CommandEraser::new(config.disk.clone())),
        )
    }

    pub fn with_collaborators(
        pipeline: ShredPipeline,
        probe: Box<dyn MediaProbe>,
        eraser: Box<dyn DiskEraser>,
    ) -> Self {
        Self {
            pipeline,
            probe,
            eraser,
            simulator: SimulatedEraser,
        }
    }

    pub fn pipeline(&self) -> &ShredPipeline {
        &self.pipeline
    }

    pub fn request_erase(&self, request: &EraseRequest) -> Result<CertificateRecord, ShredError> {
        self.request_erase_with(request, &RunControl::default())
    }

    /// Dispatch `request` and return its certificate.
    ///
    /// `Err` means the request was rejected before anything started (file
    /// missing, not a regular file, or already being shredded).
    pub fn request_erase_with(
        &self,
        request: &EraseRequest,
        control: &RunControl<'_>,
    ) -> Result<CertificateRecord, ShredError> {
        let mode = EraseMode::from_dry_run(request.dry_run);
        let record = match &request.target {
            EraseTarget::Disk { device } => self.erase_disk(device, mode)?,
            EraseTarget::File { path } => {
                let report = self.pipeline.shred(path, mode, control)?;
                file_certificate(&report.run)?
            }
        };

        info!(
            certificate_id = %record.id,
            operation = %record.operation,
            target = %record.target,
            mode = %record.mode,
            outcome = %record.outcome,
            "erase request finished"
        );
        Ok(record)
    }

    fn erase_disk(&self, device: &str, mode: EraseMode) -> Result<CertificateRecord, ShredError> {
        let started_at = Utc::now();
        let media_kind = self.probe.detect(device);
        info!(device, media_kind = %media_kind, mode = %mode, "disk erase requested");

        let outcome = if media_kind == MediaKind::Unknown {
            warn!(device, "refusing to erase device of unknown media kind");
            Outcome::Failure {
                reason: "unsupported or undetected media kind".into(),
            }
        } else {
            let eraser: &dyn DiskEraser = if mode.is_dry_run() {
                &self.simulator
            } else {
                self.eraser.as_ref()
            };
            match eraser.erase(device, media_kind, mode.is_dry_run()) {
                EraseResult::Success => Outcome::Success,
                EraseResult::Failure(reason) => Outcome::Failure { reason },
            }
        };

        build_certificate(
            Binding::DiskErase { device, media_kind },
            mode,
            outcome,
            started_at,
            Utc::now(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::verify_seal;
    use serase_core::config::ShredConfig;
    use serase_core::Operation;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use tempfile::TempDir;

    struct FixedProbe(MediaKind);

    impl MediaProbe for FixedProbe {
        fn detect(&self, _device: &str) -> MediaKind {
            self.0
        }
    }

    struct CountingEraser {
        calls: Arc<AtomicUsize>,
        result: EraseResult,
    }

    impl DiskEraser for CountingEraser {
        fn erase(&self, _device: &str, _kind: MediaKind, _dry_run: bool) -> EraseResult {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn orchestrator(kind: MediaKind, result: EraseResult) -> (Orchestrator, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let orch = Orchestrator::with_collaborators(
            ShredPipeline::new(&ShredConfig {
                chunk_size: 8,
                ..ShredConfig::default()
            }),
            Box::new(FixedProbe(kind)),
            Box::new(CountingEraser {
                calls: Arc::clone(&calls),
                result,
            }),
        );
        (orch, calls)
    }

    #[test]
    fn test_disk_dry_run_never_calls_real_eraser() {
        let (orch, calls) = orchestrator(MediaKind::Nvme, EraseResult::Success);
        let cert = orch
            .request_erase(&EraseRequest::disk("/dev/nvme0n1", true))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cert.mode, EraseMode::DryRun);
        assert_eq!(cert.media_kind, Some(MediaKind::Nvme));
        assert_eq!(cert.outcome, Outcome::Success);
        assert!(verify_seal(&cert));
    }

    #[test]
    fn test_disk_real_uses_eraser() {
        let (orch, calls) = orchestrator(MediaKind::Ata, EraseResult::Success);
        let cert = orch
            .request_erase(&EraseRequest::disk("/dev/sda", false))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(cert.operation, Operation::DiskErase);
        assert_eq!(cert.mode, EraseMode::Real);
        assert!(cert.outcome.is_success());
    }

    #[test]
    fn test_disk_failure_recorded() {
        let (orch, _) = orchestrator(MediaKind::Ata, EraseResult::Failure("frozen".into()));
        let cert = orch
            .request_erase(&EraseRequest::disk("/dev/sda", false))
            .unwrap();
        assert_eq!(
            cert.outcome,
            Outcome::Failure {
                reason: "frozen".into()
            }
        );
    }

    #[test]
    fn test_unknown_media_not_erased() {
        let (orch, calls) = orchestrator(MediaKind::Unknown, EraseResult::Success);
        let cert = orch
            .request_erase(&EraseRequest::disk("/dev/mmcblk0", false))
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(matches!(cert.outcome, Outcome::Failure { .. }));
        assert_eq!(cert.media_kind, Some(MediaKind::Unknown));
    }

    #[test]
    fn test_file_request_goes_through_pipeline() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("secret.txt");
        std::fs::write(&path, b"twenty bytes of data").unwrap();
        let (orch, calls) = orchestrator(MediaKind::Nvme, EraseResult::Success);

        let cert = orch.request_erase(&EraseRequest::file(&path, false)).unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(cert.operation, Operation::FileShred);
        assert_eq!(cert.original_size, Some(20));
        assert_eq!(cert.chunk_count, Some(3));
        assert!(cert.key_fingerprint.is_some());
        assert!(cert.outcome.is_success());
        assert_ne!(std::fs::read(&path).unwrap(), b"twenty bytes of data");
    }

    #[test]
    fn test_missing_file_rejected() {
        let tmp = TempDir::new().unwrap();
        let (orch, _) = orchestrator(MediaKind::Nvme, EraseResult::Success);
        let err = orch
            .request_erase(&EraseRequest::file(tmp.path().join("gone"), true))
            .unwrap_err();
        assert!(matches!(err, ShredError::TargetNotFound(_)));
    }
}
