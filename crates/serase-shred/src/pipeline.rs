//! Shred pipeline: one file, one key, one run
//!
//! ```text
//! claim target ─► open + lock medium ─► generate + consume key
//!   loop per chunk: [cancel?] read ─► encrypt ─► overwrite same range ─► log entry
//!   EOF: truncate to processed length ─► fsync
//! capture fingerprint ─► destroy key ─► Completed | Failed | Aborted
//! ```
//!
//! The fingerprint and the key destruction run on every path, including open
//! failures, mid-file I/O errors and cancellation. Chunks already overwritten
//! are never reverted.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use serase_core::config::ShredConfig;
use serase_core::EraseMode;
use serase_crypto::{
    capture_fingerprint, decrypt_chunk, encrypt_chunk, generate_salt, ConsumedKey, KeyLifecycle,
    RunMetadata,
};

use crate::error::ShredError;
use crate::medium::{DryRunMedium, FileMedium, ShredMedium};
use crate::registry::RunRegistry;
use crate::run::{ChunkEntry, PipelineStage, ShredRun};

/// Progress callback type (bytes_done, bytes_total, message)
pub type ProgressFn = Box<dyn Fn(u64, u64, &str) + Send + Sync>;

/// Cooperative cancellation flag, honored at chunk boundaries.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Caller-side hooks for a single run.
#[derive(Default)]
pub struct RunControl<'a> {
    pub cancel: Option<CancelToken>,
    pub progress: Option<&'a ProgressFn>,
}

/// Terminal run plus the error that ended it, if any.
#[derive(Debug)]
pub struct ShredReport {
    pub run: ShredRun,
    pub error: Option<ShredError>,
}

impl ShredReport {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct ShredPipeline {
    chunk_size: usize,
    verify_dry_run: bool,
    timeout: Option<Duration>,
    registry: RunRegistry,
}

impl ShredPipeline {
    pub fn new(config: &ShredConfig) -> Self {
        Self {
            chunk_size: config.chunk_size.max(1),
            verify_dry_run: config.verify_dry_run,
            timeout: config.timeout_secs.map(Duration::from_secs),
            registry: RunRegistry::new(),
        }
    }

    /// Share an existing registry (e.g. across several pipelines).
    pub fn with_registry(mut self, registry: RunRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry(&self) -> &RunRegistry {
        &self.registry
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// Canonicalize `path` and check it names an existing regular file.
    pub fn resolve_target(path: &Path) -> Result<PathBuf, ShredError> {
        let canonical = match std::fs::canonicalize(path) {
            Ok(p) => p,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ShredError::TargetNotFound(path.to_path_buf()))
            }
            Err(source) => {
                return Err(ShredError::Io {
                    context: "resolve",
                    chunks_completed: 0,
                    bytes_completed: 0,
                    source,
                })
            }
        };
        let meta = std::fs::metadata(&canonical).map_err(|source| ShredError::Io {
            context: "stat",
            chunks_completed: 0,
            bytes_completed: 0,
            source,
        })?;
        if !meta.is_file() {
            return Err(ShredError::NotARegularFile(canonical));
        }
        Ok(canonical)
    }

    /// Shred the file at `path`.
    ///
    /// Returns `Err` only when the request is rejected before a run starts
    /// (missing target, not a regular file, run conflict). A target locked
    /// by another process or another alias counts as a run conflict. Every
    /// accepted request returns a terminal report, successful or not.
    pub fn shred(
        &self,
        path: &Path,
        mode: EraseMode,
        control: &RunControl<'_>,
    ) -> Result<ShredReport, ShredError> {
        let target = Self::resolve_target(path)?;
        let _guard = self.registry.claim(&target)?;

        let report = match mode {
            EraseMode::Real => {
                let opened = open_locked(&target, FileMedium::open)?;
                self.execute(&target, mode, move || opened, control)
            }
            EraseMode::DryRun => {
                let opened = open_locked(&target, DryRunMedium::open)?;
                self.execute(&target, mode, move || opened, control)
            }
        };
        Ok(report)
    }

    /// Shred `target` through a caller-supplied medium.
    pub fn shred_on<M: ShredMedium>(
        &self,
        target: &Path,
        mode: EraseMode,
        medium: M,
        control: &RunControl<'_>,
    ) -> Result<ShredReport, ShredError> {
        let _guard = self.registry.claim(target)?;
        Ok(self.execute(target, mode, move || Ok(medium), control))
    }

    fn execute<M, F>(
        &self,
        target: &Path,
        mode: EraseMode,
        open: F,
        control: &RunControl<'_>,
    ) -> ShredReport
    where
        M: ShredMedium,
        F: FnOnce() -> io::Result<M>,
    {
        let mut run = ShredRun::new(target, mode, self.chunk_size, generate_salt());
        info!(
            run_id = %run.id,
            target = %target.display(),
            mode = %mode,
            chunk_size = self.chunk_size,
            "shred run started"
        );

        let mut key = KeyLifecycle::generate();
        let handle = match key.consume() {
            Ok(handle) => handle,
            Err(e) => {
                run.fail(e.to_string());
                return ShredReport {
                    run,
                    error: Some(e.into()),
                };
            }
        };

        let streamed = match open() {
            Ok(mut medium) => self.stream(&mut run, &mut medium, &handle, control),
            Err(source) => Err(ShredError::Io {
                context: "open",
                chunks_completed: 0,
                bytes_completed: 0,
                source,
            }),
        };

        // Fingerprint strictly before destruction, on every path.
        let meta = RunMetadata {
            run_id: run.id,
            salt: run.salt,
            target: target.display().to_string(),
            original_size: run.original_size,
        };
        let fingerprint = capture_fingerprint(&handle, &meta);
        let destroyed = key.destroy(&handle);
        drop(key);
        run.key_destroyed = handle.is_destroyed();

        let mut error = streamed.err();
        match fingerprint {
            Ok(fp) => run.fingerprint = Some(fp),
            Err(e) => {
                warn!(run_id = %run.id, "fingerprint capture failed: {e}");
                error.get_or_insert(e.into());
            }
        }
        if let Err(e) = destroyed {
            warn!(run_id = %run.id, "explicit key destruction failed: {e}");
            error.get_or_insert(e.into());
        }

        match &error {
            None => run.complete(),
            Some(ShredError::Cancelled(reason)) => run.abort(reason.clone()),
            Some(e) => run.fail(e.to_string()),
        }

        match &error {
            None => info!(
                run_id = %run.id,
                chunks = run.chunks_completed(),
                bytes = run.original_size,
                mode = %mode,
                "shred run completed"
            ),
            Some(e) => warn!(
                run_id = %run.id,
                chunks = run.chunks_completed(),
                bytes = run.bytes_completed(),
                stage = ?run.stage,
                "shred run ended early: {e}"
            ),
        }

        ShredReport { run, error }
    }

    fn stream<M: ShredMedium>(
        &self,
        run: &mut ShredRun,
        medium: &mut M,
        key: &ConsumedKey,
        control: &RunControl<'_>,
    ) -> Result<(), ShredError> {
        let started = Instant::now();
        let salt = run.salt;

        let total = medium.size().map_err(|e| io_failure("stat", run, e))?;
        run.original_size = total;

        let mut buf = Zeroizing::new(vec![0u8; self.chunk_size]);
        let mut offset = 0u64;
        let mut index = 0u64;

        while offset < total {
            self.check_cancel(control, started)?;

            let len = (total - offset).min(self.chunk_size as u64) as usize;

            run.advance(PipelineStage::Reading);
            medium
                .read_exact_at(offset, &mut buf[..len])
                .map_err(|e| io_failure("read", run, e))?;

            run.advance(PipelineStage::Encrypting);
            let record = encrypt_chunk(key, &salt, index, &buf[..len], self.chunk_size)?;

            if run.mode.is_dry_run() && self.verify_dry_run && index == 0 {
                let opened = Zeroizing::new(decrypt_chunk(key, &salt, &record)?);
                if opened[..] != buf[..len] {
                    return Err(ShredError::VerificationMismatch { index });
                }
                debug!(run_id = %run.id, "dry-run: first chunk verified");
            }

            run.advance(PipelineStage::Overwriting);
            medium
                .write_all_at(offset, &record.ciphertext)
                .map_err(|e| io_failure("overwrite", run, e))?;

            run.record_chunk(ChunkEntry {
                index,
                offset,
                len: len as u64,
                nonce: record.nonce,
                tag: record.tag,
            });
            offset += len as u64;
            index += 1;

            debug!(run_id = %run.id, index = index - 1, offset, len, "chunk shredded");
            if let Some(cb) = control.progress {
                cb(offset, total, "shredding");
            }
        }

        run.advance(PipelineStage::Finalizing);
        medium
            .truncate(offset)
            .map_err(|e| io_failure("truncate", run, e))?;
        medium.sync().map_err(|e| io_failure("sync", run, e))?;
        Ok(())
    }

    fn check_cancel(&self, control: &RunControl<'_>, started: Instant) -> Result<(), ShredError> {
        if control.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
            return Err(ShredError::Cancelled("cancellation requested".into()));
        }
        if let Some(timeout) = self.timeout {
            if started.elapsed() >= timeout {
                return Err(ShredError::Cancelled(format!(
                    "timed out after {}s",
                    timeout.as_secs()
                )));
            }
        }
        Ok(())
    }
}

/// Open the medium up front so a held lock rejects the request instead of
/// failing a run. Other open errors are handed to the run.
fn open_locked<M>(
    target: &Path,
    open: impl FnOnce(&Path) -> io::Result<M>,
) -> Result<io::Result<M>, ShredError> {
    match open(target) {
        Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
            warn!(target = %target.display(), "target is locked by another shred");
            Err(ShredError::RunConflict {
                target: target.to_path_buf(),
            })
        }
        opened => Ok(opened),
    }
}

fn io_failure(context: &'static str, run: &ShredRun, source: io::Error) -> ShredError {
    ShredError::Io {
        context,
        chunks_completed: run.chunks_completed(),
        bytes_completed: run.bytes_completed(),
        source,
    }
}
