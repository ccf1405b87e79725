//! Active-run registry: at most one shred per target file at a time.
//!
//! Targets are keyed by file identity (device + inode on Unix), so hard
//! links and other aliases of the same file share one claim.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::ShredError;

/// Identity of a shred target.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FileIdentity {
    Inode { dev: u64, ino: u64 },
    /// Fallback when the target cannot be stat'ed (or off Unix)
    Path(PathBuf),
}

impl FileIdentity {
    pub fn of(path: &Path) -> Self {
        #[cfg(unix)]
        {
            use std::os::unix::fs::MetadataExt;
            if let Ok(meta) = std::fs::metadata(path) {
                return FileIdentity::Inode {
                    dev: meta.dev(),
                    ino: meta.ino(),
                };
            }
        }
        FileIdentity::Path(path.to_path_buf())
    }
}

/// Shared set of targets with a run in progress. Cheap to clone; clones
/// share the same set.
#[derive(Debug, Clone, Default)]
pub struct RunRegistry {
    active: Arc<Mutex<HashSet<FileIdentity>>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashSet<FileIdentity>> {
        self.active.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim `target` for a new run. The claim is released when the returned
    /// guard is dropped.
    pub fn claim(&self, target: &Path) -> Result<RunGuard, ShredError> {
        let identity = FileIdentity::of(target);
        let mut active = self.lock();
        if !active.insert(identity.clone()) {
            tracing::warn!(target = %target.display(), "rejecting concurrent shred request");
            return Err(ShredError::RunConflict {
                target: target.to_path_buf(),
            });
        }
        Ok(RunGuard {
            registry: self.clone(),
            identity,
            target: target.to_path_buf(),
        })
    }

    pub fn is_active(&self, target: &Path) -> bool {
        self.lock().contains(&FileIdentity::of(target))
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }
}

/// Exclusive claim on one target.
#[derive(Debug)]
pub struct RunGuard {
    registry: RunRegistry,
    identity: FileIdentity,
    target: PathBuf,
}

impl RunGuard {
    pub fn target(&self) -> &Path {
        &self.target
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.identity);
    }
}
