//! Byte-range I/O seam for the shred pipeline.
//!
//! `FileMedium` overwrites the real file in place. `DryRunMedium` opens the
//! file read-only and only counts what a real run would have written, so a
//! dry run walks the same code path without touching storage.
//!
//! Both take an exclusive, non-blocking OS lock on open, so another process
//! (or another alias of the same file) cannot shred it concurrently. A held
//! lock surfaces as `io::ErrorKind::WouldBlock`.

use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::Path;

/// Positional access to the bytes being shredded.
pub trait ShredMedium {
    /// Current size of the target in bytes
    fn size(&mut self) -> io::Result<u64>;

    /// Fill `buf` with the bytes at `offset`.
    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()>;

    /// Overwrite the bytes at `offset` with `data` (never appends past the
    /// range being replaced).
    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()>;

    /// Cut the target down to `len` bytes.
    fn truncate(&mut self, len: u64) -> io::Result<()>;

    /// Flush data and metadata to stable storage.
    fn sync(&mut self) -> io::Result<()>;
}

/// Exclusive advisory lock, released when `file` is closed.
fn lock_exclusive(file: &File) -> io::Result<()> {
    match file.try_lock() {
        Ok(()) => Ok(()),
        Err(TryLockError::WouldBlock) => Err(io::Error::new(
            io::ErrorKind::WouldBlock,
            "target is locked by another shred",
        )),
        Err(TryLockError::Error(e)) => Err(e),
    }
}

/// Read-write handle on a regular file.
#[derive(Debug)]
pub struct FileMedium {
    file: File,
}

impl FileMedium {
    /// Open an existing file for in-place overwrite. Never creates or
    /// truncates on open.
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        lock_exclusive(&file)?;
        Ok(Self { file })
    }
}

impl ShredMedium for FileMedium {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(data)
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.file.set_len(len)
    }

    fn sync(&mut self) -> io::Result<()> {
        self.file.sync_all()
    }
}

/// Read-only handle that simulates every mutation.
#[derive(Debug)]
pub struct DryRunMedium {
    file: File,
    simulated_writes: u64,
    simulated_bytes: u64,
    simulated_truncate: Option<u64>,
}

impl DryRunMedium {
    pub fn open(path: &Path) -> io::Result<Self> {
        let file = File::open(path)?;
        lock_exclusive(&file)?;
        Ok(Self {
            file,
            simulated_writes: 0,
            simulated_bytes: 0,
            simulated_truncate: None,
        })
    }

    /// Number of chunk overwrites a real run would have issued
    pub fn simulated_writes(&self) -> u64 {
        self.simulated_writes
    }

    pub fn simulated_bytes(&self) -> u64 {
        self.simulated_bytes
    }

    pub fn simulated_truncate(&self) -> Option<u64> {
        self.simulated_truncate
    }
}

impl ShredMedium for DryRunMedium {
    fn size(&mut self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    fn read_exact_at(&mut self, offset: u64, buf: &mut [u8]) -> io::Result<()> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.file.read_exact(buf)
    }

    fn write_all_at(&mut self, offset: u64, data: &[u8]) -> io::Result<()> {
        tracing::trace!(offset, len = data.len(), "dry-run: skipping overwrite");
        self.simulated_writes += 1;
        self.simulated_bytes += data.len() as u64;
        Ok(())
    }

    fn truncate(&mut self, len: u64) -> io::Result<()> {
        tracing::trace!(len, "dry-run: skipping truncate");
        self.simulated_truncate = Some(len);
        Ok(())
    }

    fn sync(&mut self) -> io::Result<()> {
        Ok(())
    }
}
