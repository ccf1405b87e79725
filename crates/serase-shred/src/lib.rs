//! serase-shred: crypto-shred pipeline and erasure orchestration
//!
//! - `pipeline`: streaming read → encrypt → overwrite → truncate, one key per run
//! - `registry`: at most one active run per target file
//! - `medium`: byte-range I/O seam (real file, dry-run, test doubles)
//! - `certificate`: certificate binder and tamper seal
//! - `render`: human-readable document and on-disk persistence
//! - `disk`: media detection and vendor erase commands
//! - `orchestrator`: single dispatch point over disk erase and file shred

pub mod certificate;
pub mod disk;
pub mod error;
pub mod medium;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod render;
pub mod run;

pub use certificate::{build_certificate, file_certificate, seal, verify_seal, Binding};
pub use disk::{CommandEraser, DevicePathProbe, DiskEraser, EraseResult, MediaProbe, SimulatedEraser};
pub use error::ShredError;
pub use medium::{DryRunMedium, FileMedium, ShredMedium};
pub use orchestrator::{EraseRequest, EraseTarget, Orchestrator};
pub use pipeline::{CancelToken, ProgressFn, RunControl, ShredPipeline, ShredReport};
pub use registry::{FileIdentity, RunGuard, RunRegistry};
pub use render::{CertificateRenderer, CertificateStore, DirectoryStore, Document, PersistedCertificate, TextRenderer};
pub use run::{ChunkEntry, PipelineStage, RunStatus, ShredRun};
