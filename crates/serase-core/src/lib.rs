pub mod config;
pub mod error;
pub mod types;

pub use error::{SeraseError, SeraseResult};
pub use types::{CertificateRecord, EraseMode, MediaKind, Operation, Outcome};
