use thiserror::Error;

pub type SeraseResult<T> = Result<T, SeraseError>;

#[derive(Debug, Error)]
pub enum SeraseError {
    #[error("config error: {0}")]
    Config(String),

    #[error("certificate error: {0}")]
    Certificate(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}
