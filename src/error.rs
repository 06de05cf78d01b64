use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("{0}")]
    InvalidMode(String),

    #[error("file exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("file was created during writing: {0}")]
    RaceCondition(PathBuf),

    #[error("failed to parse record: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("no further record in stream")]
    EndOfStream,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("invalid glob pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

pub type Result<T> = std::result::Result<T, StoreError>;
