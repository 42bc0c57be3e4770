use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("External tool unavailable: {0}")]
    ToolUnavailable(String),
    #[error("Policy file not found: {0}")]
    NotFound(PathBuf),
    #[error("Malformed entry in {path} line {line}: {entry:?}")]
    Malformed {
        path: PathBuf,
        line: usize,
        entry: String,
    },
    #[error("Policy store is locked by another writer: {0}")]
    Locked(PathBuf),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
