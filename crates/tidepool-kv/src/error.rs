use thiserror::Error;

/// Errors from backend key/value operations.
#[derive(Debug, Error)]
pub enum KvError {
    /// I/O failure in the underlying storage.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend-specific failure (lock poisoning, closed handles, ...).
    #[error("backend error: {0}")]
    Backend(String),
}

/// Result alias for backend operations.
pub type KvResult<T> = Result<T, KvError>;
