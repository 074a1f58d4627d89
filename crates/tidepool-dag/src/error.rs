use thiserror::Error;
use tidepool_kv::KvError;
use tidepool_types::Hash;

/// Errors from chunk store operations.
#[derive(Debug, Error)]
pub enum DagError {
    /// A chunk the caller's invariants guarantee to exist is absent.
    ///
    /// Signals store corruption or an illegal collection of a still
    /// reachable chunk; fatal to the current transaction or traversal.
    #[error("chunk not found: {0}")]
    NotFound(Hash),

    /// The named head does not exist.
    #[error("head not found: {0}")]
    MissingHead(String),

    /// A backend key that does not parse under the store's key layout.
    ///
    /// Fatal on a direct point lookup; namespace scans skip the entry with
    /// a diagnostic instead.
    #[error("corrupt key: {key}")]
    CorruptKey { key: String },

    /// A chunk was re-put under an existing hash with different content.
    #[error("content mismatch for chunk {hash}")]
    ContentMismatch { hash: Hash },

    /// Payload or refs encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Error from the underlying key/value backend.
    #[error(transparent)]
    Kv(#[from] KvError),
}

/// Result alias for chunk store operations.
pub type DagResult<T> = Result<T, DagError>;
