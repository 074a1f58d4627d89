use thiserror::Error;
use tidepool_dag::DagError;
use tidepool_types::Hash;

/// Errors from commit-chain operations.
#[derive(Debug, Error)]
pub enum ChainError {
    /// Error from the underlying chunk store.
    #[error(transparent)]
    Dag(#[from] DagError),

    /// A chunk that should be a commit does not decode as one.
    #[error("malformed commit {hash}: {reason}")]
    MalformedCommit { hash: Hash, reason: String },

    /// Durable corruption of the chain structure: non-monotonic mutation
    /// ids or a chain that never reaches a snapshot. Fatal, never retried.
    #[error("chain invariant violated at {hash}: {reason}")]
    InvariantViolation { hash: Hash, reason: String },

    /// A head update whose intended basis is stale relative to the current
    /// head. The caller rebases and retries; the store never silently
    /// overwrites.
    #[error("write conflict on head '{head}': expected {expected:?}, found {actual:?}")]
    WriteConflict {
        head: String,
        expected: Option<Hash>,
        actual: Option<Hash>,
    },

    /// Payload encoding failure.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for commit-chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
