use thiserror::Error;

/// Errors from parsing foundation types.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    /// The string is not valid hex.
    #[error("invalid hex: {0}")]
    InvalidHex(String),

    /// The decoded value has the wrong length.
    #[error("invalid hash length: expected {expected} bytes, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
}
