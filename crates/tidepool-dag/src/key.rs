//! Durable key layout for the chunk store.
//!
//! Each chunk occupies two backend entries so a GC pass can enumerate and
//! update liveness metadata without deserializing payloads:
//!
//! - `chunk-data:<hex>` — the serialized payload
//! - `chunk-refs:<hex>` — the ordered list of child hash strings
//!
//! Heads live in a disjoint namespace keyed by name: `head:<name>`.

use tidepool_types::Hash;

use crate::error::{DagError, DagResult};

/// Prefix for chunk payload entries.
pub const CHUNK_DATA_PREFIX: &str = "chunk-data:";
/// Prefix for chunk refs entries.
pub const CHUNK_REFS_PREFIX: &str = "chunk-refs:";
/// Prefix for head entries.
pub const HEAD_PREFIX: &str = "head:";

/// A parsed backend key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Key {
    /// Payload entry for a chunk.
    ChunkData(Hash),
    /// Refs entry for a chunk.
    ChunkRefs(Hash),
    /// Head pointer entry.
    Head(String),
}

impl Key {
    /// The data key for a chunk.
    pub fn chunk_data(hash: &Hash) -> String {
        format!("{CHUNK_DATA_PREFIX}{hash}")
    }

    /// The refs key for a chunk.
    pub fn chunk_refs(hash: &Hash) -> String {
        format!("{CHUNK_REFS_PREFIX}{hash}")
    }

    /// The key for a named head.
    pub fn head(name: &str) -> String {
        format!("{HEAD_PREFIX}{name}")
    }

    /// Encode back to the backend key string.
    pub fn encode(&self) -> String {
        match self {
            Self::ChunkData(hash) => Self::chunk_data(hash),
            Self::ChunkRefs(hash) => Self::chunk_refs(hash),
            Self::Head(name) => Self::head(name),
        }
    }

    /// Classify a backend key.
    ///
    /// Returns [`DagError::CorruptKey`] for anything outside the layout.
    /// Point-lookup callers propagate that as fatal; namespace scans catch
    /// it and skip the entry instead.
    pub fn parse(key: &str) -> DagResult<Self> {
        if let Some(hex) = key.strip_prefix(CHUNK_DATA_PREFIX) {
            return Ok(Self::ChunkData(parse_hash(key, hex)?));
        }
        if let Some(hex) = key.strip_prefix(CHUNK_REFS_PREFIX) {
            return Ok(Self::ChunkRefs(parse_hash(key, hex)?));
        }
        if let Some(name) = key.strip_prefix(HEAD_PREFIX) {
            if name.is_empty() {
                return Err(DagError::CorruptKey {
                    key: key.to_string(),
                });
            }
            return Ok(Self::Head(name.to_string()));
        }
        Err(DagError::CorruptKey {
            key: key.to_string(),
        })
    }
}

fn parse_hash(key: &str, hex: &str) -> DagResult<Hash> {
    Hash::parse(hex).map_err(|_| DagError::CorruptKey {
        key: key.to_string(),
    })
}
