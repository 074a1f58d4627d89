use serde_json::Value;
use tidepool_types::{ChunkHasher, Hash};

use crate::error::{DagError, DagResult};

/// An immutable, hash-identified node in the chunk graph.
///
/// A chunk is a payload plus an ordered set of child hashes. Once written,
/// its `(data, refs)` never change under its hash; the store is the sole
/// owner of chunk content and every other component holds hashes only.
/// The payload is an opaque serializable value — the store never inspects
/// it, only `(hash, refs)`.
#[derive(Clone, Debug, PartialEq)]
pub struct Chunk {
    hash: Hash,
    data: Value,
    refs: Vec<Hash>,
}

impl Chunk {
    /// Build a new chunk, deriving its hash from `(data, refs)` through the
    /// injected hasher. Refs are normalized to an ordered set (sorted,
    /// deduplicated) before hashing.
    pub fn new(hasher: &dyn ChunkHasher, data: Value, refs: Vec<Hash>) -> DagResult<Self> {
        let refs = normalize_refs(refs);
        let bytes = encode_payload(&data)?;
        let hash = hasher.hash_chunk(&bytes, &refs);
        Ok(Self { hash, data, refs })
    }

    /// Reassemble a chunk read back from the store. The stored refs order
    /// is trusted as-is.
    pub fn from_parts(hash: Hash, data: Value, refs: Vec<Hash>) -> Self {
        Self { hash, data, refs }
    }

    /// The content-derived identifier.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The opaque payload.
    pub fn data(&self) -> &Value {
        &self.data
    }

    /// Ordered child references.
    pub fn refs(&self) -> &[Hash] {
        &self.refs
    }

    /// The serialized payload bytes as stored in the backend.
    pub fn data_bytes(&self) -> DagResult<Vec<u8>> {
        encode_payload(&self.data)
    }
}

fn encode_payload(data: &Value) -> DagResult<Vec<u8>> {
    serde_json::to_vec(data).map_err(|e| DagError::Serialization(e.to_string()))
}

fn normalize_refs(mut refs: Vec<Hash>) -> Vec<Hash> {
    refs.sort();
    refs.dedup();
    refs
}
