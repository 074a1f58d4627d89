//! Commits: the chain-level interpretation of chunks.
//!
//! A commit is a chunk whose payload decodes to one of two variants. A
//! `snapshot` anchors a chain — the synced baseline installed after server
//! acknowledgment. A `local` layers one applied-but-unacknowledged write on
//! its basis. Every chain reads `head → (local)* → snapshot`; older
//! commits are never mutated, they just fall out of reachability when a
//! new snapshot lands.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidepool_dag::{Chunk, ChunkRead, DagStore};
use tidepool_types::Hash;

use crate::error::{ChainError, ChainResult};

/// The head every client-facing operation resolves by default.
pub const DEFAULT_HEAD_NAME: &str = "main";

/// Upper bound on a chain walk. A chain that has not reached its snapshot
/// within this many commits is corrupt, not merely long.
pub const MAX_CHAIN_LEN: usize = 65536;

/// Payload of a commit chunk.
///
/// Consumers match exhaustively; there is no optional-field middle ground
/// between the variants.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CommitPayload {
    /// Synced baseline. Has no basis; the chain ends here.
    Snapshot {
        /// Highest acknowledged mutation id per client.
        last_mutation_ids: BTreeMap<String, u64>,
        /// Opaque server cursor handed back on the next pull.
        cookie: Value,
        /// Root of the value tree at this baseline.
        value_hash: Hash,
    },
    /// One applied local write layered on its basis.
    Local {
        /// The commit this write is layered on.
        basis_hash: Hash,
        /// Name of the mutator that produced the write.
        mutator_name: String,
        /// The mutator's arguments, replayed verbatim on push.
        mutator_args: Value,
        /// Per-client sequence number, strictly increasing in application
        /// order.
        mutation_id: u64,
        /// The client that applied the write.
        client_id: String,
        /// Wall-clock milliseconds at application, caller-supplied.
        timestamp_ms: u64,
        /// Root of the value tree after this write.
        value_hash: Hash,
    },
}

impl CommitPayload {
    /// The child references a commit chunk carries: the value root, plus
    /// the basis for local commits.
    pub fn refs(&self) -> Vec<Hash> {
        match self {
            Self::Snapshot { value_hash, .. } => vec![*value_hash],
            Self::Local {
                basis_hash,
                value_hash,
                ..
            } => vec![*basis_hash, *value_hash],
        }
    }

    /// Encode into a chunk through the store's hasher.
    pub fn to_chunk(&self, store: &DagStore) -> ChainResult<Chunk> {
        let data =
            serde_json::to_value(self).map_err(|e| ChainError::Serialization(e.to_string()))?;
        Ok(store.new_chunk(data, self.refs())?)
    }
}

/// A decoded commit, paired with the hash of its chunk.
#[derive(Clone, Debug, PartialEq)]
pub struct Commit {
    hash: Hash,
    payload: CommitPayload,
}

impl Commit {
    /// Decode a chunk as a commit.
    pub fn decode(chunk: &Chunk) -> ChainResult<Self> {
        let payload: CommitPayload = serde_json::from_value(chunk.data().clone()).map_err(|e| {
            ChainError::MalformedCommit {
                hash: chunk.hash(),
                reason: e.to_string(),
            }
        })?;
        Ok(Self {
            hash: chunk.hash(),
            payload,
        })
    }

    /// Fetch and decode the commit at `hash`, which must exist.
    pub async fn from_hash<R: ChunkRead + ?Sized>(read: &R, hash: Hash) -> ChainResult<Self> {
        let chunk = read.must_get_chunk(&hash).await?;
        Self::decode(&chunk)
    }

    /// The commit chunk's hash.
    pub fn hash(&self) -> Hash {
        self.hash
    }

    /// The decoded payload.
    pub fn payload(&self) -> &CommitPayload {
        &self.payload
    }

    /// Consume into the payload.
    pub fn into_payload(self) -> CommitPayload {
        self.payload
    }

    /// The basis this commit is layered on; `None` for snapshots.
    pub fn basis_hash(&self) -> Option<Hash> {
        match &self.payload {
            CommitPayload::Snapshot { .. } => None,
            CommitPayload::Local { basis_hash, .. } => Some(*basis_hash),
        }
    }

    /// Root of the value tree at this commit.
    pub fn value_hash(&self) -> Hash {
        match &self.payload {
            CommitPayload::Snapshot { value_hash, .. }
            | CommitPayload::Local { value_hash, .. } => *value_hash,
        }
    }

    /// Whether this is a local (unacknowledged) commit.
    pub fn is_local(&self) -> bool {
        matches!(self.payload, CommitPayload::Local { .. })
    }

    /// Whether this is a snapshot baseline.
    pub fn is_snapshot(&self) -> bool {
        matches!(self.payload, CommitPayload::Snapshot { .. })
    }
}

/// Collect the run of local commits from `head` down to (excluding) the
/// first snapshot, newest-first.
///
/// Validates per-client mutation-id descent while walking: ids must
/// strictly decrease from head toward the snapshot, mirroring strict
/// increase in application order. Any violation, and any chain that fails
/// to reach a snapshot within [`MAX_CHAIN_LEN`] commits, is fatal
/// [`ChainError::InvariantViolation`].
pub async fn local_run<R: ChunkRead + ?Sized>(read: &R, head: Hash) -> ChainResult<Vec<Commit>> {
    let mut run = Vec::new();
    let mut last_ids: HashMap<String, u64> = HashMap::new();
    let mut cursor = head;

    for _ in 0..MAX_CHAIN_LEN {
        let commit = Commit::from_hash(read, cursor).await?;
        let (basis, id, client) = match commit.payload() {
            CommitPayload::Snapshot { .. } => return Ok(run),
            CommitPayload::Local {
                basis_hash,
                mutation_id,
                client_id,
                ..
            } => (*basis_hash, *mutation_id, client_id.clone()),
        };

        if let Some(&prev) = last_ids.get(&client) {
            if id >= prev {
                return Err(ChainError::InvariantViolation {
                    hash: commit.hash(),
                    reason: format!(
                        "mutation id {id} for client {client} does not decrease below {prev}"
                    ),
                });
            }
        }
        last_ids.insert(client, id);
        run.push(commit);
        cursor = basis;
    }

    Err(ChainError::InvariantViolation {
        hash: head,
        reason: format!("no snapshot within {MAX_CHAIN_LEN} commits"),
    })
}
