//! Head advancement: appending local commits and installing snapshots.
//!
//! A chain advances only by appending a commit whose basis equals the
//! current head, then moving the head, both inside one write transaction.
//! The single-writer discipline makes the stale-basis check sound: between
//! the check and the commit nothing else can move the head.

use std::collections::BTreeMap;

use serde_json::Value;
use tidepool_dag::{ChunkRead, DagStore};
use tidepool_types::Hash;
use tracing::debug;

use crate::commit::CommitPayload;
use crate::error::{ChainError, ChainResult};

/// Inputs for appending one local commit.
#[derive(Clone, Debug)]
pub struct LocalWrite {
    pub mutator_name: String,
    pub mutator_args: Value,
    pub mutation_id: u64,
    pub client_id: String,
    pub timestamp_ms: u64,
    pub value_hash: Hash,
}

/// Inputs for installing a snapshot baseline.
#[derive(Clone, Debug)]
pub struct SnapshotWrite {
    pub last_mutation_ids: BTreeMap<String, u64>,
    pub cookie: Value,
    pub value_hash: Hash,
}

/// Append a local commit on `basis` and advance the head to it.
///
/// Fails with [`ChainError::WriteConflict`] if the head has moved past
/// `basis`; the caller rebases onto the current head and retries. Nothing
/// is staged when the conflict is detected.
pub async fn commit_local(
    store: &DagStore,
    head_name: &str,
    basis: Hash,
    write: LocalWrite,
) -> ChainResult<Hash> {
    let payload = CommitPayload::Local {
        basis_hash: basis,
        mutator_name: write.mutator_name,
        mutator_args: write.mutator_args,
        mutation_id: write.mutation_id,
        client_id: write.client_id,
        timestamp_ms: write.timestamp_ms,
        value_hash: write.value_hash,
    };
    let chunk = payload.to_chunk(store)?;

    let mut txn = store.write().await?;
    let current = txn.get_head(head_name).await?;
    if current != Some(basis) {
        txn.rollback().await?;
        return Err(ChainError::WriteConflict {
            head: head_name.to_string(),
            expected: Some(basis),
            actual: current,
        });
    }
    txn.put_chunk(&chunk).await?;
    txn.set_head(head_name, &chunk.hash()).await?;
    txn.commit().await?;

    debug!(
        head = head_name,
        commit = %chunk.hash().short_hex(),
        basis = %basis.short_hex(),
        "appended local commit"
    );
    Ok(chunk.hash())
}

/// Install a snapshot baseline and advance the head to it.
///
/// Produced after the server acknowledges mutations and hands back a new
/// baseline. `expected_head` is the head value the sync layer based the
/// snapshot on — `None` when creating the chain — and a mismatch is a
/// [`ChainError::WriteConflict`]. The replaced tail is not touched; it
/// simply becomes unreachable and GC-eligible.
pub async fn install_snapshot(
    store: &DagStore,
    head_name: &str,
    expected_head: Option<Hash>,
    write: SnapshotWrite,
) -> ChainResult<Hash> {
    let payload = CommitPayload::Snapshot {
        last_mutation_ids: write.last_mutation_ids,
        cookie: write.cookie,
        value_hash: write.value_hash,
    };
    let chunk = payload.to_chunk(store)?;

    let mut txn = store.write().await?;
    let current = txn.get_head(head_name).await?;
    if current != expected_head {
        txn.rollback().await?;
        return Err(ChainError::WriteConflict {
            head: head_name.to_string(),
            expected: expected_head,
            actual: current,
        });
    }
    txn.put_chunk(&chunk).await?;
    txn.set_head(head_name, &chunk.hash()).await?;
    txn.commit().await?;

    debug!(
        head = head_name,
        commit = %chunk.hash().short_hex(),
        "installed snapshot baseline"
    );
    Ok(chunk.hash())
}
