//! Non-fatal chain integrity verification.
//!
//! [`local_run`](crate::commit::local_run) treats a broken chain as a fatal
//! assertion, which is right for the read path. Diagnostics want the
//! opposite: walk the whole chain and report everything wrong with it.
//! [`ChainVerifier`] produces that report for sync-layer health checks and
//! corruption triage.

use std::collections::HashMap;

use tidepool_dag::ChunkRead;
use tidepool_types::Hash;

use crate::commit::{Commit, CommitPayload, MAX_CHAIN_LEN};
use crate::error::ChainResult;

/// Result of verifying one chain.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainReport {
    /// The head the walk started from.
    pub head: Hash,
    /// Commits examined, including the terminating snapshot if reached.
    pub commit_count: u64,
    /// Whether the walk reached a snapshot.
    pub terminated: bool,
    /// Everything wrong with the chain.
    pub violations: Vec<ChainViolation>,
}

impl ChainReport {
    /// Returns `true` if no violations were found.
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }
}

/// A specific integrity violation found while walking.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainViolation {
    /// The commit (or expected commit) where the violation was detected.
    pub hash: Hash,
    pub kind: ChainViolationKind,
    pub description: String,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChainViolationKind {
    /// A client's mutation id failed to decrease toward the snapshot.
    NonMonotonicMutation,
    /// The chain ran out without reaching a snapshot.
    MissingTerminator,
    /// A basis reference points at nothing.
    DanglingBasis,
    /// A chunk in commit position does not decode as a commit.
    MalformedCommit,
}

/// Chain integrity walker.
pub struct ChainVerifier;

impl ChainVerifier {
    /// Walk the chain from `head`, collecting violations instead of
    /// failing on the first one. Backend I/O errors still propagate.
    pub async fn verify<R: ChunkRead + ?Sized>(read: &R, head: Hash) -> ChainResult<ChainReport> {
        let mut violations = Vec::new();
        let mut last_ids: HashMap<String, u64> = HashMap::new();
        let mut commit_count = 0u64;
        let mut terminated = false;
        let mut cursor = head;

        for _ in 0..MAX_CHAIN_LEN {
            let Some(chunk) = read.get_chunk(&cursor).await? else {
                violations.push(ChainViolation {
                    hash: cursor,
                    kind: ChainViolationKind::DanglingBasis,
                    description: "commit chunk missing from store".into(),
                });
                break;
            };
            let commit = match Commit::decode(&chunk) {
                Ok(commit) => commit,
                Err(e) => {
                    violations.push(ChainViolation {
                        hash: cursor,
                        kind: ChainViolationKind::MalformedCommit,
                        description: e.to_string(),
                    });
                    break;
                }
            };
            commit_count += 1;

            match commit.payload() {
                CommitPayload::Snapshot { .. } => {
                    terminated = true;
                    break;
                }
                CommitPayload::Local {
                    basis_hash,
                    mutation_id,
                    client_id,
                    ..
                } => {
                    if let Some(&prev) = last_ids.get(client_id) {
                        if *mutation_id >= prev {
                            violations.push(ChainViolation {
                                hash: commit.hash(),
                                kind: ChainViolationKind::NonMonotonicMutation,
                                description: format!(
                                    "client {client_id}: id {mutation_id} does not decrease below {prev}"
                                ),
                            });
                        }
                    }
                    last_ids.insert(client_id.clone(), *mutation_id);
                    cursor = *basis_hash;
                }
            }
        }

        if !terminated && violations.is_empty() {
            violations.push(ChainViolation {
                hash: head,
                kind: ChainViolationKind::MissingTerminator,
                description: format!("no snapshot within {MAX_CHAIN_LEN} commits"),
            });
        }

        Ok(ChainReport {
            head,
            commit_count,
            terminated,
            violations,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;
    use tidepool_dag::DagStore;
    use tidepool_kv::MemBackend;
    use tidepool_types::FakeChunkHasher;

    use super::*;

    fn store() -> DagStore {
        DagStore::new(
            Arc::new(MemBackend::new()),
            Arc::new(FakeChunkHasher::new()),
        )
    }

    fn snapshot(value_hash: Hash) -> CommitPayload {
        CommitPayload::Snapshot {
            last_mutation_ids: BTreeMap::new(),
            cookie: json!(null),
            value_hash,
        }
    }

    fn local(basis: Hash, client: &str, id: u64, value_hash: Hash) -> CommitPayload {
        CommitPayload::Local {
            basis_hash: basis,
            mutator_name: "setItem".into(),
            mutator_args: json!({}),
            mutation_id: id,
            client_id: client.into(),
            timestamp_ms: 0,
            value_hash,
        }
    }

    async fn put_payload(store: &DagStore, payload: &CommitPayload) -> Hash {
        let chunk = payload.to_chunk(store).unwrap();
        let mut txn = store.write().await.unwrap();
        txn.put_chunk(&chunk).await.unwrap();
        txn.commit().await.unwrap();
        chunk.hash()
    }

    async fn put_value(store: &DagStore) -> Hash {
        let chunk = store.new_chunk(json!({"rows": []}), vec![]).unwrap();
        let mut txn = store.write().await.unwrap();
        txn.put_chunk(&chunk).await.unwrap();
        txn.commit().await.unwrap();
        chunk.hash()
    }

    #[tokio::test]
    async fn valid_chain_passes() {
        let store = store();
        let value = put_value(&store).await;
        let s = put_payload(&store, &snapshot(value)).await;
        let m1 = put_payload(&store, &local(s, "a", 1, value)).await;
        let m2 = put_payload(&store, &local(m1, "a", 2, value)).await;

        let txn = store.read().await.unwrap();
        let report = ChainVerifier::verify(&txn, m2).await.unwrap();
        assert!(report.is_valid());
        assert!(report.terminated);
        assert_eq!(report.commit_count, 3);
    }

    #[tokio::test]
    async fn non_monotonic_id_reported_not_fatal() {
        let store = store();
        let value = put_value(&store).await;
        let s = put_payload(&store, &snapshot(value)).await;
        let older = put_payload(&store, &local(s, "a", 5, value)).await;
        let newer = put_payload(&store, &local(older, "a", 3, value)).await;

        let txn = store.read().await.unwrap();
        let report = ChainVerifier::verify(&txn, newer).await.unwrap();
        assert!(!report.is_valid());
        // The walk continued to the snapshot despite the violation.
        assert!(report.terminated);
        assert!(report
            .violations
            .iter()
            .any(|v| v.kind == ChainViolationKind::NonMonotonicMutation));
    }

    #[tokio::test]
    async fn dangling_basis_reported() {
        let store = store();
        let value = put_value(&store).await;
        let ghost = Hash::from_raw([0xcc; 32]);
        let head = put_payload(&store, &local(ghost, "a", 1, value)).await;

        let txn = store.read().await.unwrap();
        let report = ChainVerifier::verify(&txn, head).await.unwrap();
        assert!(!report.terminated);
        assert_eq!(report.violations.len(), 1);
        assert_eq!(report.violations[0].kind, ChainViolationKind::DanglingBasis);
        assert_eq!(report.violations[0].hash, ghost);
    }

    #[tokio::test]
    async fn malformed_commit_reported() {
        let store = store();
        let junk = store.new_chunk(json!({"not": "a commit"}), vec![]).unwrap();
        let mut txn = store.write().await.unwrap();
        txn.put_chunk(&junk).await.unwrap();
        txn.commit().await.unwrap();

        let txn = store.read().await.unwrap();
        let report = ChainVerifier::verify(&txn, junk.hash()).await.unwrap();
        assert!(!report.is_valid());
        assert_eq!(
            report.violations[0].kind,
            ChainViolationKind::MalformedCommit
        );
    }

    #[tokio::test]
    async fn snapshot_head_is_a_valid_chain() {
        let store = store();
        let value = put_value(&store).await;
        let s = put_payload(&store, &snapshot(value)).await;

        let txn = store.read().await.unwrap();
        let report = ChainVerifier::verify(&txn, s).await.unwrap();
        assert!(report.is_valid());
        assert_eq!(report.commit_count, 1);
    }
}
