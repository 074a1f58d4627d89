//! Commit-aware specialization of the dag visitor.
//!
//! The dag traversal knows only chunks. [`CommitVisitor`] layers commit
//! awareness on top: chunks that decode as commits dispatch to a commit
//! hook, everything else falls through to the generic chunk hook. The
//! dedup and ordering guarantees stay in the one traversal core.

use async_trait::async_trait;
use tidepool_dag::{Chunk, ChunkRead, ChunkVisitor, DagResult, Traversal, Visit};
use tidepool_types::Hash;

use crate::commit::Commit;
use crate::error::ChainResult;

/// Hooks for a traversal that distinguishes commits from value chunks.
///
/// Defaults descend everywhere; override only the categories you care
/// about. Hooks return dag-level results so the adapter plugs straight
/// into [`Traversal`]; consumers that need chain-level verdicts accumulate
/// them in the hook state and inspect afterward.
#[async_trait]
pub trait CommitVisitor: Send {
    /// Called for each reachable chunk that decodes as a commit.
    async fn visit_commit(&mut self, commit: &Commit) -> DagResult<Visit> {
        let _ = commit;
        Ok(Visit::Descend)
    }

    /// Called for each reachable chunk that is not a commit.
    async fn visit_chunk(&mut self, chunk: &Chunk) -> DagResult<Visit> {
        let _ = chunk;
        Ok(Visit::Descend)
    }
}

/// Adapter presenting a [`CommitVisitor`] as a plain [`ChunkVisitor`].
pub struct CommitChunkAdapter<'a, V: CommitVisitor> {
    inner: &'a mut V,
}

impl<'a, V: CommitVisitor> CommitChunkAdapter<'a, V> {
    pub fn new(inner: &'a mut V) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<V: CommitVisitor> ChunkVisitor for CommitChunkAdapter<'_, V> {
    async fn visit_chunk(&mut self, chunk: &Chunk) -> DagResult<Visit> {
        match Commit::decode(chunk) {
            Ok(commit) => self.inner.visit_commit(&commit).await,
            Err(_) => self.inner.visit_chunk(chunk).await,
        }
    }
}

/// Collect every commit reachable from `head`, newest-first, without
/// descending into value trees.
pub async fn collect_commits<R: ChunkRead + ?Sized>(
    read: &R,
    head: Hash,
) -> ChainResult<Vec<Commit>> {
    struct Collector {
        commits: Vec<Commit>,
    }

    #[async_trait]
    impl CommitVisitor for Collector {
        async fn visit_commit(&mut self, commit: &Commit) -> DagResult<Visit> {
            self.commits.push(commit.clone());
            Ok(Visit::Descend)
        }

        async fn visit_chunk(&mut self, _chunk: &Chunk) -> DagResult<Visit> {
            // Value trees are opaque here; stay on the commit spine.
            Ok(Visit::Skip)
        }
    }

    let mut collector = Collector {
        commits: Vec::new(),
    };
    let mut adapter = CommitChunkAdapter::new(&mut collector);
    Traversal::new().visit(read, head, &mut adapter).await?;
    Ok(collector.commits)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;
    use tidepool_dag::DagStore;
    use tidepool_kv::MemBackend;
    use tidepool_types::FakeChunkHasher;

    use crate::commit::CommitPayload;

    use super::*;

    fn store() -> DagStore {
        DagStore::new(
            Arc::new(MemBackend::new()),
            Arc::new(FakeChunkHasher::new()),
        )
    }

    async fn put_value(store: &DagStore) -> Hash {
        let chunk = store.new_chunk(json!({"rows": [1, 2, 3]}), vec![]).unwrap();
        let mut txn = store.write().await.unwrap();
        txn.put_chunk(&chunk).await.unwrap();
        txn.commit().await.unwrap();
        chunk.hash()
    }

    async fn put_payload(store: &DagStore, payload: &CommitPayload) -> Hash {
        let chunk = payload.to_chunk(store).unwrap();
        let mut txn = store.write().await.unwrap();
        txn.put_chunk(&chunk).await.unwrap();
        txn.commit().await.unwrap();
        chunk.hash()
    }

    async fn chain(store: &DagStore) -> (Hash, Hash, Hash, Hash) {
        let value = put_value(store).await;
        let s = put_payload(
            store,
            &CommitPayload::Snapshot {
                last_mutation_ids: BTreeMap::new(),
                cookie: json!(null),
                value_hash: value,
            },
        )
        .await;
        let m1 = put_payload(
            store,
            &CommitPayload::Local {
                basis_hash: s,
                mutator_name: "m1".into(),
                mutator_args: json!({}),
                mutation_id: 1,
                client_id: "a".into(),
                timestamp_ms: 0,
                value_hash: value,
            },
        )
        .await;
        let m2 = put_payload(
            store,
            &CommitPayload::Local {
                basis_hash: m1,
                mutator_name: "m2".into(),
                mutator_args: json!({}),
                mutation_id: 2,
                client_id: "a".into(),
                timestamp_ms: 0,
                value_hash: value,
            },
        )
        .await;
        (value, s, m1, m2)
    }

    #[tokio::test]
    async fn collects_commit_spine_newest_first() {
        let store = store();
        let (_value, s, m1, m2) = chain(&store).await;

        let txn = store.read().await.unwrap();
        let commits = collect_commits(&txn, m2).await.unwrap();
        let hashes: Vec<Hash> = commits.iter().map(Commit::hash).collect();
        assert_eq!(hashes, vec![m2, m1, s]);
    }

    #[tokio::test]
    async fn value_chunks_route_to_generic_hook() {
        let store = store();
        let (value, _s, _m1, m2) = chain(&store).await;

        struct Split {
            commits: usize,
            values: Vec<Hash>,
        }

        #[async_trait]
        impl CommitVisitor for Split {
            async fn visit_commit(&mut self, _commit: &Commit) -> DagResult<Visit> {
                self.commits += 1;
                Ok(Visit::Descend)
            }

            async fn visit_chunk(&mut self, chunk: &Chunk) -> DagResult<Visit> {
                self.values.push(chunk.hash());
                Ok(Visit::Descend)
            }
        }

        let txn = store.read().await.unwrap();
        let mut split = Split {
            commits: 0,
            values: vec![],
        };
        let mut adapter = CommitChunkAdapter::new(&mut split);
        Traversal::new().visit(&txn, m2, &mut adapter).await.unwrap();

        assert_eq!(split.commits, 3);
        // One shared value chunk, visited once despite three parents.
        assert_eq!(split.values, vec![value]);
    }
}
