//! Pending mutations: the replay backlog exposed to the sync transport.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tidepool_dag::ChunkRead;

use crate::commit::{local_run, CommitPayload, DEFAULT_HEAD_NAME};
use crate::error::ChainResult;

/// A local commit not yet acknowledged by the remote endpoint, projected
/// to what the endpoint needs to re-apply it. Derived, never stored.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingMutation {
    /// Per-client mutation sequence number.
    pub id: u64,
    /// Mutator name.
    pub name: String,
    /// Mutator arguments, verbatim.
    pub args: Value,
    /// The client that applied the mutation.
    pub client_id: String,
}

/// The pending mutations on the default head, oldest application first.
///
/// The chain is naturally walked newest-first from the head; the result is
/// reversed so a remote endpoint can re-apply or acknowledge in original
/// application order.
pub async fn pending_mutations_for_api<R: ChunkRead + ?Sized>(
    read: &R,
) -> ChainResult<Vec<PendingMutation>> {
    let head = read.must_get_head(DEFAULT_HEAD_NAME).await?;
    let run = local_run(read, head).await?;
    let mut pending: Vec<PendingMutation> = run
        .into_iter()
        .filter_map(|commit| match commit.into_payload() {
            CommitPayload::Local {
                mutator_name,
                mutator_args,
                mutation_id,
                client_id,
                ..
            } => Some(PendingMutation {
                id: mutation_id,
                name: mutator_name,
                args: mutator_args,
                client_id,
            }),
            CommitPayload::Snapshot { .. } => None,
        })
        .collect();
    pending.reverse();
    Ok(pending)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::Arc;

    use serde_json::json;
    use tidepool_dag::{DagError, DagStore};
    use tidepool_kv::MemBackend;
    use tidepool_types::{FakeChunkHasher, Hash};

    use crate::error::ChainError;
    use crate::write::{commit_local, install_snapshot, LocalWrite, SnapshotWrite};

    use super::*;

    fn store() -> DagStore {
        DagStore::new(
            Arc::new(MemBackend::new()),
            Arc::new(FakeChunkHasher::new()),
        )
    }

    async fn put_value(store: &DagStore) -> Hash {
        let chunk = store.new_chunk(json!({"rows": []}), vec![]).unwrap();
        let mut txn = store.write().await.unwrap();
        txn.put_chunk(&chunk).await.unwrap();
        txn.commit().await.unwrap();
        chunk.hash()
    }

    async fn base_snapshot(store: &DagStore, value: Hash) -> Hash {
        install_snapshot(
            store,
            DEFAULT_HEAD_NAME,
            None,
            SnapshotWrite {
                last_mutation_ids: BTreeMap::new(),
                cookie: json!(null),
                value_hash: value,
            },
        )
        .await
        .unwrap()
    }

    async fn append(
        store: &DagStore,
        basis: Hash,
        client: &str,
        id: u64,
        name: &str,
        value: Hash,
    ) -> Hash {
        commit_local(
            store,
            DEFAULT_HEAD_NAME,
            basis,
            LocalWrite {
                mutator_name: name.into(),
                mutator_args: json!({"seq": id}),
                mutation_id: id,
                client_id: client.into(),
                timestamp_ms: 1_700_000_000_000 + id,
                value_hash: value,
            },
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn returns_oldest_application_first() {
        let store = store();
        let value = put_value(&store).await;
        let s = base_snapshot(&store, value).await;
        let m1 = append(&store, s, "clientA", 1, "m1", value).await;
        let m2 = append(&store, m1, "clientA", 2, "m2", value).await;
        let _m3 = append(&store, m2, "clientB", 1, "m3", value).await;

        let txn = store.read().await.unwrap();
        let pending = pending_mutations_for_api(&txn).await.unwrap();
        let names: Vec<&str> = pending.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["m1", "m2", "m3"]);
        assert_eq!(pending[0].client_id, "clientA");
        assert_eq!(pending[2].client_id, "clientB");
        assert_eq!(pending[0].args, json!({"seq": 1}));
    }

    #[tokio::test]
    async fn snapshot_only_chain_has_no_pending() {
        let store = store();
        let value = put_value(&store).await;
        base_snapshot(&store, value).await;

        let txn = store.read().await.unwrap();
        assert!(pending_mutations_for_api(&txn).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn missing_default_head_is_an_error() {
        let store = store();
        let txn = store.read().await.unwrap();
        let err = pending_mutations_for_api(&txn).await.unwrap_err();
        assert!(matches!(
            err,
            ChainError::Dag(DagError::MissingHead(name)) if name == DEFAULT_HEAD_NAME
        ));
    }

    #[tokio::test]
    async fn new_snapshot_clears_the_backlog() {
        let store = store();
        let value = put_value(&store).await;
        let s = base_snapshot(&store, value).await;
        let m1 = append(&store, s, "clientA", 1, "m1", value).await;

        // Server acknowledged m1: install the new baseline.
        install_snapshot(
            &store,
            DEFAULT_HEAD_NAME,
            Some(m1),
            SnapshotWrite {
                last_mutation_ids: BTreeMap::from([("clientA".into(), 1)]),
                cookie: json!({"cursor": "v2"}),
                value_hash: value,
            },
        )
        .await
        .unwrap();

        let txn = store.read().await.unwrap();
        assert!(pending_mutations_for_api(&txn).await.unwrap().is_empty());
    }
}
