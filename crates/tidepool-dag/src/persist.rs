//! Buffered persistence and chunk set-difference between heads.
//!
//! These passes follow the visitor's atomicity contract: traversal hooks
//! buffer chunks in memory, and only a fully successful gather touches the
//! destination, inside a single write transaction.

use std::collections::HashSet;

use async_trait::async_trait;
use tidepool_types::Hash;
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::DagResult;
use crate::store::{ChunkRead, DagStore};
use crate::visitor::{reachable_hashes, ChunkVisitor, Traversal, Visit};

/// Hook that buffers every visited chunk.
struct Gatherer {
    chunks: Vec<Chunk>,
}

#[async_trait]
impl ChunkVisitor for Gatherer {
    async fn visit_chunk(&mut self, chunk: &Chunk) -> DagResult<Visit> {
        self.chunks.push(chunk.clone());
        Ok(Visit::Descend)
    }
}

/// Buffer every chunk reachable from `start`, in visit order.
pub async fn gather<R: ChunkRead + ?Sized>(read: &R, start: Hash) -> DagResult<Vec<Chunk>> {
    let mut gatherer = Gatherer { chunks: Vec::new() };
    Traversal::new().visit(read, start, &mut gatherer).await?;
    Ok(gatherer.chunks)
}

/// Hook that buffers chunks not reachable from a base head, pruning
/// descent at the shared frontier (anything reachable from the base keeps
/// its whole subgraph reachable from the base too).
struct DiffGatherer {
    base: HashSet<Hash>,
    chunks: Vec<Chunk>,
}

#[async_trait]
impl ChunkVisitor for DiffGatherer {
    async fn visit_chunk(&mut self, chunk: &Chunk) -> DagResult<Visit> {
        if self.base.contains(&chunk.hash()) {
            return Ok(Visit::Skip);
        }
        self.chunks.push(chunk.clone());
        Ok(Visit::Descend)
    }
}

/// Chunks reachable from `head` but not from `base` — the set a sync layer
/// must ship when a chain advances from `base` to `head`.
pub async fn added_chunks<R: ChunkRead + ?Sized>(
    read: &R,
    head: Hash,
    base: Hash,
) -> DagResult<Vec<Chunk>> {
    let base_set = reachable_hashes(read, base).await?;
    let mut gatherer = DiffGatherer {
        base: base_set,
        chunks: Vec::new(),
    };
    Traversal::new().visit(read, head, &mut gatherer).await?;
    Ok(gatherer.chunks)
}

/// Copy the closure of `head_name` from `source` into `dest`.
///
/// The whole closure is gathered from one source snapshot before the
/// destination transaction opens; chunks and the head land in `dest`
/// atomically. Chunks the destination already holds are skipped. Returns
/// the number of chunks written.
pub async fn persist(source: &DagStore, dest: &DagStore, head_name: &str) -> DagResult<usize> {
    let source_read = source.read().await?;
    let head = source_read.must_get_head(head_name).await?;
    let chunks = gather(&source_read, head).await?;

    let mut txn = dest.write().await?;
    let mut written = 0;
    for chunk in &chunks {
        if !txn.has_chunk(&chunk.hash()).await? {
            txn.put_chunk(chunk).await?;
            written += 1;
        }
    }
    txn.set_head(head_name, &head).await?;
    txn.commit().await?;

    debug!(
        head = head_name,
        to = %head.short_hex(),
        written,
        total = chunks.len(),
        "persisted head closure"
    );
    Ok(written)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;
    use tidepool_kv::MemBackend;
    use tidepool_types::FakeChunkHasher;

    use crate::error::DagError;

    use super::*;

    fn store() -> DagStore {
        DagStore::new(
            Arc::new(MemBackend::new()),
            Arc::new(FakeChunkHasher::new()),
        )
    }

    /// Linear chain root -> mid -> leaf with a head on the root.
    async fn seeded_store() -> (DagStore, Hash, Vec<Hash>) {
        let store = store();
        let leaf = store.new_chunk(json!("leaf"), vec![]).unwrap();
        let mid = store.new_chunk(json!("mid"), vec![leaf.hash()]).unwrap();
        let root = store.new_chunk(json!("root"), vec![mid.hash()]).unwrap();
        let mut txn = store.write().await.unwrap();
        for chunk in [&leaf, &mid, &root] {
            txn.put_chunk(chunk).await.unwrap();
        }
        txn.set_head("main", &root.hash()).await.unwrap();
        txn.commit().await.unwrap();
        (store, root.hash(), vec![leaf.hash(), mid.hash(), root.hash()])
    }

    #[tokio::test]
    async fn gather_buffers_whole_closure() {
        let (store, root, all) = seeded_store().await;
        let txn = store.read().await.unwrap();
        let chunks = gather(&txn, root).await.unwrap();
        assert_eq!(chunks.len(), 3);
        // Pre-order: root first.
        assert_eq!(chunks[0].hash(), root);
        for hash in all {
            assert!(chunks.iter().any(|c| c.hash() == hash));
        }
    }

    #[tokio::test]
    async fn persist_copies_closure_and_head() {
        let (source, root, all) = seeded_store().await;
        let dest = store();

        let written = persist(&source, &dest, "main").await.unwrap();
        assert_eq!(written, 3);

        let txn = dest.read().await.unwrap();
        assert_eq!(txn.get_head("main").await.unwrap(), Some(root));
        for hash in all {
            assert!(txn.has_chunk(&hash).await.unwrap());
        }
    }

    #[tokio::test]
    async fn persist_skips_chunks_already_present() {
        let (source, _root, _) = seeded_store().await;
        let dest = store();

        persist(&source, &dest, "main").await.unwrap();
        let written = persist(&source, &dest, "main").await.unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn persist_missing_head_fails() {
        let (source, _, _) = seeded_store().await;
        let dest = store();
        let err = persist(&source, &dest, "absent").await.unwrap_err();
        assert!(matches!(err, DagError::MissingHead(_)));
    }

    #[tokio::test]
    async fn added_chunks_is_the_set_difference() {
        let (store, root, _) = seeded_store().await;

        // Extend the chain: new_root -> [root, extra].
        let extra = store.new_chunk(json!("extra"), vec![]).unwrap();
        let new_root = store
            .new_chunk(json!("new-root"), vec![root, extra.hash()])
            .unwrap();
        let mut txn = store.write().await.unwrap();
        txn.put_chunk(&extra).await.unwrap();
        txn.put_chunk(&new_root).await.unwrap();
        txn.commit().await.unwrap();

        let txn = store.read().await.unwrap();
        let added = added_chunks(&txn, new_root.hash(), root).await.unwrap();
        let mut hashes: Vec<Hash> = added.iter().map(|c| c.hash()).collect();
        hashes.sort();
        let mut expected = vec![extra.hash(), new_root.hash()];
        expected.sort();
        assert_eq!(hashes, expected);
    }

    #[tokio::test]
    async fn added_chunks_of_same_head_is_empty() {
        let (store, root, _) = seeded_store().await;
        let txn = store.read().await.unwrap();
        assert!(added_chunks(&txn, root, root).await.unwrap().is_empty());
    }
}
