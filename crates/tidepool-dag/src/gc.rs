//! Mark-sweep garbage collection.
//!
//! GC is the only operation that removes chunks. It runs entirely inside
//! one write transaction: mark every chunk reachable from every live head,
//! sweep the chunk namespace, delete what the mark pass did not see, and
//! commit atomically. Holding the single write slot for the whole pass
//! means no writer can add reachable chunks mid-collection, and readers
//! pinned to earlier snapshots keep seeing every chunk their snapshot
//! could reach.

use tracing::{debug, warn};

use crate::error::DagResult;
use crate::key::{Key, CHUNK_DATA_PREFIX};
use crate::store::{ChunkRead, DagStore};
use crate::visitor::{NoopVisitor, Traversal};

/// Outcome of a collection pass.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct GcStats {
    /// Chunks reachable from at least one head.
    pub live: usize,
    /// Chunks deleted.
    pub collected: usize,
}

/// Delete every chunk unreachable from every head.
pub async fn collect_garbage(store: &DagStore) -> DagResult<GcStats> {
    let mut txn = store.write().await?;

    // Mark: one traversal instance so the visited set is shared across
    // heads and each chunk is resolved once.
    let mut traversal = Traversal::new();
    for (_, head) in txn.heads().await? {
        traversal.visit(&txn, head, &mut NoopVisitor).await?;
    }
    let live = traversal.into_visited();

    // Sweep: enumerate data keys; a key that fails to parse taints that
    // entry only, never the pass.
    let mut candidates = Vec::new();
    for key in txn.scan_keys(CHUNK_DATA_PREFIX).await? {
        match Key::parse(&key) {
            Ok(Key::ChunkData(hash)) => {
                if !live.contains(&hash) {
                    candidates.push(hash);
                }
            }
            Ok(_) | Err(_) => {
                warn!(key = %key, "skipping unparseable key in GC sweep");
            }
        }
    }

    for hash in &candidates {
        txn.delete_chunk(hash).await?;
    }
    txn.commit().await?;

    let stats = GcStats {
        live: live.len(),
        collected: candidates.len(),
    };
    debug!(live = stats.live, collected = stats.collected, "collected garbage");
    Ok(stats)
}
