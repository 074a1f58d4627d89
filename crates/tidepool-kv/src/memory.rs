//! In-memory backend for tests and embedding.
//!
//! [`MemBackend`] keeps the committed state as an immutable
//! `Arc<BTreeMap>` snapshot. Read transactions clone the `Arc` at begin and
//! stay pinned to that snapshot, so readers never block writers and a
//! concurrent commit never changes what an in-flight reader observes. Write
//! transactions hold an owned async mutex (single writer), stage their
//! puts and deletes in an overlay, and swap in a new snapshot on commit.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

use crate::error::KvResult;
use crate::traits::{Backend, ReadTransaction, WriteTransaction};

type Snapshot = Arc<BTreeMap<String, Bytes>>;

/// In-memory, snapshot-isolated [`Backend`] implementation.
///
/// Data is lost when the backend is dropped.
pub struct MemBackend {
    state: Arc<RwLock<Snapshot>>,
    writer: Arc<Mutex<()>>,
}

impl MemBackend {
    /// Create a new empty backend.
    pub fn new() -> Self {
        Self {
            state: Arc::new(RwLock::new(Arc::new(BTreeMap::new()))),
            writer: Arc::new(Mutex::new(())),
        }
    }

    /// Number of committed entries.
    pub fn len(&self) -> usize {
        self.state.read().expect("lock poisoned").len()
    }

    /// Returns `true` if no entries have been committed.
    pub fn is_empty(&self) -> bool {
        self.state.read().expect("lock poisoned").is_empty()
    }

    fn snapshot(&self) -> Snapshot {
        Arc::clone(&self.state.read().expect("lock poisoned"))
    }
}

impl Default for MemBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for MemBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemBackend")
            .field("entry_count", &self.len())
            .finish()
    }
}

#[async_trait]
impl Backend for MemBackend {
    async fn read(&self) -> KvResult<Box<dyn ReadTransaction>> {
        Ok(Box::new(MemReadTransaction {
            snapshot: self.snapshot(),
        }))
    }

    async fn write(&self) -> KvResult<Box<dyn WriteTransaction>> {
        // First suspension point: wait for the prior writer to finish.
        let guard = Arc::clone(&self.writer).lock_owned().await;
        Ok(Box::new(MemWriteTransaction {
            base: self.snapshot(),
            pending: BTreeMap::new(),
            state: Arc::clone(&self.state),
            _guard: guard,
        }))
    }
}

/// Read transaction pinned to the snapshot current at `read()`.
struct MemReadTransaction {
    snapshot: Snapshot,
}

#[async_trait]
impl ReadTransaction for MemReadTransaction {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        Ok(self.snapshot.get(key).cloned())
    }

    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>> {
        Ok(scan_map(&self.snapshot, prefix))
    }
}

/// The single write transaction: base snapshot + staged overlay.
///
/// `pending` maps key to `Some(value)` for a staged put and `None` for a
/// staged delete. Dropping the transaction discards the overlay.
struct MemWriteTransaction {
    base: Snapshot,
    pending: BTreeMap<String, Option<Bytes>>,
    state: Arc<RwLock<Snapshot>>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl ReadTransaction for MemWriteTransaction {
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>> {
        match self.pending.get(key) {
            Some(staged) => Ok(staged.clone()),
            None => Ok(self.base.get(key).cloned()),
        }
    }

    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>> {
        let mut merged: BTreeMap<String, Bytes> = scan_map(&self.base, prefix)
            .into_iter()
            .collect();
        for (key, staged) in range_of(&self.pending, prefix) {
            match staged {
                Some(value) => {
                    merged.insert(key.clone(), value.clone());
                }
                None => {
                    merged.remove(key);
                }
            }
        }
        Ok(merged.into_iter().collect())
    }
}

#[async_trait]
impl WriteTransaction for MemWriteTransaction {
    async fn put(&mut self, key: &str, value: Bytes) -> KvResult<()> {
        self.pending.insert(key.to_string(), Some(value));
        Ok(())
    }

    async fn del(&mut self, key: &str) -> KvResult<()> {
        self.pending.insert(key.to_string(), None);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> KvResult<()> {
        let this = *self;
        let staged = this.pending.len();
        let mut state = this.state.write().expect("lock poisoned");
        let mut next = (**state).clone();
        for (key, entry) in this.pending {
            match entry {
                Some(value) => {
                    next.insert(key, value);
                }
                None => {
                    next.remove(&key);
                }
            }
        }
        *state = Arc::new(next);
        debug!(staged, "committed write transaction");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> KvResult<()> {
        // The overlay dies with the transaction.
        Ok(())
    }
}

fn scan_map(map: &BTreeMap<String, Bytes>, prefix: &str) -> Vec<(String, Bytes)> {
    range_of(map, prefix)
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}

fn range_of<'a, V>(
    map: &'a BTreeMap<String, V>,
    prefix: &'a str,
) -> impl Iterator<Item = (&'a String, &'a V)> {
    map.range(prefix.to_string()..)
        .take_while(move |(k, _)| k.starts_with(prefix))
}
