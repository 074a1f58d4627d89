//! The [`Backend`] trait family defining the key/value storage boundary.
//!
//! Any byte-level store (in-memory, embedded file, platform storage) plugs
//! into Tidepool by implementing these three traits. The chunk store layers
//! its key encoding and chunk semantics on top; it never reaches around the
//! transaction interface.

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::KvResult;

/// Transactional byte key/value capability.
///
/// Implementations must satisfy these invariants:
/// - Read transactions observe a consistent snapshot taken at `read()` and
///   keep observing it for their whole lifetime, regardless of concurrent
///   commits.
/// - Write transactions are serialized: `write()` suspends until the prior
///   writer commits or rolls back.
/// - All writes staged in one transaction apply atomically on `commit()`;
///   a dropped or rolled-back transaction leaves no trace.
/// - Once a commit returns, every transaction begun afterward observes it.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Begin a read transaction pinned to the current committed state.
    async fn read(&self) -> KvResult<Box<dyn ReadTransaction>>;

    /// Begin the single write transaction, suspending until it is available.
    async fn write(&self) -> KvResult<Box<dyn WriteTransaction>>;
}

/// Read operations available in any transaction.
#[async_trait]
pub trait ReadTransaction: Send + Sync {
    /// Point lookup. Returns `Ok(None)` if the key is absent.
    async fn get(&self, key: &str) -> KvResult<Option<Bytes>>;

    /// Whether a key is present.
    async fn has(&self, key: &str) -> KvResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// All entries whose key starts with `prefix`, in ascending key order.
    async fn scan_prefix(&self, prefix: &str) -> KvResult<Vec<(String, Bytes)>>;
}

/// A write transaction: reads see the transaction's own staged writes
/// (read-your-writes) but never another writer's uncommitted state.
#[async_trait]
pub trait WriteTransaction: ReadTransaction {
    /// Stage a put. Visible to this transaction immediately, to others
    /// only after `commit()`.
    async fn put(&mut self, key: &str, value: Bytes) -> KvResult<()>;

    /// Stage a delete.
    async fn del(&mut self, key: &str) -> KvResult<()>;

    /// Apply every staged write atomically.
    async fn commit(self: Box<Self>) -> KvResult<()>;

    /// Discard every staged write. Dropping the transaction without
    /// committing has the same effect.
    async fn rollback(self: Box<Self>) -> KvResult<()>;
}
