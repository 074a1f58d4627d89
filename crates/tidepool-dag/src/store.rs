//! The chunk store: chunk and head operations scoped to transactions.
//!
//! [`DagStore`] layers the chunk key encoding over a [`Backend`] and hands
//! out [`ReadTxn`] / [`WriteTxn`] guards. Isolation is the store's job, not
//! the caller's: readers are pinned to the committed state at begin, writers
//! are serialized, and everything staged in one write transaction becomes
//! visible together or not at all.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use serde_json::Value;
use tidepool_kv::{Backend, ReadTransaction, WriteTransaction};
use tidepool_types::{ChunkHasher, Hash};
use tracing::debug;

use crate::chunk::Chunk;
use crate::error::{DagError, DagResult};
use crate::key::{Key, HEAD_PREFIX};

/// Boxed future returned by `with_read` / `with_write` closures.
pub type TxnFuture<'a, T> = Pin<Box<dyn Future<Output = DagResult<T>> + Send + 'a>>;

/// Read operations shared by read and write transactions.
///
/// A write transaction reading through this trait sees its own staged
/// writes; a read transaction sees the snapshot it was begun against.
#[async_trait]
pub trait ChunkRead: Send + Sync {
    /// Look up a chunk. Absence is not an error.
    async fn get_chunk(&self, hash: &Hash) -> DagResult<Option<Chunk>>;

    /// Whether a chunk is present.
    async fn has_chunk(&self, hash: &Hash) -> DagResult<bool>;

    /// Look up a chunk the caller's invariants guarantee to exist.
    ///
    /// Fails with [`DagError::NotFound`]; never silently treated as empty.
    async fn must_get_chunk(&self, hash: &Hash) -> DagResult<Chunk> {
        self.get_chunk(hash)
            .await?
            .ok_or(DagError::NotFound(*hash))
    }

    /// Resolve a named head. Absence is not an error.
    async fn get_head(&self, name: &str) -> DagResult<Option<Hash>>;

    /// Resolve a head that must exist, failing with
    /// [`DagError::MissingHead`].
    async fn must_get_head(&self, name: &str) -> DagResult<Hash> {
        self.get_head(name)
            .await?
            .ok_or_else(|| DagError::MissingHead(name.to_string()))
    }

    /// All heads, in name order.
    async fn heads(&self) -> DagResult<Vec<(String, Hash)>>;
}

/// Content-addressed chunk store over a transactional backend.
///
/// The hash strategy is injected at construction; the store never assumes
/// a particular algorithm beyond determinism over `(data, refs)`.
#[derive(Clone)]
pub struct DagStore {
    backend: Arc<dyn Backend>,
    hasher: Arc<dyn ChunkHasher>,
}

impl DagStore {
    /// Create a store over the given backend and hash strategy.
    pub fn new(backend: Arc<dyn Backend>, hasher: Arc<dyn ChunkHasher>) -> Self {
        Self { backend, hasher }
    }

    /// Build a chunk whose hash is derived through this store's hasher.
    pub fn new_chunk(&self, data: Value, refs: Vec<Hash>) -> DagResult<Chunk> {
        Chunk::new(self.hasher.as_ref(), data, refs)
    }

    /// Begin a read transaction pinned to the current committed state.
    pub async fn read(&self) -> DagResult<ReadTxn> {
        Ok(ReadTxn {
            kv: self.backend.read().await?,
        })
    }

    /// Begin the single write transaction, suspending until available.
    pub async fn write(&self) -> DagResult<WriteTxn> {
        Ok(WriteTxn {
            kv: self.backend.write().await?,
        })
    }

    /// Run `f` inside a read transaction, releasing it on every exit path.
    pub async fn with_read<T, F>(&self, f: F) -> DagResult<T>
    where
        F: for<'t> FnOnce(&'t ReadTxn) -> TxnFuture<'t, T>,
    {
        let txn = self.read().await?;
        f(&txn).await
    }

    /// Run `f` inside a write transaction: commit if it succeeds, roll back
    /// if it fails. The transaction is released on every exit path.
    pub async fn with_write<T, F>(&self, f: F) -> DagResult<T>
    where
        F: for<'t> FnOnce(&'t mut WriteTxn) -> TxnFuture<'t, T>,
    {
        let mut txn = self.write().await?;
        match f(&mut txn).await {
            Ok(value) => {
                txn.commit().await?;
                Ok(value)
            }
            Err(err) => {
                txn.rollback().await?;
                Err(err)
            }
        }
    }
}

impl std::fmt::Debug for DagStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DagStore").finish_non_exhaustive()
    }
}

/// A read transaction. Dropping it releases the underlying snapshot.
pub struct ReadTxn {
    kv: Box<dyn ReadTransaction>,
}

#[async_trait]
impl ChunkRead for ReadTxn {
    async fn get_chunk(&self, hash: &Hash) -> DagResult<Option<Chunk>> {
        chunk_from_kv(self.kv.as_ref(), hash).await
    }

    async fn has_chunk(&self, hash: &Hash) -> DagResult<bool> {
        Ok(self.kv.has(&Key::chunk_data(hash)).await?)
    }

    async fn get_head(&self, name: &str) -> DagResult<Option<Hash>> {
        head_from_kv(self.kv.as_ref(), name).await
    }

    async fn heads(&self) -> DagResult<Vec<(String, Hash)>> {
        heads_from_kv(self.kv.as_ref()).await
    }
}

/// The write transaction. All mutations stage against the backend's write
/// transaction and apply atomically on [`WriteTxn::commit`]; dropping the
/// guard without committing rolls everything back.
pub struct WriteTxn {
    kv: Box<dyn WriteTransaction>,
}

impl WriteTxn {
    /// Store a chunk under both its data and refs keys.
    ///
    /// Content addressing makes this idempotent: re-putting identical
    /// content is a no-op, while re-putting different content under an
    /// existing hash is fatal [`DagError::ContentMismatch`] — under the
    /// production hasher that means hash-collision-grade corruption, and
    /// under the fake test hasher a harness bug, reported the same way.
    pub async fn put_chunk(&mut self, chunk: &Chunk) -> DagResult<()> {
        let hash = chunk.hash();
        let data_key = Key::chunk_data(&hash);
        let refs_key = Key::chunk_refs(&hash);
        let data = chunk.data_bytes()?;
        let refs = encode_refs(chunk.refs())?;

        if let Some(existing) = self.kv.get(&data_key).await? {
            let existing_refs = self.kv.get(&refs_key).await?;
            if existing == data && existing_refs.as_deref() == Some(refs.as_slice()) {
                debug!(chunk = %hash.short_hex(), "put of existing chunk, no-op");
                return Ok(());
            }
            return Err(DagError::ContentMismatch { hash });
        }

        self.kv.put(&data_key, Bytes::from(data)).await?;
        self.kv.put(&refs_key, Bytes::from(refs)).await?;
        debug!(chunk = %hash.short_hex(), refs = chunk.refs().len(), "put chunk");
        Ok(())
    }

    /// Point a head at a chunk.
    pub async fn set_head(&mut self, name: &str, hash: &Hash) -> DagResult<()> {
        self.kv
            .put(&Key::head(name), Bytes::from(hash.to_hex()))
            .await?;
        debug!(head = name, to = %hash.short_hex(), "set head");
        Ok(())
    }

    /// Remove a head whose chain is permanently abandoned.
    pub async fn remove_head(&mut self, name: &str) -> DagResult<()> {
        self.kv.del(&Key::head(name)).await?;
        debug!(head = name, "removed head");
        Ok(())
    }

    /// Delete a chunk's data and refs entries.
    ///
    /// Garbage collection only; deleting a reachable chunk corrupts the
    /// store.
    pub(crate) async fn delete_chunk(&mut self, hash: &Hash) -> DagResult<()> {
        self.kv.del(&Key::chunk_data(hash)).await?;
        self.kv.del(&Key::chunk_refs(hash)).await?;
        Ok(())
    }

    /// Raw key scan for maintenance passes (GC sweep).
    pub(crate) async fn scan_keys(&self, prefix: &str) -> DagResult<Vec<String>> {
        let entries = self.kv.scan_prefix(prefix).await?;
        Ok(entries.into_iter().map(|(k, _)| k).collect())
    }

    /// Apply every staged write atomically.
    pub async fn commit(self) -> DagResult<()> {
        self.kv.commit().await?;
        Ok(())
    }

    /// Discard every staged write; the store is left as if the transaction
    /// never started. Dropping the guard has the same effect.
    pub async fn rollback(self) -> DagResult<()> {
        self.kv.rollback().await?;
        Ok(())
    }
}

#[async_trait]
impl ChunkRead for WriteTxn {
    async fn get_chunk(&self, hash: &Hash) -> DagResult<Option<Chunk>> {
        chunk_from_kv(self.kv.as_ref(), hash).await
    }

    async fn has_chunk(&self, hash: &Hash) -> DagResult<bool> {
        Ok(self.kv.has(&Key::chunk_data(hash)).await?)
    }

    async fn get_head(&self, name: &str) -> DagResult<Option<Hash>> {
        head_from_kv(self.kv.as_ref(), name).await
    }

    async fn heads(&self) -> DagResult<Vec<(String, Hash)>> {
        heads_from_kv(self.kv.as_ref()).await
    }
}

async fn chunk_from_kv<K: ReadTransaction + ?Sized>(
    kv: &K,
    hash: &Hash,
) -> DagResult<Option<Chunk>> {
    let Some(data) = kv.get(&Key::chunk_data(hash)).await? else {
        return Ok(None);
    };
    let value: Value =
        serde_json::from_slice(&data).map_err(|e| DagError::Serialization(e.to_string()))?;
    // A missing refs entry reads as a leaf; the writer always stores both
    // entries.
    let refs = match kv.get(&Key::chunk_refs(hash)).await? {
        Some(bytes) => decode_refs(&bytes)?,
        None => Vec::new(),
    };
    Ok(Some(Chunk::from_parts(*hash, value, refs)))
}

async fn head_from_kv<K: ReadTransaction + ?Sized>(kv: &K, name: &str) -> DagResult<Option<Hash>> {
    match kv.get(&Key::head(name)).await? {
        Some(bytes) => Ok(Some(decode_head(name, &bytes)?)),
        None => Ok(None),
    }
}

async fn heads_from_kv<K: ReadTransaction + ?Sized>(kv: &K) -> DagResult<Vec<(String, Hash)>> {
    let mut heads = Vec::new();
    for (key, value) in kv.scan_prefix(HEAD_PREFIX).await? {
        match Key::parse(&key) {
            Ok(Key::Head(name)) => {
                let hash = decode_head(&name, &value)?;
                heads.push((name, hash));
            }
            // Corruption in a scan taints that entry only, never the scan.
            Ok(_) | Err(_) => {
                tracing::warn!(key = %key, "skipping unparseable key in head scan");
            }
        }
    }
    Ok(heads)
}

fn decode_head(name: &str, bytes: &[u8]) -> DagResult<Hash> {
    let text = std::str::from_utf8(bytes)
        .map_err(|e| DagError::Serialization(format!("head {name}: {e}")))?;
    Hash::parse(text).map_err(|e| DagError::Serialization(format!("head {name}: {e}")))
}

fn encode_refs(refs: &[Hash]) -> DagResult<Vec<u8>> {
    serde_json::to_vec(refs).map_err(|e| DagError::Serialization(e.to_string()))
}

fn decode_refs(bytes: &[u8]) -> DagResult<Vec<Hash>> {
    serde_json::from_slice(bytes).map_err(|e| DagError::Serialization(e.to_string()))
}
