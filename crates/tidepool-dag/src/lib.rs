//! Content-addressed chunk storage for Tidepool.
//!
//! This crate is the heart of the engine: an immutable graph of
//! hash-identified chunks plus mutable named heads, stored through the
//! `tidepool-kv` backend boundary. Commit-chain semantics layer on top in
//! `tidepool-chain`; this crate knows only `(hash, data, refs)`.
//!
//! # Pieces
//!
//! - [`Chunk`] — immutable payload + ordered child refs
//! - [`DagStore`] — scoped read/write transactions over a backend
//! - [`Traversal`] / [`ChunkVisitor`] — exactly-once pre-order reachability
//!   traversal specialized by hooks
//! - [`collect_garbage`] — mark-sweep over the head-reachable frontier
//! - [`persist`] / [`added_chunks`] — buffered head-closure copy and
//!   set-difference
//!
//! # Storage Rules
//!
//! 1. Chunks are immutable once written; `put` is idempotent and a content
//!    mismatch under an existing hash is fatal.
//! 2. Readers are pinned to the committed state at transaction begin.
//! 3. Writers are serialized; everything in one write transaction commits
//!    atomically or not at all.
//! 4. Only GC deletes, and only what no head can reach.

pub mod chunk;
pub mod error;
pub mod gc;
pub mod key;
pub mod persist;
pub mod store;
pub mod visitor;

pub use chunk::Chunk;
pub use error::{DagError, DagResult};
pub use gc::{collect_garbage, GcStats};
pub use key::Key;
pub use persist::{added_chunks, gather, persist};
pub use store::{ChunkRead, DagStore, ReadTxn, TxnFuture, WriteTxn};
pub use visitor::{reachable_hashes, ChunkVisitor, NoopVisitor, Traversal, Visit};
