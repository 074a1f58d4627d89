//! Foundation types for Tidepool.
//!
//! This crate provides the content-hash identifier and the pluggable chunk
//! hashing strategy used throughout the Tidepool storage engine. Every other
//! Tidepool crate depends on `tidepool-types`.
//!
//! # Key Types
//!
//! - [`Hash`] — opaque, totally-ordered, content-derived chunk identifier
//! - [`ChunkHasher`] — strategy for deriving a chunk's hash from its
//!   `(data, refs)` content, injected into the store at construction
//! - [`Blake3ChunkHasher`] — production hasher (domain-separated BLAKE3)
//! - [`FakeChunkHasher`] — deterministic call-order hasher for tests

pub mod error;
pub mod hash;
pub mod hasher;

pub use error::TypeError;
pub use hash::Hash;
pub use hasher::{Blake3ChunkHasher, ChunkHasher, FakeChunkHasher};
