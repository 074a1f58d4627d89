//! Transactional key/value backend boundary for Tidepool.
//!
//! The chunk store consumes storage through the [`Backend`] trait family:
//! point get/put/delete by key, key-ordered prefix scan, and atomic
//! multi-key commit of a write transaction. The backend may or may not
//! persist across restarts; the engine above is agnostic.
//!
//! # Backends
//!
//! - [`MemBackend`] — snapshot-isolated in-memory backend for tests and
//!   embedding
//!
//! # Transaction Rules
//!
//! 1. Read transactions are pinned to the committed state at begin.
//! 2. Write transactions are serialized, one at a time.
//! 3. Staged writes are read-your-writes within the transaction and apply
//!    atomically on commit.
//! 4. A dropped or rolled-back transaction leaves the store untouched.

pub mod error;
pub mod memory;
pub mod traits;

pub use error::{KvError, KvResult};
pub use memory::MemBackend;
pub use traits::{Backend, ReadTransaction, WriteTransaction};
