//! Commit-chain layer for Tidepool.
//!
//! Interprets chunks as commits: a chain per head of the form
//! `head → (local)* → snapshot`, where a snapshot is the synced baseline
//! and each local commit is one applied-but-unacknowledged write. This
//! crate walks chains, extracts the pending-mutation backlog the sync
//! transport replays, advances heads with stale-basis rejection, and
//! verifies chain integrity.
//!
//! # Key Operations
//!
//! - [`local_run`] — the run of local commits above the snapshot,
//!   newest-first, with invariant validation
//! - [`pending_mutations_for_api`] — the backlog on the default head,
//!   oldest application first
//! - [`commit_local`] / [`install_snapshot`] — atomic chain advancement
//! - [`ChainVerifier`] — non-fatal integrity reporting
//! - [`CommitVisitor`] — commit-aware hooks over the dag traversal

pub mod commit;
pub mod error;
pub mod pending;
pub mod verify;
pub mod visitor;
pub mod write;

pub use commit::{local_run, Commit, CommitPayload, DEFAULT_HEAD_NAME, MAX_CHAIN_LEN};
pub use error::{ChainError, ChainResult};
pub use pending::{pending_mutations_for_api, PendingMutation};
pub use verify::{ChainReport, ChainVerifier, ChainViolation, ChainViolationKind};
pub use visitor::{collect_commits, CommitChunkAdapter, CommitVisitor};
pub use write::{commit_local, install_snapshot, LocalWrite, SnapshotWrite};
