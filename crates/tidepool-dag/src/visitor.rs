//! Deduplicated reachability traversal over the refs graph.
//!
//! [`Traversal`] visits every chunk reachable from a start hash exactly
//! once, in pre-order depth-first order with children taken in stored ref
//! order. The same core serves garbage collection marking, persistence,
//! chunk set-difference, and commit-chain walking; callers specialize it
//! through [`ChunkVisitor`] hooks.

use std::collections::HashSet;

use async_trait::async_trait;
use tidepool_types::Hash;

use crate::chunk::Chunk;
use crate::error::DagResult;
use crate::store::ChunkRead;

/// A hook's verdict on a visited chunk.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Visit {
    /// Recurse into the chunk's refs.
    Descend,
    /// Do not recurse below this chunk.
    Skip,
}

/// Per-chunk hook invoked by [`Traversal`].
///
/// The default descends into every chunk; implementations override only
/// what they care about. Hook effects already emitted are not retracted if
/// the traversal later fails — callers needing atomicity buffer their
/// results and commit only on full success.
#[async_trait]
pub trait ChunkVisitor: Send {
    async fn visit_chunk(&mut self, chunk: &Chunk) -> DagResult<Visit> {
        let _ = chunk;
        Ok(Visit::Descend)
    }
}

/// Hook that visits everything and collects nothing.
pub struct NoopVisitor;

#[async_trait]
impl ChunkVisitor for NoopVisitor {}

/// Dedup pre-order traversal state.
///
/// The visited set is checked before descending into any hash and updated
/// together with the decision to visit, so a node with in-degree greater
/// than one fires its hook exactly once, and a graph that is accidentally
/// cyclic terminates rather than recursing forever (cycles are a store
/// invariant violation the traversal is not required to diagnose). The set
/// lives in this struct, so suspending mid-traversal on chunk I/O loses
/// nothing. Reusing one `Traversal` across several `visit` calls
/// accumulates a single visited set, which is how multi-head marking and
/// set-difference passes share work.
#[derive(Debug, Default)]
pub struct Traversal {
    seen: HashSet<Hash>,
}

impl Traversal {
    /// Create a traversal with an empty visited set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Hashes visited so far.
    pub fn visited(&self) -> &HashSet<Hash> {
        &self.seen
    }

    /// Consume the traversal, yielding its visited set.
    pub fn into_visited(self) -> HashSet<Hash> {
        self.seen
    }

    /// Visit every chunk reachable from `start` exactly once.
    ///
    /// Every hash is resolved through [`ChunkRead::must_get_chunk`]: a
    /// dangling ref aborts the whole traversal with
    /// [`crate::DagError::NotFound`] rather than being silently skipped.
    pub async fn visit<R, V>(&mut self, read: &R, start: Hash, visitor: &mut V) -> DagResult<()>
    where
        R: ChunkRead + ?Sized,
        V: ChunkVisitor + ?Sized,
    {
        let mut stack = vec![start];
        while let Some(hash) = stack.pop() {
            if !self.seen.insert(hash) {
                continue;
            }
            let chunk = read.must_get_chunk(&hash).await?;
            match visitor.visit_chunk(&chunk).await? {
                Visit::Skip => continue,
                Visit::Descend => {
                    // Reverse push keeps pop order equal to stored ref order.
                    for r in chunk.refs().iter().rev() {
                        stack.push(*r);
                    }
                }
            }
        }
        Ok(())
    }
}

/// The set of hashes reachable from `start`.
pub async fn reachable_hashes<R: ChunkRead + ?Sized>(
    read: &R,
    start: Hash,
) -> DagResult<HashSet<Hash>> {
    let mut traversal = Traversal::new();
    traversal.visit(read, start, &mut NoopVisitor).await?;
    Ok(traversal.into_visited())
}
