//! Commit DAG traversal for grot.
//!
//! The [`CommitGraph`] discovers commits on demand from a starting
//! point and yields them in committer-time order across merges: every
//! commit is emitted after all candidates with strictly greater
//! timestamps, and equal timestamps keep their discovery order.

mod graph;

pub use graph::{CommitGraph, CommitReader};

use grot_hash::ObjectId;

/// Errors produced by commit graph operations.
#[derive(Debug, thiserror::Error)]
pub enum GraphError {
    /// The iterator needs more commits fetched before it can continue.
    #[error("more commits must be fetched to continue iteration")]
    NeedMore,

    #[error("no such commit in graph: {0}")]
    NoObject(ObjectId),

    #[error("invalid child link for commit {0}")]
    BadObjectId(ObjectId),

    #[error("object is not a commit: {0}")]
    NotACommit(ObjectId),

    #[error(transparent)]
    Object(#[from] grot_object::ObjectError),

    #[error("commit source: {0}")]
    Source(#[source] Box<dyn std::error::Error + Send + Sync>),
}
