//! Shared plumbing for the grot workspace: repository-relative path
//! ordering and scratch-file helpers.

pub mod path;
pub mod tempfile;

pub use bstr::{BStr, BString, ByteSlice, ByteVec};

/// Errors produced by utility operations.
#[derive(Debug, thiserror::Error)]
pub enum UtilError {
    #[error("invalid path: {0}")]
    Path(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
