//! Loose object storage, read side only.
//!
//! Each loose object lives at `objects/XX/YYYY...` where `XX` is the
//! first id byte in hex and `YYYY...` the remaining 38 hex characters.
//! File content is zlib-compressed `"<type> <size>\0<content>"`.

mod enumerate;
mod read;

pub use enumerate::iter_loose_ids;
pub use read::write_loose;

use std::path::{Path, PathBuf};

use grot_hash::ObjectId;

/// Interface to a repository's loose object directory.
pub struct LooseStore {
    objects_dir: PathBuf,
}

impl LooseStore {
    pub fn open(objects_dir: impl AsRef<Path>) -> Self {
        Self {
            objects_dir: objects_dir.as_ref().to_path_buf(),
        }
    }

    /// The file path a given id would occupy.
    pub fn object_path(&self, id: &ObjectId) -> PathBuf {
        self.objects_dir.join(id.loose_path())
    }

    pub fn objects_dir(&self) -> &Path {
        &self.objects_dir
    }
}

/// Errors from loose object operations.
#[derive(Debug, thiserror::Error)]
pub enum LooseError {
    #[error("corrupt loose object {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("decompression failed for {id}")]
    Decompress { id: String },

    #[error(transparent)]
    Object(#[from] grot_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grot_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}
