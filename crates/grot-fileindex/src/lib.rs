//! The working-tree file index: a sorted, checksummed on-disk structure
//! recording the last known state of every tracked file, plus the
//! two-way diff engines that walk it against a tree object or an
//! on-disk directory.

pub mod diff;
mod entry;
mod read;
mod write;

pub use diff::{DirDiffCb, DirEntryInfo, TreeDiffCb, TreeReader};
pub use entry::{FileIndexEntry, Stage};

use std::collections::BTreeMap;

use bstr::BString;

/// On-disk magic: "gotI".
pub const FILE_INDEX_SIGNATURE: u32 = 0x676f_7449;
/// Current on-disk version. Version 1 files lack staging support.
pub const FILE_INDEX_VERSION: u32 = 2;

/// Hard cap on the number of entries.
pub const MAX_ENTRIES: usize = i32::MAX as usize;

/// The name of the tool's metadata directory, excluded from directory
/// diffs at the worktree root.
pub const META_DIR: &str = ".grot";

/// Errors produced by file-index operations.
#[derive(Debug, thiserror::Error)]
pub enum FileIndexError {
    #[error("unrecognized file index signature")]
    Signature,

    #[error("unsupported file index version {0}")]
    Version(u32),

    #[error("file index checksum mismatch")]
    Checksum,

    #[error("truncated or corrupt file index")]
    Bad,

    #[error("file index is full")]
    NoSpace,

    #[error("duplicate directory entry: {0}")]
    DirDupEntry(String),

    #[error("{path}: is a directory")]
    IsDirectory { path: String },

    #[error(transparent)]
    Object(#[from] grot_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// The in-memory file index: an ordered map of entries keyed by
/// repository-relative path.
///
/// Key order is plain byte order, which for the slash-separated full
/// paths stored here coincides with the order Git writes tree entries
/// in. The diff walkers depend on that equivalence.
#[derive(Debug)]
pub struct FileIndex {
    entries: BTreeMap<BString, FileIndexEntry>,
}

impl FileIndex {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Insert an entry, flagging it as not yet flushed to disk.
    pub fn add(&mut self, mut entry: FileIndexEntry) -> Result<(), FileIndexError> {
        if self.entries.len() >= MAX_ENTRIES {
            return Err(FileIndexError::NoSpace);
        }
        entry.set_not_flushed(true);
        self.entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    /// Insert an entry without touching its flags. Used by the reader.
    pub(crate) fn add_read(&mut self, entry: FileIndexEntry) -> Result<(), FileIndexError> {
        if self.entries.len() >= MAX_ENTRIES {
            return Err(FileIndexError::NoSpace);
        }
        self.entries.insert(entry.path.clone(), entry);
        Ok(())
    }

    /// Detach an entry from the index, returning it.
    pub fn remove(&mut self, path: &[u8]) -> Option<FileIndexEntry> {
        self.entries.remove(bstr::BStr::new(path))
    }

    pub fn get(&self, path: &[u8]) -> Option<&FileIndexEntry> {
        self.entries.get(bstr::BStr::new(path))
    }

    pub fn get_mut(&mut self, path: &[u8]) -> Option<&mut FileIndexEntry> {
        self.entries.get_mut(bstr::BStr::new(path))
    }

    pub fn contains(&self, path: &[u8]) -> bool {
        self.entries.contains_key(bstr::BStr::new(path))
    }

    /// Iterate entries in path order.
    pub fn iter(&self) -> impl Iterator<Item = &FileIndexEntry> {
        self.entries.values()
    }

    /// Visit every entry in order; the callback may remove the entry it
    /// was handed (and only that entry).
    pub fn for_each_entry_safe<F>(&mut self, mut f: F) -> Result<(), FileIndexError>
    where
        F: FnMut(&mut FileIndexEntry) -> Result<EntryDisposition, FileIndexError>,
    {
        let paths: Vec<BString> = self.entries.keys().cloned().collect();
        for path in paths {
            let Some(entry) = self.entries.get_mut(&path) else {
                continue;
            };
            match f(entry)? {
                EntryDisposition::Keep => {}
                EntryDisposition::Remove => {
                    self.entries.remove(&path);
                }
            }
        }
        Ok(())
    }

    /// Sorted snapshot of all entry paths.
    pub(crate) fn path_snapshot(&self) -> Vec<BString> {
        self.entries.keys().cloned().collect()
    }
}

impl Default for FileIndex {
    fn default() -> Self {
        Self::new()
    }
}

/// What to do with the entry handed to a `for_each_entry_safe` callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryDisposition {
    Keep,
    Remove,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(path: &str) -> FileIndexEntry {
        FileIndexEntry::from_fields(BString::from(path))
    }

    #[test]
    fn add_marks_not_flushed() {
        let mut idx = FileIndex::new();
        idx.add(entry("a.txt")).unwrap();
        assert!(idx.get(b"a.txt").unwrap().not_flushed());
    }

    #[test]
    fn entries_iterate_in_path_order() {
        let mut idx = FileIndex::new();
        for p in ["foo/x", "bar", "foo.c", "foo-bar"] {
            idx.add(entry(p)).unwrap();
        }
        let order: Vec<_> = idx.iter().map(|e| e.path.clone()).collect();
        assert_eq!(order, vec!["bar", "foo-bar", "foo.c", "foo/x"]);
    }

    #[test]
    fn safe_iteration_can_remove_current() {
        let mut idx = FileIndex::new();
        for p in ["a", "b", "c"] {
            idx.add(entry(p)).unwrap();
        }
        idx.for_each_entry_safe(|e| {
            Ok(if e.path == "b" {
                EntryDisposition::Remove
            } else {
                EntryDisposition::Keep
            })
        })
        .unwrap();
        assert_eq!(idx.len(), 2);
        assert!(!idx.contains(b"b"));
    }
}
