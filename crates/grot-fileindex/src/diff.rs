//! Two-way diff engines: file index vs. tree object and file index vs.
//! on-disk directory.
//!
//! Both walks co-iterate the ordered index with an in-order walk of the
//! other side, advancing whichever key is smaller and invoking a
//! callback per difference. The same path order is used on both sides,
//! so a single forward pass suffices. Entries added to the index by
//! callbacks mid-walk carry the not-flushed flag and are skipped.

use std::cmp::Ordering;
use std::path::{Path, PathBuf};

use bstr::{BStr, BString, ByteSlice};
use grot_hash::ObjectId;
use grot_object::{Tree, TreeEntry};
use grot_utils::path::{is_child, path_cmp, subpath};

use crate::{FileIndex, FileIndexEntry, FileIndexError, META_DIR};

/// Supplies subtree objects during a tree diff.
pub trait TreeReader {
    fn read_tree(&self, id: &ObjectId) -> Result<Tree, FileIndexError>;
}

/// Callbacks for diffing the index against a tree.
pub trait TreeDiffCb {
    /// A path present in both the index and the tree.
    fn diff_old_new(
        &mut self,
        ie: &mut FileIndexEntry,
        te: &TreeEntry,
        parent: &BStr,
    ) -> Result<(), FileIndexError>;

    /// A path present only in the index.
    fn diff_old(&mut self, ie: &mut FileIndexEntry, parent: &BStr)
        -> Result<(), FileIndexError>;

    /// A path present only in the tree.
    fn diff_new(&mut self, te: &TreeEntry, parent: &BStr) -> Result<(), FileIndexError>;
}

/// One directory entry seen by the directory walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntryInfo {
    pub name: BString,
    pub is_dir: bool,
}

/// Callbacks for diffing the index against a working directory.
pub trait DirDiffCb {
    fn diff_old_new(
        &mut self,
        ie: &mut FileIndexEntry,
        de: &DirEntryInfo,
        parent: &BStr,
    ) -> Result<(), FileIndexError>;

    fn diff_old(&mut self, ie: &mut FileIndexEntry, parent: &BStr)
        -> Result<(), FileIndexError>;

    fn diff_new(&mut self, de: &DirEntryInfo, parent: &BStr) -> Result<(), FileIndexError>;
}

/// Cursor over a sorted snapshot of index paths.
///
/// The snapshot is taken before the walk starts; entries inserted by
/// callbacks are invisible to it, and removed or not-yet-flushed
/// entries are skipped when the cursor lands on them.
struct IndexCursor {
    paths: Vec<BString>,
    pos: usize,
}

impl IndexCursor {
    fn new(index: &FileIndex) -> Self {
        let mut cursor = Self {
            paths: index.path_snapshot(),
            pos: 0,
        };
        cursor.settle(index);
        cursor
    }

    /// Skip over paths whose entries vanished or are not flushed.
    fn settle(&mut self, index: &FileIndex) {
        while let Some(path) = self.paths.get(self.pos) {
            match index.get(path) {
                Some(e) if !e.not_flushed() => break,
                _ => self.pos += 1,
            }
        }
    }

    fn current(&self, _index: &FileIndex) -> Option<&BString> {
        self.paths.get(self.pos)
    }

    fn advance(&mut self, index: &FileIndex) {
        self.pos += 1;
        self.settle(index);
    }

    /// Advance until the current entry is a child of `path`.
    fn seek_into(&mut self, index: &FileIndex, path: &[u8]) {
        while let Some(p) = self.current(index) {
            if is_child(p, path) {
                break;
            }
            self.advance(index);
        }
    }
}

/// Diff the index entries below `path` against `tree` (the tree object
/// for that same path).
///
/// `entry_name` restricts callbacks to a single basename within the
/// walk, for single-file status checks.
pub fn diff_tree(
    index: &mut FileIndex,
    tree: &Tree,
    path: &[u8],
    entry_name: Option<&[u8]>,
    reader: &dyn TreeReader,
    cb: &mut dyn TreeDiffCb,
) -> Result<(), FileIndexError> {
    let mut cursor = IndexCursor::new(index);
    cursor.seek_into(index, path);
    diff_tree_level(index, &mut cursor, tree, path, entry_name, reader, cb)
}

fn diff_tree_level(
    index: &mut FileIndex,
    cursor: &mut IndexCursor,
    tree: &Tree,
    path: &[u8],
    entry_name: Option<&[u8]>,
    reader: &dyn TreeReader,
    cb: &mut dyn TreeDiffCb,
) -> Result<(), FileIndexError> {
    let mut tidx = 0usize;

    loop {
        let te = tree.entry(tidx);
        let ie_path = cursor.current(index).cloned();
        let ie_is_child = ie_path
            .as_ref()
            .is_some_and(|p| is_child(p, path));

        if !ie_is_child && te.is_none() {
            break;
        }

        match (te, &ie_path) {
            (Some(te), Some(ie_path)) => {
                let te_path = subpath(path, &te.name);
                match path_cmp(ie_path, &te_path) {
                    Ordering::Equal => {
                        if ie_is_child
                            && !te.mode.is_submodule()
                            && name_matches(entry_name, &te.name)
                        {
                            let ie = index.get_mut(ie_path).expect("cursor entry present");
                            cb.diff_old_new(ie, te, BStr::new(path))?;
                            if entry_name.is_some() {
                                return Ok(());
                            }
                        }
                        cursor.advance(index);
                        walk_tree(index, cursor, tree, &mut tidx, path, entry_name, reader, cb)?;
                    }
                    Ordering::Less => {
                        if ie_is_child && name_matches(entry_name, &te.name) {
                            let ie = index.get_mut(ie_path).expect("cursor entry present");
                            cb.diff_old(ie, BStr::new(path))?;
                            if entry_name.is_some() {
                                return Ok(());
                            }
                        }
                        cursor.advance(index);
                    }
                    Ordering::Greater => {
                        // Subtrees recurse below; only leaf entries are
                        // diffable keys.
                        if is_leaf(te) && name_matches(entry_name, &te.name) {
                            cb.diff_new(te, BStr::new(path))?;
                            if entry_name.is_some() {
                                return Ok(());
                            }
                        }
                        walk_tree(index, cursor, tree, &mut tidx, path, entry_name, reader, cb)?;
                    }
                }
            }
            (None, Some(ie_path)) => {
                if ie_is_child && entry_name.is_none() {
                    let ie = index.get_mut(ie_path).expect("cursor entry present");
                    cb.diff_old(ie, BStr::new(path))?;
                }
                cursor.advance(index);
            }
            (Some(te), None) => {
                if is_leaf(te) && name_matches(entry_name, &te.name) {
                    cb.diff_new(te, BStr::new(path))?;
                    if entry_name.is_some() {
                        return Ok(());
                    }
                }
                walk_tree(index, cursor, tree, &mut tidx, path, entry_name, reader, cb)?;
            }
            (None, None) => break,
        }
    }

    Ok(())
}

/// Recurse into `tree.entry(tidx)` when it is a subtree, then step the
/// tree cursor forward.
#[allow(clippy::too_many_arguments)]
fn walk_tree(
    index: &mut FileIndex,
    cursor: &mut IndexCursor,
    tree: &Tree,
    tidx: &mut usize,
    path: &[u8],
    entry_name: Option<&[u8]>,
    reader: &dyn TreeReader,
    cb: &mut dyn TreeDiffCb,
) -> Result<(), FileIndexError> {
    if let Some(te) = tree.entry(*tidx) {
        if te.mode.is_tree() {
            let sub = subpath(path, &te.name);
            let subtree = reader.read_tree(&te.id)?;
            diff_tree_level(index, cursor, &subtree, &sub, entry_name, reader, cb)?;
        }
    }
    *tidx += 1;
    Ok(())
}

fn name_matches(entry_name: Option<&[u8]>, name: &[u8]) -> bool {
    entry_name.map_or(true, |wanted| wanted == name)
}

/// Tree entries that represent file content. Subtrees are walked, not
/// reported, and submodules are skipped outright.
fn is_leaf(te: &TreeEntry) -> bool {
    !te.mode.is_tree() && !te.mode.is_submodule()
}

/// Diff the index entries below `path` against the directory
/// `rootpath/path` in the working tree.
pub fn diff_dir(
    index: &mut FileIndex,
    rootpath: &Path,
    path: &[u8],
    cb: &mut dyn DirDiffCb,
) -> Result<(), FileIndexError> {
    let dirpath = on_disk_path(rootpath, path);
    let listing = read_dirlist(&dirpath, path.is_empty())?;
    let mut cursor = IndexCursor::new(index);
    cursor.seek_into(index, path);
    diff_dir_level(index, &mut cursor, &listing, rootpath, path, cb)
}

fn diff_dir_level(
    index: &mut FileIndex,
    cursor: &mut IndexCursor,
    listing: &[DirEntryInfo],
    rootpath: &Path,
    path: &[u8],
    cb: &mut dyn DirDiffCb,
) -> Result<(), FileIndexError> {
    let mut didx = 0usize;

    loop {
        let de = listing.get(didx);
        let ie_path = cursor.current(index).cloned();
        let ie_is_child = ie_path
            .as_ref()
            .is_some_and(|p| is_child(p, path));

        if !ie_is_child && de.is_none() {
            break;
        }

        match (de, &ie_path) {
            (Some(de), Some(ie_path)) => {
                let de_path = subpath(path, &de.name);
                match path_cmp(ie_path, &de_path) {
                    Ordering::Equal => {
                        let ie = index.get_mut(ie_path).expect("cursor entry present");
                        cb.diff_old_new(ie, de, BStr::new(path))?;
                        cursor.advance(index);
                        walk_dir(index, cursor, listing, &mut didx, rootpath, path, cb)?;
                    }
                    Ordering::Less => {
                        let ie = index.get_mut(ie_path).expect("cursor entry present");
                        cb.diff_old(ie, BStr::new(path))?;
                        cursor.advance(index);
                    }
                    Ordering::Greater => {
                        // Subdirectories recurse below; only files are
                        // diffable keys.
                        if !de.is_dir {
                            cb.diff_new(de, BStr::new(path))?;
                        }
                        walk_dir(index, cursor, listing, &mut didx, rootpath, path, cb)?;
                    }
                }
            }
            (None, Some(ie_path)) => {
                let ie = index.get_mut(ie_path).expect("cursor entry present");
                cb.diff_old(ie, BStr::new(path))?;
                cursor.advance(index);
            }
            (Some(de), None) => {
                if !de.is_dir {
                    cb.diff_new(de, BStr::new(path))?;
                }
                walk_dir(index, cursor, listing, &mut didx, rootpath, path, cb)?;
            }
            (None, None) => break,
        }
    }

    Ok(())
}

/// Recurse into `listing[didx]` when it is a directory, then step the
/// directory cursor forward. Subdirectories we may not open are
/// silently skipped.
fn walk_dir(
    index: &mut FileIndex,
    cursor: &mut IndexCursor,
    listing: &[DirEntryInfo],
    didx: &mut usize,
    rootpath: &Path,
    path: &[u8],
    cb: &mut dyn DirDiffCb,
) -> Result<(), FileIndexError> {
    if let Some(de) = listing.get(*didx) {
        if de.is_dir {
            let sub = subpath(path, &de.name);
            let subdirpath = on_disk_path(rootpath, &sub);
            match read_dirlist(&subdirpath, false) {
                Ok(sublisting) => {
                    diff_dir_level(index, cursor, &sublisting, rootpath, &sub, cb)?;
                }
                Err(FileIndexError::Io(e))
                    if e.kind() == std::io::ErrorKind::PermissionDenied =>
                {
                    // unreadable subtree, pretend it is not there
                }
                Err(e) => return Err(e),
            }
        }
    }
    *didx += 1;
    Ok(())
}

fn on_disk_path(rootpath: &Path, path: &[u8]) -> PathBuf {
    if path.is_empty() {
        rootpath.to_path_buf()
    } else {
        rootpath.join(path.to_str_lossy().as_ref())
    }
}

/// Read a directory into tree order: byte order with directories
/// compared as if their name carried a trailing '/'. `.` and `..` are
/// never reported; the tool's own metadata directory is excluded at the
/// worktree root.
fn read_dirlist(dirpath: &Path, at_root: bool) -> Result<Vec<DirEntryInfo>, FileIndexError> {
    let mut listing = Vec::new();
    for entry in std::fs::read_dir(dirpath)? {
        let entry = entry?;
        let name = BString::from(entry.file_name().to_string_lossy().as_bytes());
        if at_root && name == META_DIR {
            continue;
        }
        let is_dir = entry.file_type()?.is_dir();
        listing.push(DirEntryInfo { name, is_dir });
    }
    listing.sort_by(|a, b| dir_name_cmp(a, b));
    for pair in listing.windows(2) {
        if pair[0].name == pair[1].name {
            return Err(FileIndexError::DirDupEntry(pair[0].name.to_string()));
        }
    }
    Ok(listing)
}

/// Same convention as git tree entries: directories compare with an
/// implicit trailing '/'.
fn dir_name_cmp(a: &DirEntryInfo, b: &DirEntryInfo) -> Ordering {
    let mut ka = a.name.clone();
    if a.is_dir {
        ka.push(b'/');
    }
    let mut kb = b.name.clone();
    if b.is_dir {
        kb.push(b'/');
    }
    ka.cmp(&kb)
}
