//! Repository-relative path comparison and manipulation.
//!
//! Paths handled here are always relative to the repository root and use
//! `/` separators. The comparison order is the order Git writes into tree
//! objects: plain byte order over full paths, where a directory only ever
//! appears through its children and therefore carries its `/` at the
//! point of divergence. Both the tree walk and the directory walk of the
//! file index rely on this being one and the same order.

use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};

/// Compare two repository-relative paths in tree order.
///
/// Trailing slashes are insignificant: `"a/b/"` equals `"a/b"`.
pub fn path_cmp(path1: &[u8], path2: &[u8]) -> Ordering {
    let p1 = strip_trailing_slash(path1);
    let p2 = strip_trailing_slash(path2);
    p1.cmp(p2)
}

fn strip_trailing_slash(path: &[u8]) -> &[u8] {
    if path.len() > 1 && path.ends_with(b"/") {
        &path[..path.len() - 1]
    } else {
        path
    }
}

/// Is `child` inside the directory `parent`?
///
/// The empty parent denotes the repository root and contains everything.
pub fn is_child(child: &[u8], parent: &[u8]) -> bool {
    if parent.is_empty() {
        return true;
    }
    child.len() > parent.len()
        && child.starts_with(parent)
        && child[parent.len()] == b'/'
}

/// Join a walk prefix and an entry name; the empty prefix denotes the root.
pub fn subpath(path: &[u8], name: &[u8]) -> BString {
    let mut out = BString::from(path);
    if !out.is_empty() {
        out.push(b'/');
    }
    out.extend_from_slice(name);
    out
}

/// The final component of a repository-relative path.
pub fn basename(path: &[u8]) -> &BStr {
    match path.rfind_byte(b'/') {
        Some(pos) => BStr::new(&path[pos + 1..]),
        None => BStr::new(path),
    }
}
