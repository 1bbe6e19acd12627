use std::cmp::Ordering;

use bstr::{BStr, BString, ByteSlice};
use grot_hash::ObjectId;

use crate::ObjectError;

/// Tree entry mode, decoded from the octal prefix of a tree entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TreeEntryMode {
    /// Regular file (100644)
    Regular,
    /// Executable file (100755)
    Executable,
    /// Symbolic link (120000)
    Symlink,
    /// Submodule link (160000)
    Submodule,
    /// Subdirectory (040000)
    Tree,
}

impl TreeEntryMode {
    /// Parse from octal ASCII bytes (e.g. `b"100644"`).
    pub fn from_octal(s: &[u8]) -> Result<Self, ObjectError> {
        let mut raw: u32 = 0;
        if s.is_empty() {
            return Err(ObjectError::BadObjectData("empty tree entry mode".into()));
        }
        for &b in s {
            if !(b'0'..=b'7').contains(&b) {
                return Err(ObjectError::BadObjectData(format!(
                    "invalid mode byte {:#x}",
                    b
                )));
            }
            raw = raw * 8 + u32::from(b - b'0');
        }
        Self::from_raw(raw)
    }

    pub fn from_raw(raw: u32) -> Result<Self, ObjectError> {
        match raw {
            0o100644 | 0o100664 => Ok(Self::Regular),
            0o100755 => Ok(Self::Executable),
            0o120000 => Ok(Self::Symlink),
            0o160000 => Ok(Self::Submodule),
            0o040000 => Ok(Self::Tree),
            other => Err(ObjectError::BadObjectData(format!(
                "unsupported tree entry mode {other:o}"
            ))),
        }
    }

    pub fn raw(&self) -> u32 {
        match self {
            Self::Regular => 0o100644,
            Self::Executable => 0o100755,
            Self::Symlink => 0o120000,
            Self::Submodule => 0o160000,
            Self::Tree => 0o40000,
        }
    }

    pub fn is_tree(&self) -> bool {
        matches!(self, Self::Tree)
    }

    pub fn is_submodule(&self) -> bool {
        matches!(self, Self::Submodule)
    }

    pub fn is_symlink(&self) -> bool {
        matches!(self, Self::Symlink)
    }
}

/// One entry of a tree: (name, mode, id).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: TreeEntryMode,
    pub name: BString,
    pub id: ObjectId,
}

impl TreeEntry {
    /// Compare entries in git tree order.
    ///
    /// Directories sort as if their name carried a trailing '/', so the
    /// directory "foo" lands after "foo.c" but before "foo0".
    pub fn cmp_entries(a: &TreeEntry, b: &TreeEntry) -> Ordering {
        tree_name_cmp(
            a.name.as_ref(),
            a.mode.is_tree(),
            b.name.as_ref(),
            b.mode.is_tree(),
        )
    }
}

impl PartialOrd for TreeEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for TreeEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        Self::cmp_entries(self, other)
    }
}

/// Git's canonical tree-entry name comparison: byte order with an
/// implicit trailing '/' on directory names.
fn tree_name_cmp(name1: &[u8], is_dir1: bool, name2: &[u8], is_dir2: bool) -> Ordering {
    let min_len = name1.len().min(name2.len());
    let cmp = name1[..min_len].cmp(&name2[..min_len]);
    if cmp != Ordering::Equal {
        return cmp;
    }
    let c1 = if name1.len() > min_len {
        name1[min_len]
    } else if is_dir1 {
        b'/'
    } else {
        0
    };
    let c2 = if name2.len() > min_len {
        name2[min_len]
    } else if is_dir2 {
        b'/'
    } else {
        0
    };
    c1.cmp(&c2)
}

/// A parsed tree record — an ordered directory listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    /// Parse tree content. Each entry is `<mode> <name>\0<20 id bytes>`.
    pub fn parse(content: &[u8]) -> Result<Self, ObjectError> {
        let mut entries = Vec::new();
        let mut pos = 0;

        while pos < content.len() {
            let space_pos = content[pos..]
                .find_byte(b' ')
                .ok_or(ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "missing space after mode".into(),
                })?
                + pos;
            let mode = TreeEntryMode::from_octal(&content[pos..space_pos]).map_err(|_| {
                ObjectError::InvalidTreeEntry {
                    offset: pos,
                    reason: "invalid mode".into(),
                }
            })?;

            let name_start = space_pos + 1;
            let null_pos = content[name_start..]
                .find_byte(b'\0')
                .ok_or(ObjectError::InvalidTreeEntry {
                    offset: name_start,
                    reason: "missing NUL after name".into(),
                })?
                + name_start;
            let name = BString::from(&content[name_start..null_pos]);

            let id_start = null_pos + 1;
            let id_end = id_start + grot_hash::SHA1_DIGEST_LENGTH;
            if id_end > content.len() {
                return Err(ObjectError::InvalidTreeEntry {
                    offset: id_start,
                    reason: "truncated object id".into(),
                });
            }
            let id = ObjectId::from_bytes(&content[id_start..id_end])?;

            entries.push(TreeEntry { mode, name, id });
            pos = id_end;
        }

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entry(&self, idx: usize) -> Option<&TreeEntry> {
        self.entries.get(idx)
    }

    /// Look up an entry by name.
    pub fn find(&self, name: &BStr) -> Option<&TreeEntry> {
        self.entries.iter().find(|e| e.name.as_bstr() == name)
    }
}
