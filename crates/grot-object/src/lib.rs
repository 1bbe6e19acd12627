//! Object model for grot: parsing commit, tree, tag, and blob bytes into
//! typed records, plus the loose-object header and the metadata handle
//! that tracks where a decoded object came from.

mod blob;
mod commit;
pub mod header;
mod tag;
mod tree;

pub use blob::Blob;
pub use commit::Commit;
pub use tag::Tag;
pub use tree::{Tree, TreeEntry, TreeEntryMode};

use bstr::BString;
use grot_hash::HashError;

/// Errors produced by object decoding.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0}")]
    InvalidType(BString),

    #[error("unknown object type code: {0}")]
    UnknownTypeCode(u8),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),

    #[error("truncated object: expected {expected} bytes, got {actual}")]
    Truncated { expected: usize, actual: usize },

    #[error("invalid object data: {0}")]
    BadObjectData(String),

    #[error("invalid tree entry at offset {offset}: {reason}")]
    InvalidTreeEntry { offset: usize, reason: String },

    #[error("commit is missing its '{field}' header")]
    MissingCommitField { field: &'static str },

    #[error("tag is missing its '{field}' header")]
    MissingTagField { field: &'static str },

    #[error(transparent)]
    Hash(#[from] HashError),
}

/// The four plain object types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    /// Parse from the type name in loose object headers.
    pub fn from_name(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"commit" => Ok(Self::Commit),
            b"tree" => Ok(Self::Tree),
            b"blob" => Ok(Self::Blob),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidType(BString::from(s))),
        }
    }

    /// The canonical header name.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    /// Pack entry type code (1..=4; delta codes 6 and 7 live in the
    /// pack layer).
    pub fn code(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Decode a pack entry type code for a plain object.
    pub fn from_code(code: u8) -> Result<Self, ObjectError> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            other => Err(ObjectError::UnknownTypeCode(other)),
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A parsed object record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Object {
    Commit(Commit),
    Tree(Tree),
    Blob(Blob),
    Tag(Tag),
}

impl Object {
    /// Parse from loose bytes (header + content).
    pub fn parse_loose(data: &[u8]) -> Result<Self, ObjectError> {
        let (obj_type, content_size, header_len) = header::parse_header(data)?;
        let content = &data[header_len..];
        if content.len() < content_size {
            return Err(ObjectError::Truncated {
                expected: content_size,
                actual: content.len(),
            });
        }
        Self::parse_content(obj_type, &content[..content_size])
    }

    /// Parse from content bytes with known type (no header).
    pub fn parse_content(obj_type: ObjectType, content: &[u8]) -> Result<Self, ObjectError> {
        match obj_type {
            ObjectType::Commit => Ok(Self::Commit(Commit::parse(content)?)),
            ObjectType::Tree => Ok(Self::Tree(Tree::parse(content)?)),
            ObjectType::Blob => Ok(Self::Blob(Blob::parse(content)?)),
            ObjectType::Tag => Ok(Self::Tag(Tag::parse(content)?)),
        }
    }

    pub fn object_type(&self) -> ObjectType {
        match self {
            Self::Commit(_) => ObjectType::Commit,
            Self::Tree(_) => ObjectType::Tree,
            Self::Blob(_) => ObjectType::Blob,
            Self::Tag(_) => ObjectType::Tag,
        }
    }
}

/// Where a packed object lives: which pack, at what offset, and whether
/// the entry is a delta that still needs reconstruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PackedLocation {
    /// Index of the pack within the repository's pack list.
    pub pack_idx: usize,
    /// Byte offset of the entry within the pack file.
    pub offset: u64,
    /// True when the entry is an OFS or REF delta.
    pub deltified: bool,
}

/// Metadata describing a decoded object without its payload.
///
/// Created on decode and immutable thereafter. `size` is the declared
/// uncompressed size; for deltified entries it is only known after
/// reconstruction and starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ObjectHandle {
    pub obj_type: ObjectType,
    pub size: u64,
    pub header_len: usize,
    pub packed: Option<PackedLocation>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_names_round_trip() {
        for ty in [
            ObjectType::Commit,
            ObjectType::Tree,
            ObjectType::Blob,
            ObjectType::Tag,
        ] {
            assert_eq!(ObjectType::from_name(ty.name().as_bytes()).unwrap(), ty);
            assert_eq!(ObjectType::from_code(ty.code()).unwrap(), ty);
        }
        assert!(ObjectType::from_name(b"unknown").is_err());
    }

    #[test]
    fn delta_codes_are_not_plain_types() {
        assert!(matches!(
            ObjectType::from_code(6),
            Err(ObjectError::UnknownTypeCode(6))
        ));
        assert!(matches!(
            ObjectType::from_code(7),
            Err(ObjectError::UnknownTypeCode(7))
        ));
    }

    #[test]
    fn parse_loose_blob() {
        let obj = Object::parse_loose(b"blob 6\0hello\n").unwrap();
        match obj {
            Object::Blob(b) => assert_eq!(b.data, b"hello\n"),
            other => panic!("unexpected object: {other:?}"),
        }
    }

    #[test]
    fn parse_loose_truncated() {
        assert!(matches!(
            Object::parse_loose(b"blob 10\0hi"),
            Err(ObjectError::Truncated { expected: 10, actual: 2 })
        ));
    }
}
