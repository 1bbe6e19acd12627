//! Packfile reading for grot: the pack-index v2 directory, per-entry
//! header decoding, OFS/REF delta chain resolution with a bounded LRU
//! delta cache, and object reconstruction to memory or to a file.
//!
//! Packs are opened read-only. The pack may be memory-mapped or accessed
//! with positioned reads; both paths produce identical bytes.

pub mod delta;
pub mod entry;
pub mod index;
pub mod pack;

use grot_hash::ObjectId;

pub use index::PackIndex;
pub use pack::Pack;

/// Errors produced by pack operations, mirroring the failure taxonomy of
/// the on-disk formats.
#[derive(Debug, thiserror::Error)]
pub enum PackError {
    #[error("invalid pack index: {0}")]
    BadPackIdx(String),

    #[error("pack index checksum mismatch")]
    PackIdxChecksum,

    #[error("invalid pack file: {0}")]
    BadPackFile(String),

    #[error("pack offset {0} out of bounds")]
    PackOffset(u64),

    #[error("unknown object type code: {0}")]
    ObjType(u8),

    #[error("delta chain has no terminal base object")]
    BadDeltaChain,

    #[error("invalid delta at offset {offset}: {reason}")]
    BadDelta { offset: u64, reason: String },

    #[error("delta chain exceeds recursion limit")]
    Recursion,

    #[error("buffer too small")]
    NoSpace,

    #[error(transparent)]
    Hash(#[from] grot_hash::HashError),

    #[error(transparent)]
    Object(#[from] grot_object::ObjectError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Pack file signature and version.
pub const PACK_SIGNATURE: &[u8; 4] = b"PACK";
pub const PACK_VERSION: u32 = 2;
pub const PACK_HEADER_SIZE: usize = 12;

/// Pack index v2 magic `\377tOc` and version.
pub const PACKIDX_V2_MAGIC: [u8; 4] = [0xff, 0x74, 0x4f, 0x63];
pub const PACKIDX_VERSION: u32 = 2;

/// High bit of a 4-byte offset slot: the remaining 31 bits index the
/// large-offset table.
pub const PACKIDX_OFFSET_LARGE: u32 = 0x8000_0000;
pub const PACKIDX_OFFSET_MASK: u32 = 0x7fff_ffff;

/// Delta chains longer than this are rejected.
pub const DELTA_CHAIN_RECURSION_MAX: usize = 500;

/// Chains whose largest intermediate result fits below this run fully in
/// memory; larger chains go through scratch files.
pub const DELTA_RESULT_SIZE_CACHED_MAX: u64 = 8 * 1024 * 1024;

/// Pack entry type codes as stored in entry headers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PackTypeCode {
    Commit,
    Tree,
    Blob,
    Tag,
    OfsDelta,
    RefDelta,
}

impl PackTypeCode {
    pub fn from_code(code: u8) -> Result<Self, PackError> {
        match code {
            1 => Ok(Self::Commit),
            2 => Ok(Self::Tree),
            3 => Ok(Self::Blob),
            4 => Ok(Self::Tag),
            6 => Ok(Self::OfsDelta),
            7 => Ok(Self::RefDelta),
            other => Err(PackError::ObjType(other)),
        }
    }

    /// The plain object type, for non-delta codes.
    pub fn to_object_type(self) -> Option<grot_object::ObjectType> {
        match self {
            Self::Commit => Some(grot_object::ObjectType::Commit),
            Self::Tree => Some(grot_object::ObjectType::Tree),
            Self::Blob => Some(grot_object::ObjectType::Blob),
            Self::Tag => Some(grot_object::ObjectType::Tag),
            Self::OfsDelta | Self::RefDelta => None,
        }
    }

    pub fn is_delta(self) -> bool {
        matches!(self, Self::OfsDelta | Self::RefDelta)
    }
}

/// A fully reconstructed object read from a pack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackedObject {
    pub obj_type: grot_object::ObjectType,
    pub data: Vec<u8>,
}

/// Location metadata for an object opened inside a pack, before its
/// bytes are extracted.
#[derive(Debug, Clone)]
pub struct PackedObjectHandle {
    pub id: ObjectId,
    /// Resolved object type (the terminal base type for deltas).
    pub obj_type: grot_object::ObjectType,
    /// Declared size; zero for deltified entries until reconstruction.
    pub size: u64,
    /// Offset of the entry (plain: start of compressed data; delta:
    /// start of the entry header).
    pub offset: u64,
    /// Resolved delta chain, base first. Empty for plain objects.
    pub deltas: Vec<delta::Delta>,
}

impl PackedObjectHandle {
    pub fn is_deltified(&self) -> bool {
        !self.deltas.is_empty()
    }
}
