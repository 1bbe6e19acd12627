//! Privilege-separation plumbing: a length-prefixed frame protocol over
//! a Unix socket pair, carrying typed messages and at most one file
//! descriptor per frame, plus supervision of the libexec helper
//! processes that do the parsing and decompression.
//!
//! The main process opens repository files and passes descriptors to a
//! helper; the helper parses bytes under OS sandboxing and replies with
//! structured records. One request is outstanding per helper at a time.

pub mod child;
pub mod frame;
pub mod msg;

pub use child::PrivsepChild;
pub use frame::{Channel, Frame};
pub use msg::MsgType;

/// Maximum size of one frame, header included.
pub const MAX_FRAME_SIZE: usize = 16384;

/// Frame header: type u32, len u16, peerid u32, pid u32 (host order).
pub const FRAME_HEADER_SIZE: usize = 14;

/// Largest payload a single frame can carry.
pub const MAX_FRAME_DATA: usize = MAX_FRAME_SIZE - FRAME_HEADER_SIZE;

/// The descriptor number a spawned helper finds its channel on.
pub const CHILD_CHANNEL_FD: i32 = 3;

/// Error kinds carried inside error frames.
///
/// The child encodes the failure it hit; the parent maps the code back
/// to an equivalent host-side error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireErrorKind {
    Errno,
    Io,
    Timeout,
    NoSpace,
    BadPackIdx,
    BadPackFile,
    PackOffset,
    PackIdxChecksum,
    BadDeltaChain,
    ObjType,
    BadObjData,
    BadObjId,
    BadObjIdStr,
    Recursion,
    NoObj,
    ObjExists,
    AmbiguousObjId,
}

impl WireErrorKind {
    pub fn code(self) -> u32 {
        match self {
            Self::Errno => 1,
            Self::Io => 2,
            Self::Timeout => 3,
            Self::NoSpace => 4,
            Self::BadPackIdx => 5,
            Self::BadPackFile => 6,
            Self::PackOffset => 7,
            Self::PackIdxChecksum => 8,
            Self::BadDeltaChain => 9,
            Self::ObjType => 10,
            Self::BadObjData => 11,
            Self::BadObjId => 12,
            Self::BadObjIdStr => 13,
            Self::Recursion => 14,
            Self::NoObj => 15,
            Self::ObjExists => 16,
            Self::AmbiguousObjId => 17,
        }
    }

    pub fn from_code(code: u32) -> Option<Self> {
        Some(match code {
            1 => Self::Errno,
            2 => Self::Io,
            3 => Self::Timeout,
            4 => Self::NoSpace,
            5 => Self::BadPackIdx,
            6 => Self::BadPackFile,
            7 => Self::PackOffset,
            8 => Self::PackIdxChecksum,
            9 => Self::BadDeltaChain,
            10 => Self::ObjType,
            11 => Self::BadObjData,
            12 => Self::BadObjId,
            13 => Self::BadObjIdStr,
            14 => Self::Recursion,
            15 => Self::NoObj,
            16 => Self::ObjExists,
            17 => Self::AmbiguousObjId,
            _ => return None,
        })
    }
}

/// Errors produced by the privsep channel and helper supervision.
#[derive(Debug, thiserror::Error)]
pub enum PrivsepError {
    #[error("privsep channel closed by peer")]
    Pipe,

    #[error("short read on privsep channel")]
    Read,

    #[error("unexpected privsep message type {0}")]
    Msg(u32),

    #[error("invalid privsep message length {0}")]
    Len(usize),

    #[error("expected file descriptor missing from privsep message")]
    NoFd,

    #[error("privsep child died unexpectedly")]
    Died,

    #[error("privsep child exited abnormally")]
    Exit,

    #[error("timeout waiting for privsep peer")]
    Timeout,

    #[error("interrupted while polling privsep channel")]
    Interrupt,

    /// An error frame received from the peer.
    #[error("privsep peer reported {kind:?} (errno {errno})")]
    Remote { kind: WireErrorKind, errno: i32 },

    #[error(transparent)]
    Object(#[from] grot_object::ObjectError),

    #[error(transparent)]
    Hash(#[from] grot_hash::HashError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("privsep system call failed: {0}")]
    Sys(#[from] nix::errno::Errno),
}

impl PrivsepError {
    /// The wire kind used when shipping this error across the channel.
    pub fn wire_kind(&self) -> WireErrorKind {
        match self {
            Self::Timeout => WireErrorKind::Timeout,
            Self::Io(_) => WireErrorKind::Io,
            Self::Sys(_) => WireErrorKind::Errno,
            Self::Remote { kind, .. } => *kind,
            Self::Object(_) => WireErrorKind::BadObjData,
            Self::Hash(_) => WireErrorKind::BadObjId,
            _ => WireErrorKind::Io,
        }
    }
}
