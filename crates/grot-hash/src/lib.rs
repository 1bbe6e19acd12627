//! Object identity for grot: the 20-byte SHA-1 `ObjectId`, hex
//! encoding/decoding, streaming hash computation, the pack-index fanout
//! table, and the ordered id set used by the commit graph.

mod error;
pub mod fanout;
pub mod hasher;
pub mod hex;
pub mod idset;
mod oid;

pub use error::HashError;
pub use fanout::FanoutTable;
pub use hasher::Hasher;
pub use idset::ObjectIdSet;
pub use oid::{IdPrefix, ObjectId, SHA1_DIGEST_LENGTH};
