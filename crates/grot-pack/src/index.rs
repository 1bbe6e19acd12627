//! Pack index (v2) reading and lookup.
//!
//! Layout:
//!
//! ```text
//! Header:   \377tOc | version (= 2)
//! Fanout:   256 x 4-byte big-endian cumulative counts
//! Ids:      N x 20-byte sorted ids
//! CRC32:    N x 4-byte values
//! Offsets:  N x 4-byte offsets (high bit -> 64-bit table)
//! 64-bit:   M x 8-byte offsets (packs > 2 GiB only)
//! Trailer:  20-byte pack checksum | 20-byte index checksum
//! ```

use std::fs::File;
use std::io::Read;
use std::path::{Path, PathBuf};

use grot_hash::{FanoutTable, Hasher, IdPrefix, ObjectId, SHA1_DIGEST_LENGTH};
use memmap2::Mmap;

use crate::{PackError, PACKIDX_OFFSET_LARGE, PACKIDX_OFFSET_MASK, PACKIDX_V2_MAGIC, PACKIDX_VERSION};

enum IdxData {
    Mapped(Mmap),
    Buffered(Vec<u8>),
}

impl IdxData {
    fn bytes(&self) -> &[u8] {
        match self {
            Self::Mapped(m) => m,
            Self::Buffered(b) => b,
        }
    }
}

/// Pack index (v2): a random-access directory of the objects in a pack.
pub struct PackIndex {
    data: IdxData,
    fanout: FanoutTable,
    num_objects: u32,
    num_large: usize,
    id_offset: usize,
    crc_offset: usize,
    offset32_offset: usize,
    offset64_offset: usize,
    trailer_offset: usize,
    path: PathBuf,
}

impl PackIndex {
    /// Open and validate a pack index file.
    ///
    /// Tries to memory-map the file; mapping failure falls back to a
    /// plain read. With `verify`, the trailing SHA-1 is recomputed.
    pub fn open(path: impl AsRef<Path>, verify: bool) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Self::from_file(file, path, verify)
    }

    /// Open from an already-open descriptor (helpers receive these over
    /// the privsep channel).
    pub fn from_file(mut file: File, path: PathBuf, verify: bool) -> Result<Self, PackError> {
        let data = match unsafe { Mmap::map(&file) } {
            Ok(map) => IdxData::Mapped(map),
            Err(_) => {
                let mut buf = Vec::new();
                file.read_to_end(&mut buf)?;
                IdxData::Buffered(buf)
            }
        };
        Self::parse(data, path, verify)
    }

    fn parse(data: IdxData, path: PathBuf, verify: bool) -> Result<Self, PackError> {
        let bytes = data.bytes();

        // header + fanout + trailer is the smallest possible index
        if bytes.len() < 8 + 1024 + 2 * SHA1_DIGEST_LENGTH {
            return Err(PackError::BadPackIdx("file too small".into()));
        }
        if bytes[0..4] != PACKIDX_V2_MAGIC {
            return Err(PackError::BadPackIdx("bad magic".into()));
        }
        let version = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        if version != PACKIDX_VERSION {
            return Err(PackError::BadPackIdx(format!(
                "unsupported version {version}"
            )));
        }

        let fanout = FanoutTable::from_bytes(&bytes[8..8 + 1024])
            .map_err(|_| PackError::BadPackIdx("fanout not cumulative".into()))?;
        let num_objects = fanout.total();
        let n = num_objects as usize;

        let id_offset = 8 + 1024;
        let crc_offset = id_offset + n * SHA1_DIGEST_LENGTH;
        let offset32_offset = crc_offset + n * 4;
        let offset64_offset = offset32_offset + n * 4;
        if bytes.len() < offset64_offset + 2 * SHA1_DIGEST_LENGTH {
            return Err(PackError::BadPackIdx("truncated tables".into()));
        }

        // Count large-offset slots to locate the trailer.
        let mut num_large = 0usize;
        for i in 0..n {
            let pos = offset32_offset + i * 4;
            let v = u32::from_be_bytes([
                bytes[pos],
                bytes[pos + 1],
                bytes[pos + 2],
                bytes[pos + 3],
            ]);
            if v & PACKIDX_OFFSET_LARGE != 0 {
                num_large += 1;
            }
        }
        let trailer_offset = offset64_offset + num_large * 8;
        if bytes.len() < trailer_offset + 2 * SHA1_DIGEST_LENGTH {
            return Err(PackError::BadPackIdx("truncated large-offset table".into()));
        }

        let index = Self {
            data,
            fanout,
            num_objects,
            num_large,
            id_offset,
            crc_offset,
            offset32_offset,
            offset64_offset,
            trailer_offset,
            path,
        };

        index.check_sorted()?;
        if verify {
            index.verify_checksum()?;
        }
        Ok(index)
    }

    /// The sorted-id table must be strictly increasing.
    fn check_sorted(&self) -> Result<(), PackError> {
        for i in 1..self.num_objects as usize {
            if self.id_bytes(i - 1) >= self.id_bytes(i) {
                return Err(PackError::BadPackIdx("ids not strictly increasing".into()));
            }
        }
        Ok(())
    }

    fn verify_checksum(&self) -> Result<(), PackError> {
        let bytes = self.data.bytes();
        let body_end = bytes.len() - SHA1_DIGEST_LENGTH;
        let computed = Hasher::digest(&bytes[..body_end]);
        if computed.as_bytes()[..] != bytes[body_end..] {
            return Err(PackError::PackIdxChecksum);
        }
        Ok(())
    }

    /// Look up an id, returning its position in the sorted table.
    pub fn lookup(&self, id: &ObjectId) -> Option<usize> {
        let range = self.fanout.range(id.first_byte());
        let target: &[u8] = id.as_bytes();

        let mut lo = range.start;
        let mut hi = range.end;
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            match self.id_bytes(mid).cmp(target) {
                std::cmp::Ordering::Less => lo = mid + 1,
                std::cmp::Ordering::Greater => hi = mid,
                std::cmp::Ordering::Equal => return Some(mid),
            }
        }
        None
    }

    /// All ids matching a hex prefix, in sorted order.
    ///
    /// The prefix must already satisfy the two-hex-char minimum enforced
    /// by [`IdPrefix::parse`].
    pub fn match_prefix(&self, prefix: &IdPrefix) -> Vec<ObjectId> {
        let mut matches = Vec::new();
        for i in self.fanout.range(prefix.first_byte()) {
            let id = self.id_at(i);
            if id.matches_prefix(prefix) {
                matches.push(id);
            }
        }
        matches
    }

    /// The id at a sorted table position.
    pub fn id_at(&self, idx: usize) -> ObjectId {
        ObjectId::from_bytes(self.id_bytes(idx)).expect("index table slot is 20 bytes")
    }

    /// The pack-file offset of the entry at a sorted table position.
    ///
    /// Rejects large-offset slots pointing outside the large-offset
    /// table and offsets that do not fit a signed 64-bit file offset.
    pub fn offset_at(&self, idx: usize) -> Result<u64, PackError> {
        let bytes = self.data.bytes();
        let pos = self.offset32_offset + idx * 4;
        let v = u32::from_be_bytes([
            bytes[pos],
            bytes[pos + 1],
            bytes[pos + 2],
            bytes[pos + 3],
        ]);
        if v & PACKIDX_OFFSET_LARGE != 0 {
            let slot = (v & PACKIDX_OFFSET_MASK) as usize;
            if slot >= self.num_large {
                return Err(PackError::BadPackIdx(format!(
                    "large-offset slot {slot} out of range"
                )));
            }
            let pos64 = self.offset64_offset + slot * 8;
            let raw = u64::from_be_bytes([
                bytes[pos64],
                bytes[pos64 + 1],
                bytes[pos64 + 2],
                bytes[pos64 + 3],
                bytes[pos64 + 4],
                bytes[pos64 + 5],
                bytes[pos64 + 6],
                bytes[pos64 + 7],
            ]);
            if raw > i64::MAX as u64 {
                return Err(PackError::BadPackIdx("large offset exceeds i64".into()));
            }
            Ok(raw)
        } else {
            Ok((v & PACKIDX_OFFSET_MASK) as u64)
        }
    }

    /// CRC32 of the raw entry bytes at a sorted table position.
    pub fn crc32_at(&self, idx: usize) -> u32 {
        let bytes = self.data.bytes();
        let pos = self.crc_offset + idx * 4;
        u32::from_be_bytes([bytes[pos], bytes[pos + 1], bytes[pos + 2], bytes[pos + 3]])
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Pack checksum recorded in the trailer.
    pub fn pack_checksum(&self) -> ObjectId {
        let bytes = self.data.bytes();
        ObjectId::from_bytes(&bytes[self.trailer_offset..self.trailer_offset + SHA1_DIGEST_LENGTH])
            .expect("trailer slot is 20 bytes")
    }

    /// Iterate all (id, offset) pairs in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, Result<u64, PackError>)> + '_ {
        (0..self.num_objects as usize).map(|i| (self.id_at(i), self.offset_at(i)))
    }

    fn id_bytes(&self, idx: usize) -> &[u8] {
        let start = self.id_offset + idx * SHA1_DIGEST_LENGTH;
        &self.data.bytes()[start..start + SHA1_DIGEST_LENGTH]
    }
}
