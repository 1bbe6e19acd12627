//! File-index deserialization with checksum verification.

use std::io::Read;

use bstr::BString;
use grot_hash::{Hasher, ObjectId, SHA1_DIGEST_LENGTH};

use crate::entry::{FileIndexEntry, F_STAGE};
use crate::{FileIndex, FileIndexError, FILE_INDEX_SIGNATURE, FILE_INDEX_VERSION};

struct ChecksumReader<'a, R: Read> {
    input: &'a mut R,
    hasher: Hasher,
}

impl<'a, R: Read> ChecksumReader<'a, R> {
    fn new(input: &'a mut R) -> Self {
        Self {
            input,
            hasher: Hasher::new(),
        }
    }

    fn get(&mut self, buf: &mut [u8]) -> Result<(), FileIndexError> {
        self.input
            .read_exact(buf)
            .map_err(|_| FileIndexError::Bad)?;
        self.hasher.update(buf);
        Ok(())
    }

    fn get_u16(&mut self) -> Result<u16, FileIndexError> {
        let mut b = [0u8; 2];
        self.get(&mut b)?;
        Ok(u16::from_be_bytes(b))
    }

    fn get_u32(&mut self) -> Result<u32, FileIndexError> {
        let mut b = [0u8; 4];
        self.get(&mut b)?;
        Ok(u32::from_be_bytes(b))
    }

    fn get_u64(&mut self) -> Result<u64, FileIndexError> {
        let mut b = [0u8; 8];
        self.get(&mut b)?;
        Ok(u64::from_be_bytes(b))
    }

    fn get_id(&mut self) -> Result<ObjectId, FileIndexError> {
        let mut b = [0u8; SHA1_DIGEST_LENGTH];
        self.get(&mut b)?;
        Ok(ObjectId::from_bytes(&b).expect("20 bytes"))
    }

    /// Read the NUL-terminated, 8-aligned path.
    fn get_path(&mut self) -> Result<BString, FileIndexError> {
        let mut raw = Vec::new();
        loop {
            let mut chunk = [0u8; 8];
            self.get(&mut chunk)?;
            raw.extend_from_slice(&chunk);
            if chunk.contains(&0) {
                break;
            }
        }
        let nul = raw.iter().position(|&b| b == 0).expect("chunk had a NUL");
        raw.truncate(nul);
        Ok(BString::from(raw))
    }
}

impl FileIndex {
    /// Parse an index from a reader.
    ///
    /// Empty input yields an empty index. A bad magic, a version newer
    /// than this implementation, or a trailer mismatch are errors.
    pub fn read(input: &mut impl Read) -> Result<Self, FileIndexError> {
        let mut index = FileIndex::new();
        let mut r = ChecksumReader::new(input);

        let mut sig_bytes = [0u8; 4];
        let mut filled = 0usize;
        while filled < 4 {
            let n = r
                .input
                .read(&mut sig_bytes[filled..])
                .map_err(|_| FileIndexError::Bad)?;
            if n == 0 {
                break;
            }
            filled += n;
        }
        if filled == 0 {
            return Ok(index); // empty file
        }
        if filled < 4 {
            return Err(FileIndexError::Bad);
        }
        r.hasher.update(&sig_bytes);
        let signature = u32::from_be_bytes(sig_bytes);
        let version = r.get_u32()?;
        let nentries = r.get_u32()?;

        if signature != FILE_INDEX_SIGNATURE {
            return Err(FileIndexError::Signature);
        }
        if version > FILE_INDEX_VERSION {
            return Err(FileIndexError::Version(version));
        }

        for _ in 0..nentries {
            let entry = read_entry(&mut r, version)?;
            index.add_read(entry)?;
        }

        let expected_digest = {
            let mut b = [0u8; SHA1_DIGEST_LENGTH];
            r.input
                .read_exact(&mut b)
                .map_err(|_| FileIndexError::Bad)?;
            b
        };
        let computed = r.hasher.finalize();
        if computed.as_bytes() != &expected_digest {
            return Err(FileIndexError::Checksum);
        }

        Ok(index)
    }
}

fn read_entry<R: Read>(
    r: &mut ChecksumReader<'_, R>,
    version: u32,
) -> Result<FileIndexEntry, FileIndexError> {
    let ctime_sec = r.get_u64()?;
    let ctime_nsec = r.get_u64()?;
    let mtime_sec = r.get_u64()?;
    let mtime_nsec = r.get_u64()?;
    let uid = r.get_u32()?;
    let gid = r.get_u32()?;
    let size = r.get_u32()?;
    let mode = r.get_u16()?;
    let blob = r.get_id()?;
    let commit = r.get_id()?;
    let mut flags = r.get_u32()?;
    let path = r.get_path()?;

    let mut entry = FileIndexEntry::from_fields(path);
    entry.ctime_sec = ctime_sec;
    entry.ctime_nsec = ctime_nsec;
    entry.mtime_sec = mtime_sec;
    entry.mtime_nsec = mtime_nsec;
    entry.uid = uid;
    entry.gid = gid;
    entry.size = size;
    entry.mode = mode;
    entry.blob = blob;
    entry.commit = commit;

    if version < 2 {
        // Version 1 predates staging.
        flags &= !F_STAGE;
    }
    entry.flags = flags;

    if version >= 2 && entry.stage().has_staged_blob() {
        entry.staged_blob = r.get_id()?;
    }

    Ok(entry)
}
