//! File-index serialization with a rolling SHA-1 over every byte.

use std::io::Write;

use grot_hash::Hasher;

use crate::{FileIndex, FileIndexError, FILE_INDEX_SIGNATURE, FILE_INDEX_VERSION};

struct ChecksumWriter<'a, W: Write> {
    out: &'a mut W,
    hasher: Hasher,
}

impl<'a, W: Write> ChecksumWriter<'a, W> {
    fn new(out: &'a mut W) -> Self {
        Self {
            out,
            hasher: Hasher::new(),
        }
    }

    fn put(&mut self, bytes: &[u8]) -> Result<(), FileIndexError> {
        self.hasher.update(bytes);
        self.out.write_all(bytes)?;
        Ok(())
    }
}

impl FileIndex {
    /// Serialize the index, clearing the not-flushed flag on every
    /// entry. The trailing SHA-1 covers every byte written before it.
    pub fn write(&mut self, out: &mut impl Write) -> Result<(), FileIndexError> {
        let mut w = ChecksumWriter::new(out);

        w.put(&FILE_INDEX_SIGNATURE.to_be_bytes())?;
        w.put(&FILE_INDEX_VERSION.to_be_bytes())?;
        w.put(&(self.len() as u32).to_be_bytes())?;

        let paths = self.path_snapshot();
        for path in paths {
            let entry = self.get_mut(&path).expect("snapshot path present");
            entry.set_not_flushed(false);

            w.put(&entry.ctime_sec.to_be_bytes())?;
            w.put(&entry.ctime_nsec.to_be_bytes())?;
            w.put(&entry.mtime_sec.to_be_bytes())?;
            w.put(&entry.mtime_nsec.to_be_bytes())?;
            w.put(&entry.uid.to_be_bytes())?;
            w.put(&entry.gid.to_be_bytes())?;
            w.put(&entry.size.to_be_bytes())?;
            w.put(&entry.mode.to_be_bytes())?;
            w.put(entry.blob.as_bytes())?;
            w.put(entry.commit.as_bytes())?;
            w.put(&entry.flags.to_be_bytes())?;
            write_path(&mut w, &entry.path)?;
            if entry.stage().has_staged_blob() {
                w.put(entry.staged_blob.as_bytes())?;
            }
        }

        let digest = w.hasher.finalize();
        out.write_all(digest.as_bytes())?;
        out.flush()?;
        Ok(())
    }
}

/// Write the NUL-terminated path, padded with NULs to a multiple of 8
/// bytes. An already-aligned path still gets a full 8 NULs so the
/// terminator is always present.
fn write_path<W: Write>(w: &mut ChecksumWriter<'_, W>, path: &[u8]) -> Result<(), FileIndexError> {
    const ZERO: [u8; 8] = [0; 8];
    let mut pad = 0usize;
    while (path.len() + pad) % 8 != 0 {
        pad += 1;
    }
    if pad == 0 {
        pad = 8;
    }
    w.put(path)?;
    w.put(&ZERO[..pad])?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FileIndexEntry;
    use bstr::BString;

    #[test]
    fn single_entry_file_size_is_exact() {
        // Header 12 + fixed fields 90 + "a/b.txt\0" padded to 8 + trailer 20.
        let mut idx = FileIndex::new();
        let mut e = FileIndexEntry::from_fields(BString::from("a/b.txt"));
        e.uid = 1000;
        e.gid = 1000;
        idx.add(e).unwrap();

        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 12 + 90 + 8 + 20);
    }

    #[test]
    fn aligned_path_still_gets_eight_nuls() {
        let mut idx = FileIndex::new();
        idx.add(FileIndexEntry::from_fields(BString::from("12345678")))
            .unwrap();
        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();
        assert_eq!(buf.len(), 12 + 90 + 8 + 8 + 20);
    }

    #[test]
    fn write_clears_not_flushed() {
        let mut idx = FileIndex::new();
        idx.add(FileIndexEntry::from_fields(BString::from("f"))).unwrap();
        assert!(idx.get(b"f").unwrap().not_flushed());
        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();
        assert!(!idx.get(b"f").unwrap().not_flushed());
    }

    #[test]
    fn staged_entry_carries_staged_blob() {
        use crate::Stage;
        let mut idx = FileIndex::new();
        let mut e = FileIndexEntry::from_fields(BString::from("f"));
        e.set_stage(Stage::Modify);
        idx.add(e).unwrap();
        let mut buf = Vec::new();
        idx.write(&mut buf).unwrap();
        // "f" pads to 8; the staged blob adds 20 bytes.
        assert_eq!(buf.len(), 12 + 90 + 8 + 20 + 20);
    }
}
