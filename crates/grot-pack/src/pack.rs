//! Pack file access and object reconstruction.
//!
//! A pack may be memory-mapped or read with positioned reads; every
//! reading routine goes through [`Pack::read_at`] so both paths produce
//! identical bytes. Delta chains are resolved against the pack's index
//! and replayed through a pair of scratch buffers (or scratch files for
//! chains past the in-memory threshold).

use std::cell::RefCell;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use flate2::read::ZlibDecoder;
use grot_hash::{ObjectId, SHA1_DIGEST_LENGTH};
use memmap2::Mmap;
use tracing::debug;

use crate::delta::cache::DeltaCache;
use crate::delta::{apply, delta_sizes, Delta};
use crate::entry::{parse_entry_header, parse_negative_offset, EntryHeader};
use crate::index::PackIndex;
use crate::{
    PackError, PackTypeCode, PackedObject, PackedObjectHandle, DELTA_CHAIN_RECURSION_MAX,
    DELTA_RESULT_SIZE_CACHED_MAX, PACK_HEADER_SIZE, PACK_SIGNATURE, PACK_VERSION,
};

enum PackData {
    Mapped(Mmap),
    File(File),
    #[cfg(test)]
    Buffered(Vec<u8>),
}

/// An open pack file.
pub struct Pack {
    data: PackData,
    filesize: u64,
    num_objects: u32,
    path: PathBuf,
    delta_cache: RefCell<DeltaCache>,
}

impl Pack {
    /// Open a pack, preferring mmap and falling back to positioned
    /// reads when mapping fails.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, PackError> {
        Self::open_with_mmap(path, true)
    }

    /// Open a pack with explicit control over the access mode.
    pub fn open_with_mmap(path: impl AsRef<Path>, use_mmap: bool) -> Result<Self, PackError> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        Self::from_file(file, path, use_mmap)
    }

    /// Open from an already-open descriptor (helpers receive these over
    /// the privsep channel).
    pub fn from_file(file: File, path: PathBuf, use_mmap: bool) -> Result<Self, PackError> {
        let filesize = file.metadata()?.len();

        let data = if use_mmap {
            match unsafe { Mmap::map(&file) } {
                Ok(map) => PackData::Mapped(map),
                Err(_) => PackData::File(file),
            }
        } else {
            PackData::File(file)
        };

        let pack = Self {
            data,
            filesize,
            num_objects: 0,
            path,
            delta_cache: RefCell::new(DeltaCache::new()),
        };
        pack.validate_header()
    }

    fn validate_header(mut self) -> Result<Self, PackError> {
        if self.filesize < (PACK_HEADER_SIZE + SHA1_DIGEST_LENGTH) as u64 {
            return Err(PackError::BadPackFile("file too small".into()));
        }
        let mut header = [0u8; PACK_HEADER_SIZE];
        self.read_at(0, &mut header)?;
        if &header[0..4] != PACK_SIGNATURE {
            return Err(PackError::BadPackFile("bad PACK signature".into()));
        }
        let version = u32::from_be_bytes([header[4], header[5], header[6], header[7]]);
        if version != PACK_VERSION {
            return Err(PackError::BadPackFile(format!(
                "unsupported version {version}"
            )));
        }
        self.num_objects = u32::from_be_bytes([header[8], header[9], header[10], header[11]]);
        debug!(path = %self.path.display(), objects = self.num_objects, "opened pack");
        Ok(self)
    }

    pub fn filesize(&self) -> u64 {
        self.filesize
    }

    pub fn num_objects(&self) -> u32 {
        self.num_objects
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read exactly `buf.len()` bytes at `offset`.
    pub fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<(), PackError> {
        if offset + buf.len() as u64 > self.filesize {
            return Err(PackError::PackOffset(offset));
        }
        match &self.data {
            PackData::Mapped(map) => {
                let start = offset as usize;
                buf.copy_from_slice(&map[start..start + buf.len()]);
                Ok(())
            }
            PackData::File(file) => {
                #[cfg(unix)]
                {
                    use std::os::unix::fs::FileExt;
                    file.read_exact_at(buf, offset)?;
                    Ok(())
                }
                #[cfg(not(unix))]
                {
                    let mut f = file;
                    f.seek(SeekFrom::Start(offset))?;
                    f.read_exact(buf)?;
                    Ok(())
                }
            }
            #[cfg(test)]
            PackData::Buffered(bytes) => {
                let start = offset as usize;
                buf.copy_from_slice(&bytes[start..start + buf.len()]);
                Ok(())
            }
        }
    }

    pub(crate) fn read_byte(&self, offset: u64) -> Result<u8, PackError> {
        let mut b = [0u8; 1];
        self.read_at(offset, &mut b)?;
        Ok(b[0])
    }

    /// Inflate the zlib stream starting at `offset` into memory.
    pub fn inflate_at(&self, offset: u64) -> Result<Vec<u8>, PackError> {
        if offset >= self.filesize {
            return Err(PackError::PackOffset(offset));
        }
        let mut decoder = ZlibDecoder::new(PackReader {
            pack: self,
            pos: offset,
        });
        let mut out = Vec::new();
        decoder
            .read_to_end(&mut out)
            .map_err(|_| PackError::BadPackFile(format!("corrupt zlib stream at {offset}")))?;
        Ok(out)
    }

    /// Inflate the zlib stream starting at `offset` into a writer,
    /// returning the inflated size.
    pub fn inflate_at_to(&self, offset: u64, out: &mut dyn Write) -> Result<u64, PackError> {
        if offset >= self.filesize {
            return Err(PackError::PackOffset(offset));
        }
        let mut decoder = ZlibDecoder::new(PackReader {
            pack: self,
            pos: offset,
        });
        let n = std::io::copy(&mut decoder, out)
            .map_err(|_| PackError::BadPackFile(format!("corrupt zlib stream at {offset}")))?;
        Ok(n)
    }

    /// Open the object at a sorted index position, resolving any delta
    /// chain but not yet extracting bytes.
    pub fn open_object(
        &self,
        packidx: &PackIndex,
        table_pos: usize,
        id: ObjectId,
    ) -> Result<PackedObjectHandle, PackError> {
        let offset = packidx.offset_at(table_pos)?;
        let header = parse_entry_header(self, offset)?;

        if let Some(obj_type) = header.type_code.to_object_type() {
            return Ok(PackedObjectHandle {
                id,
                obj_type,
                size: header.size,
                offset: offset + header.header_len as u64,
                deltas: Vec::new(),
            });
        }

        let mut chain = Vec::new();
        self.resolve_delta_chain(packidx, offset, header, &mut chain, DELTA_CHAIN_RECURSION_MAX)?;
        chain.reverse(); // terminal base first

        let base = chain.first().ok_or(PackError::BadDeltaChain)?;
        let obj_type = base.type_code.to_object_type().ok_or(PackError::BadDeltaChain)?;

        Ok(PackedObjectHandle {
            id,
            obj_type,
            size: 0, // unknown until the chain is applied
            offset: offset + header.header_len as u64,
            deltas: chain,
        })
    }

    /// Walk from an entry down to its terminal base, collecting chain
    /// links outermost-delta first.
    fn resolve_delta_chain(
        &self,
        packidx: &PackIndex,
        offset: u64,
        header: EntryHeader,
        chain: &mut Vec<Delta>,
        recursion: usize,
    ) -> Result<(), PackError> {
        if recursion == 0 {
            return Err(PackError::Recursion);
        }

        match header.type_code {
            PackTypeCode::Commit
            | PackTypeCode::Tree
            | PackTypeCode::Blob
            | PackTypeCode::Tag => {
                chain.push(Delta {
                    offset,
                    header_len: header.header_len,
                    type_code: header.type_code,
                    size: header.size,
                    data_offset: 0,
                });
                Ok(())
            }
            PackTypeCode::OfsDelta => {
                let ref_offset = offset + header.header_len as u64;
                let (neg_offset, consumed) = parse_negative_offset(self, ref_offset)?;
                let data_offset = ref_offset + consumed as u64;
                if data_offset >= self.filesize {
                    return Err(PackError::PackOffset(data_offset));
                }
                chain.push(Delta {
                    offset,
                    header_len: header.header_len,
                    type_code: header.type_code,
                    size: header.size,
                    data_offset,
                });

                // The base lies earlier in the same pack.
                if neg_offset >= offset {
                    return Err(PackError::BadPackFile(
                        "ofs-delta base offset before start of pack".into(),
                    ));
                }
                let base_offset = offset - neg_offset;
                if base_offset >= self.filesize {
                    return Err(PackError::PackOffset(base_offset));
                }
                let base_header = parse_entry_header(self, base_offset)?;
                self.resolve_delta_chain(packidx, base_offset, base_header, chain, recursion - 1)
            }
            PackTypeCode::RefDelta => {
                let ref_offset = offset + header.header_len as u64;
                let mut id_bytes = [0u8; SHA1_DIGEST_LENGTH];
                self.read_at(ref_offset, &mut id_bytes)?;
                let base_id = ObjectId::from_bytes(&id_bytes)?;
                let data_offset = ref_offset + SHA1_DIGEST_LENGTH as u64;
                if data_offset >= self.filesize {
                    return Err(PackError::PackOffset(data_offset));
                }
                chain.push(Delta {
                    offset,
                    header_len: header.header_len,
                    type_code: header.type_code,
                    size: header.size,
                    data_offset,
                });

                // The base must be indexable through this pack's index.
                let table_pos = packidx.lookup(&base_id).ok_or_else(|| {
                    PackError::BadPackFile(format!("ref-delta base {base_id} not in pack"))
                })?;
                let base_offset = packidx.offset_at(table_pos)?;
                if base_offset >= self.filesize {
                    return Err(PackError::PackOffset(base_offset));
                }
                let base_header = parse_entry_header(self, base_offset)?;
                self.resolve_delta_chain(packidx, base_offset, base_header, chain, recursion - 1)
            }
        }
    }

    /// Inflate a delta payload, consulting and feeding the cache.
    fn read_delta_data(&self, data_offset: u64) -> Result<Arc<Vec<u8>>, PackError> {
        if let Some(buf) = self.delta_cache.borrow_mut().get(data_offset) {
            return Ok(buf);
        }
        let buf = Arc::new(self.inflate_at(data_offset)?);
        match self.delta_cache.borrow_mut().add(data_offset, Arc::clone(&buf)) {
            Ok(()) | Err(PackError::NoSpace) => {} // uncached is fine
            Err(e) => return Err(e),
        }
        Ok(buf)
    }

    /// Largest (base size, result size) across a chain; both scratch
    /// buffers are sized to this before any pass.
    fn max_delta_size(&self, chain: &[Delta]) -> Result<u64, PackError> {
        let mut max = 0u64;
        for link in chain {
            if link.type_code.is_delta() {
                let buf = self.read_delta_data(link.data_offset)?;
                let (base_size, result_size) = delta_sizes(&buf)?;
                max = max.max(base_size).max(result_size);
            } else {
                max = max.max(link.size);
            }
        }
        Ok(max)
    }

    /// Reconstruct an object's bytes in memory.
    pub fn extract_to_mem(&self, handle: &PackedObjectHandle) -> Result<Vec<u8>, PackError> {
        if !handle.is_deltified() {
            if handle.offset >= self.filesize {
                return Err(PackError::PackOffset(handle.offset));
            }
            return self.inflate_at(handle.offset);
        }
        self.dump_chain_to_mem(&handle.deltas)
    }

    /// Reconstruct an object's bytes into `outfile`, using scratch
    /// files when the chain exceeds the in-memory threshold. Returns
    /// the object size.
    pub fn extract_to_file(
        &self,
        handle: &PackedObjectHandle,
        outfile: &mut File,
    ) -> Result<u64, PackError> {
        if !handle.is_deltified() {
            if handle.offset >= self.filesize {
                return Err(PackError::PackOffset(handle.offset));
            }
            let n = self.inflate_at_to(handle.offset, outfile)?;
            outfile.seek(SeekFrom::Start(0))?;
            return Ok(n);
        }
        self.dump_chain_to_file(&handle.deltas, outfile)
    }

    /// Convenience: look an id up and reconstruct it in memory.
    pub fn read_object(
        &self,
        packidx: &PackIndex,
        id: &ObjectId,
    ) -> Result<Option<PackedObject>, PackError> {
        let Some(table_pos) = packidx.lookup(id) else {
            return Ok(None);
        };
        let handle = self.open_object(packidx, table_pos, *id)?;
        let data = self.extract_to_mem(&handle)?;
        Ok(Some(PackedObject {
            obj_type: handle.obj_type,
            data,
        }))
    }

    fn chain_base_data(&self, base: &Delta) -> Result<Vec<u8>, PackError> {
        if base.type_code.is_delta() {
            return Err(PackError::BadDeltaChain);
        }
        let data_offset = base.offset + base.header_len as u64;
        if data_offset >= self.filesize {
            return Err(PackError::PackOffset(data_offset));
        }
        self.inflate_at(data_offset)
    }

    fn dump_chain_to_mem(&self, chain: &[Delta]) -> Result<Vec<u8>, PackError> {
        let base_link = chain.first().ok_or(PackError::BadDeltaChain)?;
        let max_size = self.max_delta_size(chain)? as usize;

        // Two buffers swap roles: current base, accumulation.
        let mut base = self.chain_base_data(base_link)?;
        base.reserve(max_size.saturating_sub(base.len()));
        let mut accum: Vec<u8> = Vec::with_capacity(max_size);

        for link in &chain[1..] {
            let delta_buf = self.read_delta_data(link.data_offset)?;
            apply::apply_in_mem(&base, &delta_buf, &mut accum)?;
            std::mem::swap(&mut base, &mut accum);
        }
        Ok(base)
    }

    fn dump_chain_to_file(&self, chain: &[Delta], outfile: &mut File) -> Result<u64, PackError> {
        let base_link = chain.first().ok_or(PackError::BadDeltaChain)?;
        let max_size = self.max_delta_size(chain)?;

        // Small chains run fully in memory for speed.
        if max_size < DELTA_RESULT_SIZE_CACHED_MAX {
            let data = self.dump_chain_to_mem(chain)?;
            outfile.write_all(&data)?;
            outfile.flush()?;
            outfile.seek(SeekFrom::Start(0))?;
            return Ok(data.len() as u64);
        }

        let mut base_file = grot_utils::tempfile::scratch_file()
            .map_err(|e| PackError::BadPackFile(e.to_string()))?;
        let mut accum_file = grot_utils::tempfile::scratch_file()
            .map_err(|e| PackError::BadPackFile(e.to_string()))?;

        let base_data_offset = base_link.offset + base_link.header_len as u64;
        if base_link.type_code.is_delta() {
            return Err(PackError::BadDeltaChain);
        }
        self.inflate_at_to(base_data_offset, &mut base_file)?;
        base_file.seek(SeekFrom::Start(0))?;

        let ndeltas = chain.len() - 1;
        let mut result_size = 0u64;
        for (i, link) in chain[1..].iter().enumerate() {
            let delta_buf = self.read_delta_data(link.data_offset)?;
            let last = i + 1 == ndeltas;
            if last {
                result_size = apply::apply_to_file(&mut base_file, &delta_buf, outfile)?;
            } else {
                accum_file.set_len(0)?;
                accum_file.seek(SeekFrom::Start(0))?;
                apply::apply_to_file(&mut base_file, &delta_buf, &mut accum_file)?;
                std::mem::swap(&mut base_file, &mut accum_file);
                base_file.seek(SeekFrom::Start(0))?;
            }
        }
        outfile.flush()?;
        outfile.seek(SeekFrom::Start(0))?;
        Ok(result_size)
    }
}

/// Sequential reader over the pack's read-at capability, for zlib
/// inflation from an arbitrary offset.
struct PackReader<'a> {
    pack: &'a Pack,
    pos: u64,
}

impl Read for PackReader<'_> {
    fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
        let remaining = self.pack.filesize.saturating_sub(self.pos);
        if remaining == 0 {
            return Ok(0);
        }
        let n = (buf.len() as u64).min(remaining) as usize;
        self.pack
            .read_at(self.pos, &mut buf[..n])
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::UnexpectedEof, e.to_string()))?;
        self.pos += n as u64;
        Ok(n)
    }
}
