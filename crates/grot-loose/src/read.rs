use std::fs;
use std::io::Read;

use flate2::read::ZlibDecoder;
use grot_hash::ObjectId;
use grot_object::{header, Object, ObjectHandle, ObjectType};

use crate::{LooseError, LooseStore};

impl LooseStore {
    /// Does a loose object with this id exist?
    pub fn contains(&self, id: &ObjectId) -> bool {
        self.object_path(id).is_file()
    }

    /// Read and parse a loose object.
    ///
    /// Returns `Ok(None)` when the object does not exist; corrupt
    /// objects are errors.
    pub fn read(&self, id: &ObjectId) -> Result<Option<Object>, LooseError> {
        match self.read_raw(id)? {
            Some(raw) => Ok(Some(Object::parse_loose(&raw)?)),
            None => Ok(None),
        }
    }

    /// Read the inflated bytes of a loose object (header + content).
    pub fn read_raw(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, LooseError> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };
        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut raw = Vec::new();
        decoder
            .read_to_end(&mut raw)
            .map_err(|_| LooseError::Decompress { id: id.to_hex() })?;
        Ok(Some(raw))
    }

    /// Read only the header, inflating just enough bytes to cover it.
    pub fn read_header(&self, id: &ObjectId) -> Result<Option<ObjectHandle>, LooseError> {
        let path = self.object_path(id);
        let compressed = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let mut decoder = ZlibDecoder::new(compressed.as_slice());
        let mut buf = [0u8; 64];
        let mut filled = 0usize;
        loop {
            if filled >= buf.len() {
                return Err(LooseError::Corrupt {
                    id: id.to_hex(),
                    reason: "header exceeds 64 bytes".into(),
                });
            }
            let n = decoder
                .read(&mut buf[filled..])
                .map_err(|_| LooseError::Decompress { id: id.to_hex() })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    id: id.to_hex(),
                    reason: "EOF before header terminator".into(),
                });
            }
            filled += n;
            if buf[..filled].contains(&0) {
                break;
            }
        }

        let (obj_type, size, header_len) = header::parse_header(&buf[..filled])?;
        Ok(Some(ObjectHandle {
            obj_type,
            size: size as u64,
            header_len,
            packed: None,
        }))
    }

    /// Read a blob's content bytes, skipping the header.
    pub fn read_blob(&self, id: &ObjectId) -> Result<Option<Vec<u8>>, LooseError> {
        match self.read(id)? {
            Some(Object::Blob(b)) => Ok(Some(b.data)),
            Some(other) => Err(LooseError::Corrupt {
                id: id.to_hex(),
                reason: format!("expected blob, found {}", other.object_type()),
            }),
            None => Ok(None),
        }
    }
}

/// Test helper and fixture builder: write a loose object for `content`.
pub fn write_loose(
    store: &LooseStore,
    obj_type: ObjectType,
    content: &[u8],
) -> Result<ObjectId, LooseError> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let id = grot_hash::Hasher::hash_object(obj_type.name(), content);
    let path = store.object_path(&id);
    fs::create_dir_all(path.parent().expect("loose path has a parent"))?;

    let mut raw = format!("{} {}\0", obj_type.name(), content.len()).into_bytes();
    raw.extend_from_slice(content);
    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(&raw)?;
    fs::write(&path, encoder.finish()?)?;
    Ok(id)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_blob() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let id = write_loose(&store, ObjectType::Blob, b"hello\n").unwrap();
        assert_eq!(id.to_hex(), "ce013625030ba8dba906f756967f9e9ca394464a");
        assert!(store.contains(&id));

        let obj = store.read(&id).unwrap().unwrap();
        match obj {
            Object::Blob(b) => assert_eq!(b.data, b"hello\n"),
            other => panic!("unexpected object: {other:?}"),
        }

        let handle = store.read_header(&id).unwrap().unwrap();
        assert_eq!(handle.obj_type, ObjectType::Blob);
        assert_eq!(handle.size, 6);
        assert_eq!(handle.header_len, 7);
        assert!(handle.packed.is_none());
    }

    #[test]
    fn missing_object_is_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let id = ObjectId::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        assert!(store.read(&id).unwrap().is_none());
        assert!(store.read_header(&id).unwrap().is_none());
    }

    #[test]
    fn garbage_is_decompress_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = LooseStore::open(dir.path());
        let id = ObjectId::from_hex("ce013625030ba8dba906f756967f9e9ca394464a").unwrap();
        let path = store.object_path(&id);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(&path, b"not zlib").unwrap();
        assert!(store.read(&id).is_err());
    }
}
