use digest::Digest;
use sha1::Sha1;

use crate::ObjectId;

/// Streaming SHA-1 computation.
///
/// Used for object ids, pack and pack-index trailers, and the rolling
/// file-index checksum. Data can be fed incrementally with
/// [`update`](Hasher::update) or through the [`std::io::Write`]
/// implementation, then finalised into an [`ObjectId`].
pub struct Hasher {
    inner: Sha1,
}

impl Hasher {
    pub fn new() -> Self {
        Self { inner: Sha1::new() }
    }

    /// Feed data into the hasher.
    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Finalize and return the digest as an ObjectId.
    pub fn finalize(self) -> ObjectId {
        let digest = self.inner.finalize();
        ObjectId::from_bytes(&digest).expect("SHA-1 digest is 20 bytes")
    }

    /// Convenience: hash data in one call.
    pub fn digest(data: &[u8]) -> ObjectId {
        let mut h = Self::new();
        h.update(data);
        h.finalize()
    }

    /// Hash a git object: `"{type} {len}\0{content}"`.
    pub fn hash_object(obj_type: &str, data: &[u8]) -> ObjectId {
        let mut h = Self::new();
        h.update(format!("{} {}\0", obj_type, data.len()).as_bytes());
        h.update(data);
        h.finalize()
    }
}

impl Default for Hasher {
    fn default() -> Self {
        Self::new()
    }
}

impl std::io::Write for Hasher {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.update(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
