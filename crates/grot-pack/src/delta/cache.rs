//! Bounded LRU cache of inflated delta payloads.
//!
//! Keyed by the delta's data offset within its pack; each pack owns its
//! own cache. Inserts evict least-recently-used entries until the new
//! buffer fits; a buffer that cannot fit at all is reported as
//! `NoSpace`, which callers absorb by simply not caching it.

use std::num::NonZeroUsize;
use std::sync::Arc;

use lru::LruCache;

use crate::PackError;

/// Default ceiling on total cached bytes per pack.
pub const DELTA_CACHE_MAX_BYTES: usize = 32 * 1024 * 1024;
/// Buffers larger than this are never cached.
pub const DELTA_CACHE_MAX_ENTRY: usize = 4 * 1024 * 1024;

pub struct DeltaCache {
    inner: LruCache<u64, Arc<Vec<u8>>>,
    used_bytes: usize,
    max_bytes: usize,
    max_entry: usize,
}

impl DeltaCache {
    pub fn new() -> Self {
        Self::with_limits(DELTA_CACHE_MAX_BYTES, DELTA_CACHE_MAX_ENTRY)
    }

    pub fn with_limits(max_bytes: usize, max_entry: usize) -> Self {
        Self {
            // Entry-count bound is a backstop; the byte budget governs.
            inner: LruCache::new(NonZeroUsize::new(4096).unwrap()),
            used_bytes: 0,
            max_bytes,
            max_entry,
        }
    }

    /// Fetch a cached buffer, refreshing its recency.
    pub fn get(&mut self, data_offset: u64) -> Option<Arc<Vec<u8>>> {
        self.inner.get(&data_offset).cloned()
    }

    /// Insert a buffer, evicting old entries to make room.
    pub fn add(&mut self, data_offset: u64, buf: Arc<Vec<u8>>) -> Result<(), PackError> {
        let len = buf.len();
        if len > self.max_entry || len > self.max_bytes {
            return Err(PackError::NoSpace);
        }
        while self.used_bytes + len > self.max_bytes {
            match self.inner.pop_lru() {
                Some((_, old)) => self.used_bytes -= old.len(),
                None => return Err(PackError::NoSpace),
            }
        }
        if let Some(old) = self.inner.put(data_offset, buf) {
            self.used_bytes -= old.len();
        }
        self.used_bytes += len;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

impl Default for DeltaCache {
    fn default() -> Self {
        Self::new()
    }
}
