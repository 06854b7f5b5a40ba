//! # Decode Cache
//!
//! Fully decoded test records keyed by their location in the decompressed
//! stream. Owned by one file handle and cleared whenever its stream is
//! replaced or closed.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::format::StdfRecord;

#[derive(Debug, Clone, Copy, Hash, PartialEq, Eq)]
pub struct CacheKey {
    pub offset: u64,
    pub length: u16,
}

pub struct DecodeCache {
    entries: DashMap<CacheKey, Arc<StdfRecord>>,
    max_entries: usize,
    rejected: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    /// Inserts refused because the cache was full
    pub rejected: u64,
}

impl DecodeCache {
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries,
            rejected: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: &CacheKey) -> Option<Arc<StdfRecord>> {
        self.entries.get(key).map(|entry| entry.value().clone())
    }

    /// Insert unless present and return the cached value.
    ///
    /// A full cache keeps its current entries and hands `record` back uncached.
    pub fn insert(&self, key: CacheKey, record: StdfRecord) -> Arc<StdfRecord> {
        if let Some(existing) = self.get(&key) {
            return existing;
        }
        let record = Arc::new(record);
        if self.entries.len() >= self.max_entries {
            self.rejected.fetch_add(1, Ordering::Relaxed);
            return record;
        }
        self.entries.entry(key).or_insert(record).value().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            capacity: self.max_entries,
            rejected: self.rejected.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::records::Pir;

    fn pir(site: u8) -> StdfRecord {
        StdfRecord::Pir(Pir { head_num: 1, site_num: site })
    }

    #[test]
    fn test_insert_if_absent() {
        let cache = DecodeCache::new(8);
        let key = CacheKey { offset: 10, length: 2 };
        let first = cache.insert(key, pir(1));
        let second = cache.insert(key, pir(2));
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(*cache.get(&key).unwrap(), pir(1));
    }

    #[test]
    fn test_full_cache_rejects() {
        let cache = DecodeCache::new(1);
        cache.insert(CacheKey { offset: 0, length: 2 }, pir(0));
        let uncached = cache.insert(CacheKey { offset: 2, length: 2 }, pir(1));
        assert_eq!(*uncached, pir(1));
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.stats().rejected, 1);

        cache.clear();
        assert!(cache.is_empty());
    }
}
