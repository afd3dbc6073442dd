//! Bounded cache for backward-derived CEKs.
//!
//! Reading an old post derives its epoch's CEK by hashing down from the
//! newest known CEK, which is linear in the epoch distance. The cache
//! keeps recently used CEKs so scrolling through history does not rehash
//! the same prefix over and over. Explicitly bounded: when full, the
//! oldest cached epoch is dropped first, since readers tend to page
//! backward from recent posts.

use std::collections::BTreeMap;

use sealfeed_core::{Cek, Epoch};

/// Default number of derived CEKs kept.
pub const DEFAULT_CACHE_CAPACITY: usize = 64;

/// Epoch-keyed CEK cache with a fixed capacity.
#[derive(Debug, Clone)]
pub struct CekCache {
    entries: BTreeMap<Epoch, Cek>,
    capacity: usize,
}

impl CekCache {
    /// Create a cache holding at most `capacity` entries.
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Look up a cached CEK.
    pub fn get(&self, epoch: Epoch) -> Option<&Cek> {
        self.entries.get(&epoch)
    }

    /// Insert a derived CEK, evicting the oldest epoch when full.
    pub fn insert(&mut self, epoch: Epoch, cek: Cek) {
        if self.entries.len() >= self.capacity && !self.entries.contains_key(&epoch) {
            if let Some(oldest) = self.entries.keys().next().copied() {
                self.entries.remove(&oldest);
            }
        }
        self.entries.insert(epoch, cek);
    }

    /// Drop every entry. Called when the store's epoch advances so stale
    /// derivations never shadow the new chain position.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for CekCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cek(n: u8) -> Cek {
        Cek::from_bytes([n; 32])
    }

    #[test]
    fn test_insert_and_get() {
        let mut cache = CekCache::new(4);
        cache.insert(Epoch::new(3), cek(3));
        assert_eq!(cache.get(Epoch::new(3)), Some(&cek(3)));
        assert_eq!(cache.get(Epoch::new(4)), None);
    }

    #[test]
    fn test_evicts_oldest_first() {
        let mut cache = CekCache::new(2);
        cache.insert(Epoch::new(1), cek(1));
        cache.insert(Epoch::new(2), cek(2));
        cache.insert(Epoch::new(3), cek(3));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(Epoch::new(1)), None);
        assert_eq!(cache.get(Epoch::new(2)), Some(&cek(2)));
        assert_eq!(cache.get(Epoch::new(3)), Some(&cek(3)));
    }

    #[test]
    fn test_reinsert_does_not_evict() {
        let mut cache = CekCache::new(2);
        cache.insert(Epoch::new(1), cek(1));
        cache.insert(Epoch::new(2), cek(2));
        cache.insert(Epoch::new(2), cek(9));

        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get(Epoch::new(1)), Some(&cek(1)));
        assert_eq!(cache.get(Epoch::new(2)), Some(&cek(9)));
    }

    #[test]
    fn test_clear() {
        let mut cache = CekCache::new(4);
        cache.insert(Epoch::new(1), cek(1));
        cache.clear();
        assert!(cache.is_empty());
    }
}
