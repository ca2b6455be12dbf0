use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use hashbrown::HashMap;
use rex_map::LayerUid;
use rex_model::HeightField;
use rex_tile::TileKey;

pub type CacheKey = (TileKey, LayerUid);

#[derive(Clone, Debug)]
pub struct CachedHeights {
    pub key: TileKey,
    pub layer: LayerUid,
    /// Map revision the samples were generated at.
    pub revision: u64,
    pub heights: HeightField,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct HeightfieldCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub entries: usize,
}

/// LRU of generated heightfields. An entry only answers a lookup at the
/// revision it was built for; anything older is evicted on sight.
pub struct HeightfieldCache {
    entries: RwLock<HashMap<CacheKey, Arc<CachedHeights>>>,
    order: Mutex<VecDeque<CacheKey>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl HeightfieldCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            order: Mutex::new(VecDeque::new()),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    pub fn get(&self, key: TileKey, layer: LayerUid, expected_rev: u64) -> Option<Arc<CachedHeights>> {
        let ck = (key, layer);
        if let Some(entry) = self.lookup(&ck) {
            if entry.revision == expected_rev {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.touch(&ck);
                return Some(entry);
            }
            self.remove_entry(&ck);
        }
        self.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, entry: Arc<CachedHeights>) {
        if self.capacity == 0 {
            return;
        }
        let ck = (entry.key, entry.layer);
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(ck, entry);
        {
            let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
            if let Some(pos) = order.iter().position(|c| *c == ck) {
                order.remove(pos);
            }
            order.push_back(ck);
        }
        self.enforce_capacity();
    }

    pub fn clear(&self) {
        let removed = {
            let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
            let len = entries.len() as u64;
            entries.clear();
            len
        };
        if removed > 0 {
            self.evictions.fetch_add(removed, Ordering::Relaxed);
        }
        self.order
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn stats(&self) -> HeightfieldCacheStats {
        HeightfieldCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            entries: self
                .entries
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .len(),
        }
    }

    fn lookup(&self, ck: &CacheKey) -> Option<Arc<CachedHeights>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(ck)
            .cloned()
    }

    fn remove_entry(&self, ck: &CacheKey) {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(ck);
        if removed.is_some() {
            self.evictions.fetch_add(1, Ordering::Relaxed);
        }
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = order.iter().position(|c| c == ck) {
            order.remove(pos);
        }
    }

    fn touch(&self, ck: &CacheKey) {
        let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(pos) = order.iter().position(|c| c == ck) {
            if let Some(entry) = order.remove(pos) {
                order.push_back(entry);
            }
        }
    }

    fn enforce_capacity(&self) {
        let victims: Vec<CacheKey> = {
            let mut order = self.order.lock().unwrap_or_else(PoisonError::into_inner);
            let excess = order.len().saturating_sub(self.capacity);
            order.drain(..excess).collect()
        };
        if victims.is_empty() {
            return;
        }
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        for ck in victims {
            if entries.remove(&ck).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }
    }
}
