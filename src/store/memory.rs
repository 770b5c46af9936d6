//! In-memory tile store.
//!
//! An LRU keyed by [`TileKey`] that tracks the total size of cached tiles in
//! bytes and evicts least-recently-used entries when the capacity is exceeded.
//! Eviction is this store's own policy; the core treats evicted tiles as
//! ordinary misses.

use async_trait::async_trait;
use bytes::Bytes;
use lru::LruCache;
use tokio::sync::Mutex;

use crate::error::StoreError;
use crate::tile::TileKey;

use super::CacheStore;

/// Default capacity: 256MB
pub const DEFAULT_MEMORY_CAPACITY: usize = 256 * 1024 * 1024;

struct Inner {
    entries: LruCache<TileKey, Bytes>,
    current_size: usize,
}

impl Inner {
    fn insert(&mut self, key: TileKey, data: Bytes, max_size: usize) {
        let data_size = data.len();

        if let Some(old) = self.entries.put(key, data) {
            self.current_size = self.current_size.saturating_sub(old.len());
        }
        self.current_size += data_size;

        while self.current_size > max_size {
            match self.entries.pop_lru() {
                Some((_, evicted)) => {
                    self.current_size = self.current_size.saturating_sub(evicted.len());
                }
                None => break,
            }
        }
    }
}

/// Process-local [`CacheStore`] with size-based LRU eviction.
///
/// # Example
///
/// ```
/// use osm_tile_cache::store::{CacheStore, MemoryStore};
/// use osm_tile_cache::tile::TileIndex;
/// use bytes::Bytes;
///
/// #[tokio::main]
/// async fn main() {
///     let store = MemoryStore::new();
///     let key = TileIndex::new(5, 10, 12).unwrap().key();
///
///     store.set(&key, Bytes::from_static(b"png")).await.unwrap();
///     assert_eq!(store.get(&key).await.unwrap(), Some(Bytes::from_static(b"png")));
/// }
/// ```
pub struct MemoryStore {
    inner: Mutex<Inner>,
    max_size: usize,
}

impl MemoryStore {
    /// Create a store with the default capacity (256MB).
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MEMORY_CAPACITY)
    }

    /// Create a store holding at most `max_size` bytes of tile data.
    pub fn with_capacity(max_size: usize) -> Self {
        Self {
            inner: Mutex::new(Inner {
                entries: LruCache::unbounded(),
                current_size: 0,
            }),
            max_size,
        }
    }

    /// Number of cached tiles.
    pub async fn len(&self) -> usize {
        self.inner.lock().await.entries.len()
    }

    /// Whether the store is empty.
    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.entries.is_empty()
    }

    /// Whether `key` is cached, without touching LRU order.
    pub async fn contains(&self, key: &TileKey) -> bool {
        self.inner.lock().await.entries.contains(key)
    }

    /// Total bytes currently cached.
    pub async fn size(&self) -> usize {
        self.inner.lock().await.current_size
    }

    /// Maximum capacity in bytes.
    pub fn capacity(&self) -> usize {
        self.max_size
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        let mut inner = self.inner.lock().await;
        Ok(inner.entries.get(key).cloned())
    }

    async fn set(&self, key: &TileKey, value: Bytes) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.insert(key.clone(), value, self.max_size);
        Ok(())
    }

    async fn set_many(&self, entries: Vec<(TileKey, Bytes)>) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        for (key, value) in entries {
            inner.insert(key, value, self.max_size);
        }
        Ok(())
    }
}
