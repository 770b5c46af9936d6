//! Test utilities for integration tests.
//!
//! This module provides fake upstream fetchers and stores that record how they
//! were used, so tests can assert on call counts, concurrency and batching.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

use osm_tile_cache::error::{StoreError, UpstreamError};
use osm_tile_cache::store::{CacheStore, MemoryStore};
use osm_tile_cache::tile::{TileIndex, TileKey};
use osm_tile_cache::upstream::UpstreamFetcher;

// =============================================================================
// Fake Upstream Fetcher
// =============================================================================

/// A fake upstream that tracks calls and how many fetches overlap.
///
/// Tiles listed with [`FakeFetcher::failing_on`] return a 503; every other tile
/// returns `body` (or `"{z}/{x}/{y}"` when no body is set).
#[derive(Clone, Default)]
pub struct FakeFetcher {
    body: Option<Bytes>,
    delay: Duration,
    failing: Arc<HashSet<TileIndex>>,
    fail_all: bool,
    calls: Arc<AtomicUsize>,
    active: Arc<AtomicUsize>,
    peak: Arc<AtomicUsize>,
    seen: Arc<Mutex<Vec<TileIndex>>>,
}

impl FakeFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the same bytes for every tile.
    pub fn with_body(mut self, body: &'static [u8]) -> Self {
        self.body = Some(Bytes::from_static(body));
        self
    }

    /// Hold each fetch open for `delay`.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn failing_on(mut self, tiles: impl IntoIterator<Item = TileIndex>) -> Self {
        self.failing = Arc::new(tiles.into_iter().collect());
        self
    }

    pub fn failing_always(mut self) -> Self {
        self.fail_all = true;
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Most fetches observed running at the same time.
    pub fn peak_concurrency(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub async fn fetched_tiles(&self) -> Vec<TileIndex> {
        self.seen.lock().await.clone()
    }

    /// Bytes this fetcher returns for `tile`.
    pub fn body_for(&self, tile: TileIndex) -> Bytes {
        self.body
            .clone()
            .unwrap_or_else(|| Bytes::from(tile.to_string()))
    }
}

#[async_trait]
impl UpstreamFetcher for FakeFetcher {
    async fn fetch(&self, tile: TileIndex) -> Result<Bytes, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.seen.lock().await.push(tile);

        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        } else {
            tokio::task::yield_now().await;
        }

        self.active.fetch_sub(1, Ordering::SeqCst);

        if self.fail_all || self.failing.contains(&tile) {
            return Err(UpstreamError::Status {
                url: format!("https://tile.test/{}.png", tile),
                status: 503,
            });
        }

        Ok(self.body_for(tile))
    }
}

// =============================================================================
// Recording Store
// =============================================================================

/// A memory-backed store that records every call and can be told to fail.
#[derive(Default)]
pub struct RecordingStore {
    inner: MemoryStore,
    gets: AtomicUsize,
    sets: AtomicUsize,
    batches: Mutex<Vec<usize>>,
    fail_reads: bool,
    fail_writes: bool,
    fail_batch: Option<usize>,
}

impl RecordingStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `get` fails as if the store were unreachable.
    pub fn failing_reads(mut self) -> Self {
        self.fail_reads = true;
        self
    }

    /// Every single `set` fails.
    pub fn failing_writes(mut self) -> Self {
        self.fail_writes = true;
        self
    }

    /// The `index`-th pipelined write (0-based) fails.
    pub fn failing_batch(mut self, index: usize) -> Self {
        self.fail_batch = Some(index);
        self
    }

    pub fn get_count(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }

    pub fn set_count(&self) -> usize {
        self.sets.load(Ordering::SeqCst)
    }

    /// Sizes of the pipelined writes, in call order.
    pub async fn batch_sizes(&self) -> Vec<usize> {
        self.batches.lock().await.clone()
    }

    pub async fn contains(&self, key: &TileKey) -> bool {
        self.inner.contains(key).await
    }

    pub async fn len(&self) -> usize {
        self.inner.len().await
    }

    /// Seed the store without recording the write.
    pub async fn seed(&self, tile: TileIndex, data: &'static [u8]) {
        self.inner
            .set(&tile.key(), Bytes::from_static(data))
            .await
            .unwrap();
    }
}

#[async_trait]
impl CacheStore for RecordingStore {
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        if self.fail_reads {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.get(key).await
    }

    async fn set(&self, key: &TileKey, value: Bytes) -> Result<(), StoreError> {
        self.sets.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes {
            return Err(StoreError::Unavailable("connection refused".to_string()));
        }
        self.inner.set(key, value).await
    }

    async fn set_many(&self, entries: Vec<(TileKey, Bytes)>) -> Result<(), StoreError> {
        let index = {
            let mut batches = self.batches.lock().await;
            batches.push(entries.len());
            batches.len() - 1
        };
        if self.fail_batch == Some(index) {
            return Err(StoreError::Unavailable("pipeline aborted".to_string()));
        }
        self.inner.set_many(entries).await
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// Tiles covering the box (55, 36)-(56, 38) at zoom 10, x-major then y.
pub fn zoom10_fixture() -> Vec<TileIndex> {
    let mut tiles = Vec::new();
    for x in 614..=620 {
        for y in 318..=323 {
            tiles.push(TileIndex::new(10, x, y).unwrap());
        }
    }
    tiles
}
