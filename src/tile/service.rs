//! Read-through tile service.
//!
//! The service answers a tile request from the cache store when it can and
//! falls back to the upstream provider otherwise, storing what it fetched so
//! the next request is a hit.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         TileService                              │
//! │  ┌─────────────────────────────────────────────────────────┐    │
//! │  │                    get_tile()                           │    │
//! │  │  1. Derive key        3. Fetch from upstream on miss    │    │
//! │  │  2. Check store       4. Store & return                 │    │
//! │  └─────────────────────────────────────────────────────────┘    │
//! │           │                    │                    │            │
//! │           ▼                    ▼                    ▼            │
//! │    ┌────────────┐     ┌────────────────┐   ┌────────────────┐   │
//! │    │ CacheStore │     │ UpstreamFetcher│   │ in-flight map  │   │
//! │    └────────────┘     └────────────────┘   │  (optional)    │   │
//! │                                            └────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Store failures never fail a request: a failed read is a miss and a failed
//! write still returns the fetched bytes.
//!
//! With single-flight enabled, concurrent misses for the same tile share one
//! upstream fetch. The first request becomes the leader; later ones wait for
//! its result. If the leader is dropped mid-fetch, a waiter takes over.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use serde::Serialize;
use tokio::sync::Notify;
use tracing::{debug, warn};

use crate::error::{TileError, UpstreamError};
use crate::store::CacheStore;
use crate::upstream::{fetch_with_timeout, UpstreamFetcher, DEFAULT_FETCH_TIMEOUT};

use super::key::{TileIndex, TileKey};

// =============================================================================
// Tile Response
// =============================================================================

/// Response from the tile service.
#[derive(Debug, Clone)]
pub struct TileResponse {
    /// The tile image bytes, exactly as stored or fetched
    pub data: Bytes,

    /// Whether this tile was served from the store
    pub cache_hit: bool,
}

// =============================================================================
// Statistics
// =============================================================================

/// Running counters for a [`TileService`].
#[derive(Debug, Default)]
pub struct ServiceStats {
    requests: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    upstream_fetches: AtomicU64,
    upstream_errors: AtomicU64,
    store_errors: AtomicU64,
    coalesced: AtomicU64,
}

/// Point-in-time copy of [`ServiceStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub upstream_fetches: u64,
    pub upstream_errors: u64,
    pub store_errors: u64,

    /// Misses answered by another request's in-flight fetch
    pub coalesced: u64,
}

impl ServiceStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            requests: self.requests.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            upstream_fetches: self.upstream_fetches.load(Ordering::Relaxed),
            upstream_errors: self.upstream_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
        }
    }

    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

// =============================================================================
// Single-flight registry
// =============================================================================

#[derive(Clone)]
enum FlightState {
    Pending,
    Done(Result<Bytes, UpstreamError>),
    Abandoned,
}

struct InFlight {
    notify: Notify,
    state: Mutex<FlightState>,
}

impl InFlight {
    fn new() -> Self {
        Self {
            notify: Notify::new(),
            state: Mutex::new(FlightState::Pending),
        }
    }

    fn state(&self) -> FlightState {
        lock(&self.state).clone()
    }
}

type FlightMap = Mutex<HashMap<TileKey, Arc<InFlight>>>;

/// Held by the leader; finishing or dropping it releases the waiters.
struct LeaderGuard<'a> {
    flights: &'a FlightMap,
    key: &'a TileKey,
    flight: Arc<InFlight>,
}

impl LeaderGuard<'_> {
    fn complete(self, result: Result<Bytes, UpstreamError>) {
        *lock(&self.flight.state) = FlightState::Done(result);
    }
}

impl Drop for LeaderGuard<'_> {
    fn drop(&mut self) {
        {
            let mut state = lock(&self.flight.state);
            if matches!(*state, FlightState::Pending) {
                *state = FlightState::Abandoned;
            }
        }
        {
            let mut flights = lock(self.flights);
            if flights
                .get(self.key)
                .is_some_and(|current| Arc::ptr_eq(current, &self.flight))
            {
                flights.remove(self.key);
            }
        }
        self.flight.notify.notify_waiters();
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

// =============================================================================
// Tile Service
// =============================================================================

/// Read-through cache in front of an upstream tile provider.
///
/// # Type Parameters
///
/// * `S` - The cache store
/// * `F` - The upstream fetcher
///
/// # Example
///
/// ```ignore
/// let service = TileService::new(Arc::new(MemoryStore::new()), Arc::new(fetcher));
///
/// let tile = TileIndex::new(5, 10, 12)?;
/// let response = service.get_tile(tile).await?;
/// println!("{} bytes, cache hit: {}", response.data.len(), response.cache_hit);
/// ```
pub struct TileService<S: CacheStore, F: UpstreamFetcher> {
    store: Arc<S>,
    fetcher: Arc<F>,
    fetch_timeout: Duration,
    flights: Option<FlightMap>,
    stats: ServiceStats,
}

impl<S: CacheStore, F: UpstreamFetcher> TileService<S, F> {
    /// Create a service with the default fetch timeout and no request
    /// coalescing.
    pub fn new(store: Arc<S>, fetcher: Arc<F>) -> Self {
        Self {
            store,
            fetcher,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
            flights: None,
            stats: ServiceStats::default(),
        }
    }

    /// Set the per-fetch upstream timeout.
    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }

    /// Enable or disable coalescing of concurrent misses for the same tile.
    pub fn with_single_flight(mut self, enabled: bool) -> Self {
        self.flights = enabled.then(|| Mutex::new(HashMap::new()));
        self
    }

    pub fn single_flight(&self) -> bool {
        self.flights.is_some()
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Get a tile, from the store when present, otherwise from upstream.
    ///
    /// # Errors
    ///
    /// Returns [`TileError::Upstream`] if the tile is not cached and the
    /// upstream fetch fails or times out. Nothing is stored in that case.
    pub async fn get_tile(&self, tile: TileIndex) -> Result<TileResponse, TileError> {
        ServiceStats::bump(&self.stats.requests);
        let key = tile.key();

        if let Some(data) = self.lookup(&key).await {
            ServiceStats::bump(&self.stats.cache_hits);
            return Ok(TileResponse {
                data,
                cache_hit: true,
            });
        }
        ServiceStats::bump(&self.stats.cache_misses);

        let data = match &self.flights {
            Some(flights) => self.fetch_shared(flights, tile, &key).await?,
            None => self.fetch_and_store(tile, &key).await?,
        };

        Ok(TileResponse {
            data,
            cache_hit: false,
        })
    }

    async fn lookup(&self, key: &TileKey) -> Option<Bytes> {
        match self.store.get(key).await {
            Ok(found) => found,
            Err(e) => {
                ServiceStats::bump(&self.stats.store_errors);
                warn!(key = %key, error = %e, "Store read failed, treating as miss");
                None
            }
        }
    }

    async fn fetch_and_store(&self, tile: TileIndex, key: &TileKey) -> Result<Bytes, UpstreamError> {
        let data = match fetch_with_timeout(self.fetcher.as_ref(), tile, self.fetch_timeout).await {
            Ok(data) => data,
            Err(e) => {
                ServiceStats::bump(&self.stats.upstream_errors);
                warn!(tile = %tile, error = %e, "Upstream fetch failed");
                return Err(e);
            }
        };
        ServiceStats::bump(&self.stats.upstream_fetches);

        if let Err(e) = self.store.set(key, data.clone()).await {
            ServiceStats::bump(&self.stats.store_errors);
            warn!(key = %key, error = %e, "Store write failed, serving uncached tile");
        } else {
            debug!(tile = %tile, bytes = data.len(), "Cached upstream tile");
        }

        Ok(data)
    }

    async fn fetch_shared(
        &self,
        flights: &FlightMap,
        tile: TileIndex,
        key: &TileKey,
    ) -> Result<Bytes, UpstreamError> {
        loop {
            let (flight, leader) = {
                let mut map = lock(flights);
                match map.get(key) {
                    Some(flight) => (Arc::clone(flight), false),
                    None => {
                        let flight = Arc::new(InFlight::new());
                        map.insert(key.clone(), Arc::clone(&flight));
                        (flight, true)
                    }
                }
            };

            if leader {
                let guard = LeaderGuard {
                    flights,
                    key,
                    flight,
                };
                let result = self.fetch_and_store(tile, key).await;
                guard.complete(result.clone());
                return result;
            }

            // Waiter: register before checking state so a completion in
            // between is not missed
            loop {
                let notified = flight.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                match flight.state() {
                    FlightState::Done(result) => {
                        ServiceStats::bump(&self.stats.coalesced);
                        return result;
                    }
                    FlightState::Abandoned => break,
                    FlightState::Pending => notified.await,
                }
            }

            debug!(tile = %tile, "In-flight fetch abandoned, retrying");
        }
    }
}
