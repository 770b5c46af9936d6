//! Bounded-concurrency fetch scheduling for a set of tiles.
//!
//! Every tile gets its own task up front. Tasks park on the [`AdmissionGate`]
//! until admitted, so at most `concurrency` of them are checking the store or
//! talking to upstream at any moment:
//!
//! ```text
//! tiles ──► JoinSet (one task each) ──► gate ──► store.get ──hit──► Cached
//!                                                   │
//!                                                  miss
//!                                                   ▼
//!                                      fetch_with_timeout ──err──► Failed
//!                                                   │
//!                                                   ▼
//!                                       mpsc ──► BatchWriter ──► set_many
//! ```
//!
//! The admission permit is held until the fetched bytes are accepted by the
//! channel, so a slow store throttles fetching instead of buffering tiles.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use super::gate::AdmissionGate;
use super::writer::{
    BatchWriter, FetchedTile, WriterStats, DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY,
};
use crate::store::CacheStore;
use crate::tile::TileIndex;
use crate::upstream::{fetch_with_timeout, UpstreamFetcher, DEFAULT_FETCH_TIMEOUT};

/// Default number of tiles admitted at once.
pub const DEFAULT_CONCURRENCY: usize = 2;

// =============================================================================
// Options and results
// =============================================================================

/// Tuning for a prefetch run.
#[derive(Debug, Clone)]
pub struct SchedulerOptions {
    /// Maximum tiles between admission and hand-off at any instant
    pub concurrency: usize,

    /// Tiles per pipelined store write
    pub batch_size: usize,

    /// Capacity of the fetch-to-write channel
    pub channel_capacity: usize,

    /// Per-fetch upstream timeout
    pub fetch_timeout: Duration,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            batch_size: DEFAULT_BATCH_SIZE,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
            fetch_timeout: DEFAULT_FETCH_TIMEOUT,
        }
    }
}

impl SchedulerOptions {
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency;
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = timeout;
        self
    }
}

/// What happened to a single tile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileOutcome {
    /// Already in the store; upstream was not contacted
    Cached,

    /// Fetched and handed to the writer
    Fetched,

    /// Store read, fetch or hand-off failed
    Failed,

    /// Cancelled before admission
    Cancelled,
}

/// Totals for one [`FetchScheduler::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Tiles scheduled
    pub tiles: usize,

    pub cached: usize,
    pub fetched: usize,
    pub failed: usize,
    pub cancelled: usize,

    /// Highest number of tiles admitted at once
    pub peak_in_flight: usize,

    /// Persistence results for the fetched tiles
    pub writer: WriterStats,
}

impl RunSummary {
    fn record(&mut self, outcome: TileOutcome) {
        match outcome {
            TileOutcome::Cached => self.cached += 1,
            TileOutcome::Fetched => self.fetched += 1,
            TileOutcome::Failed => self.failed += 1,
            TileOutcome::Cancelled => self.cancelled += 1,
        }
    }

    /// Add another run's totals to this one.
    pub fn merge(&mut self, other: &RunSummary) {
        self.tiles += other.tiles;
        self.cached += other.cached;
        self.fetched += other.fetched;
        self.failed += other.failed;
        self.cancelled += other.cancelled;
        self.peak_in_flight = self.peak_in_flight.max(other.peak_in_flight);
        self.writer.merge(&other.writer);
    }
}

// =============================================================================
// Scheduler
// =============================================================================

/// Fetches tiles missing from the store under a concurrency limit.
pub struct FetchScheduler<S, F>
where
    S: CacheStore,
    F: UpstreamFetcher,
{
    store: Arc<S>,
    fetcher: Arc<F>,
    options: SchedulerOptions,
}

impl<S, F> FetchScheduler<S, F>
where
    S: CacheStore + 'static,
    F: UpstreamFetcher + 'static,
{
    pub fn new(store: Arc<S>, fetcher: Arc<F>, options: SchedulerOptions) -> Self {
        Self {
            store,
            fetcher,
            options,
        }
    }

    pub fn options(&self) -> &SchedulerOptions {
        &self.options
    }

    /// Process every tile and wait for all tasks and the final batch flush.
    ///
    /// Individual failures are counted, never propagated. Once `cancel` fires,
    /// tasks that have not been admitted end as [`TileOutcome::Cancelled`];
    /// admitted tasks run to completion and their tiles are still written.
    pub async fn run<I>(&self, tiles: I, cancel: &CancellationToken) -> RunSummary
    where
        I: IntoIterator<Item = TileIndex>,
    {
        let gate = Arc::new(AdmissionGate::new(self.options.concurrency));
        let (tx, writer) = BatchWriter::spawn(
            Arc::clone(&self.store),
            self.options.batch_size,
            self.options.channel_capacity,
        );

        let mut summary = RunSummary::default();
        let mut tasks = JoinSet::new();

        for tile in tiles {
            summary.tiles += 1;
            tasks.spawn(process_tile(
                tile,
                Arc::clone(&self.store),
                Arc::clone(&self.fetcher),
                Arc::clone(&gate),
                tx.clone(),
                cancel.clone(),
                self.options.fetch_timeout,
            ));
        }

        // The writer stops once the last task drops its sender
        drop(tx);

        while let Some(result) = tasks.join_next().await {
            match result {
                Ok(outcome) => summary.record(outcome),
                Err(e) => {
                    error!(error = %e, "Fetch task panicked");
                    summary.failed += 1;
                }
            }
        }

        summary.writer = match writer.await {
            Ok(stats) => stats,
            Err(e) => {
                error!(error = %e, "Batch writer task panicked");
                WriterStats::default()
            }
        };
        summary.peak_in_flight = gate.peak_in_flight();

        debug!(
            tiles = summary.tiles,
            cached = summary.cached,
            fetched = summary.fetched,
            failed = summary.failed,
            cancelled = summary.cancelled,
            "Fetch run complete"
        );

        summary
    }
}

async fn process_tile<S, F>(
    tile: TileIndex,
    store: Arc<S>,
    fetcher: Arc<F>,
    gate: Arc<AdmissionGate>,
    tx: mpsc::Sender<FetchedTile>,
    cancel: CancellationToken,
    timeout: Duration,
) -> TileOutcome
where
    S: CacheStore,
    F: UpstreamFetcher,
{
    let _permit = tokio::select! {
        biased;
        _ = cancel.cancelled() => return TileOutcome::Cancelled,
        permit = gate.acquire() => match permit {
            Some(permit) => permit,
            None => return TileOutcome::Cancelled,
        },
    };

    let key = tile.key();

    match store.get(&key).await {
        Ok(Some(_)) => return TileOutcome::Cached,
        Ok(None) => {}
        Err(e) => {
            warn!(tile = %tile, error = %e, "Store check failed, skipping tile");
            return TileOutcome::Failed;
        }
    }

    let data = match fetch_with_timeout(fetcher.as_ref(), tile, timeout).await {
        Ok(data) => data,
        Err(e) => {
            warn!(tile = %tile, error = %e, "Tile fetch failed");
            return TileOutcome::Failed;
        }
    };

    if tx.send((key, data)).await.is_err() {
        warn!(tile = %tile, "Batch writer stopped before tile was handed off");
        return TileOutcome::Failed;
    }

    TileOutcome::Fetched
}
