//! Batched persistence of fetched tiles.
//!
//! A single [`BatchWriter`] drains the hand-off channel, accumulating pairs and
//! writing them with one [`CacheStore::set_many`] call per `batch_size` pairs.
//! When the channel closes, any partial batch is flushed before the writer
//! reports its [`WriterStats`].

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::BatchFlushError;
use crate::store::CacheStore;
use crate::tile::TileKey;

/// Default number of tiles per pipelined write.
pub const DEFAULT_BATCH_SIZE: usize = 100;

/// Default capacity of the fetch-to-write hand-off channel.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 1000;

/// A fetched tile on its way to the store.
pub type FetchedTile = (TileKey, Bytes);

/// Outcome counters for one writer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Pipelined write calls issued (successful or not)
    pub flushes: usize,

    /// Tiles persisted
    pub stored: usize,

    /// Pipelined writes that failed
    pub failed_flushes: usize,

    /// Tiles dropped because their batch failed
    pub discarded: usize,
}

impl WriterStats {
    /// Add another writer's counters to this one.
    pub fn merge(&mut self, other: &WriterStats) {
        self.flushes += other.flushes;
        self.stored += other.stored;
        self.failed_flushes += other.failed_flushes;
        self.discarded += other.discarded;
    }
}

/// Single consumer accumulating fetched tiles into bounded batches.
///
/// The pending batch is owned by this value alone, so no locking is involved.
pub struct BatchWriter<S: CacheStore> {
    store: Arc<S>,
    batch_size: usize,
    pending: Vec<FetchedTile>,
    stats: WriterStats,
}

impl<S: CacheStore + 'static> BatchWriter<S> {
    /// Create a writer flushing every `batch_size` tiles (at least one).
    pub fn new(store: Arc<S>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            store,
            batch_size,
            pending: Vec::with_capacity(batch_size),
            stats: WriterStats::default(),
        }
    }

    /// Spawn a writer task fed by a channel of `capacity` slots.
    ///
    /// The writer finishes once every sender has been dropped; await the
    /// handle to be sure the final partial batch has been flushed.
    pub fn spawn(
        store: Arc<S>,
        batch_size: usize,
        capacity: usize,
    ) -> (mpsc::Sender<FetchedTile>, JoinHandle<WriterStats>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        let writer = Self::new(store, batch_size);
        let handle = tokio::spawn(writer.run(rx));
        (tx, handle)
    }

    /// Drain `rx` until it closes, then flush the remainder.
    pub async fn run(mut self, mut rx: mpsc::Receiver<FetchedTile>) -> WriterStats {
        while let Some(tile) = rx.recv().await {
            self.push(tile).await;
        }
        self.finish().await
    }

    /// Queue one tile, flushing if the batch is full.
    pub async fn push(&mut self, tile: FetchedTile) {
        self.pending.push(tile);
        if self.pending.len() >= self.batch_size {
            let _ = self.flush().await;
        }
    }

    /// Flush any partial batch and return the final counters.
    pub async fn finish(mut self) -> WriterStats {
        if !self.pending.is_empty() {
            let _ = self.flush().await;
        }
        self.stats
    }

    /// Number of tiles waiting in the current batch.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    async fn flush(&mut self) -> Result<usize, BatchFlushError> {
        let batch = std::mem::replace(
            &mut self.pending,
            Vec::with_capacity(self.batch_size),
        );
        let count = batch.len();
        self.stats.flushes += 1;

        match self.store.set_many(batch).await {
            Ok(()) => {
                self.stats.stored += count;
                debug!(count, "Flushed tile batch");
                Ok(count)
            }
            Err(source) => {
                let lost = source.unwritten(count);
                self.stats.failed_flushes += 1;
                self.stats.stored += count - lost;
                self.stats.discarded += lost;

                let err = BatchFlushError { count: lost, source };
                warn!(error = %err, "Discarding tile batch");
                Err(err)
            }
        }
    }
}
