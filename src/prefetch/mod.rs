//! Bulk prefetch of a bounding box across a range of zoom levels.
//!
//! Zoom levels are processed one after another. For each level the box is
//! tiled, and a [`FetchScheduler`] fetches every tile missing from the store
//! while a single [`BatchWriter`] persists them in pipelined batches.
//!
//! # Example
//!
//! ```ignore
//! let report = run_prefetch(
//!     store,
//!     fetcher,
//!     &GeoBoundingBox::new(55.0, 36.0, 56.0, 38.0),
//!     1..=10,
//!     SchedulerOptions::default(),
//!     &CancellationToken::new(),
//! )
//! .await?;
//! ```

mod gate;
mod scheduler;
mod writer;

pub use gate::{AdmissionGate, AdmissionPermit};
pub use scheduler::{
    FetchScheduler, RunSummary, SchedulerOptions, TileOutcome, DEFAULT_CONCURRENCY,
};
pub use writer::{
    BatchWriter, FetchedTile, WriterStats, DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY,
};

use std::ops::RangeInclusive;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::error::ProjectionError;
use crate::geo::{tile_range, GeoBoundingBox, TileRange};
use crate::store::CacheStore;
use crate::upstream::UpstreamFetcher;

/// Results for one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ZoomReport {
    pub zoom: u8,
    pub summary: RunSummary,
}

/// Results for a whole prefetch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PrefetchReport {
    /// Levels that were started, in order
    pub levels: Vec<ZoomReport>,

    /// Whether the run was cancelled before every level finished
    pub cancelled: bool,
}

impl PrefetchReport {
    /// Totals across all levels.
    pub fn total(&self) -> RunSummary {
        let mut total = RunSummary::default();
        for level in &self.levels {
            total.merge(&level.summary);
        }
        total
    }
}

/// Prefetch every tile covering `bbox` at each zoom in `zooms`.
///
/// All tile ranges are computed before any work starts, so an invalid box or
/// zoom fails the call without touching the store. Per-tile failures are
/// counted in the report, never returned.
pub async fn run_prefetch<S, F>(
    store: Arc<S>,
    fetcher: Arc<F>,
    bbox: &GeoBoundingBox,
    zooms: RangeInclusive<u8>,
    options: SchedulerOptions,
    cancel: &CancellationToken,
) -> Result<PrefetchReport, ProjectionError>
where
    S: CacheStore + 'static,
    F: UpstreamFetcher + 'static,
{
    let ranges = zooms
        .map(|zoom| tile_range(bbox, zoom))
        .collect::<Result<Vec<TileRange>, _>>()?;

    let scheduler = FetchScheduler::new(store, fetcher, options);
    let mut report = PrefetchReport::default();

    for range in ranges {
        if cancel.is_cancelled() {
            report.cancelled = true;
            break;
        }

        info!(
            zoom = range.zoom,
            tiles = range.len(),
            x = ?(range.min_x..=range.max_x),
            y = ?(range.min_y..=range.max_y),
            "Prefetching zoom level"
        );

        let summary = scheduler.run(range.iter(), cancel).await;

        if summary.failed > 0 || summary.writer.discarded > 0 {
            warn!(
                zoom = range.zoom,
                failed = summary.failed,
                discarded = summary.writer.discarded,
                "Zoom level finished with errors"
            );
        }
        info!(
            zoom = range.zoom,
            cached = summary.cached,
            fetched = summary.fetched,
            stored = summary.writer.stored,
            "Zoom level complete"
        );

        report.levels.push(ZoomReport {
            zoom: range.zoom,
            summary,
        });
    }

    if cancel.is_cancelled() {
        report.cancelled = true;
    }

    Ok(report)
}
