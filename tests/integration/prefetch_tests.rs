//! Prefetch integration tests.
//!
//! Tests verify:
//! - Bounding box to tile set to store, end to end
//! - The concurrency bound on upstream fetches
//! - Batched persistence (ceil(K/T) pipelined writes)
//! - Failure isolation and cancellation
//! - A prefetched on-disk store is served by the proxy without upstream calls

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use tower::ServiceExt;

use osm_tile_cache::geo::{tiles_for, GeoBoundingBox};
use osm_tile_cache::prefetch::{run_prefetch, FetchScheduler, SchedulerOptions};
use osm_tile_cache::store::DiskStore;
use osm_tile_cache::tile::{TileIndex, TileService};
use osm_tile_cache::{create_router, ProjectionError, RouterConfig};

use super::test_utils::{zoom10_fixture, FakeFetcher, RecordingStore};

fn moscow() -> GeoBoundingBox {
    GeoBoundingBox::new(55.0, 36.0, 56.0, 38.0)
}

// =============================================================================
// Tiling Fixtures
// =============================================================================

#[test]
fn test_fixture_zoom1() {
    let tiles = tiles_for(&moscow(), 1).unwrap();
    assert_eq!(tiles, vec![TileIndex::new(1, 1, 0).unwrap()]);
}

#[test]
fn test_fixture_zoom10() {
    let tiles = tiles_for(&moscow(), 10).unwrap();
    assert_eq!(tiles, zoom10_fixture());
}

// =============================================================================
// End-to-end Prefetch
// =============================================================================

#[tokio::test]
async fn test_prefetch_populates_store() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new();

    let report = run_prefetch(
        store.clone(),
        Arc::new(fetcher.clone()),
        &moscow(),
        10..=10,
        SchedulerOptions::default(),
        &CancellationToken::new(),
    )
    .await
    .unwrap();

    let summary = report.levels[0].summary;
    assert_eq!(summary.tiles, 42);
    assert_eq!(summary.fetched, 42);
    assert_eq!(summary.failed, 0);

    for tile in zoom10_fixture() {
        assert!(store.contains(&tile.key()).await, "{} missing", tile);
    }
    // Prefetch persists through pipelined writes only
    assert_eq!(store.set_count(), 0);
    assert_eq!(store.batch_sizes().await, vec![42]);
}

#[tokio::test]
async fn test_default_concurrency_bound() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new().with_delay(Duration::from_millis(5));

    let summary = FetchScheduler::new(store, Arc::new(fetcher.clone()), SchedulerOptions::default())
        .run(zoom10_fixture(), &CancellationToken::new())
        .await;

    assert_eq!(summary.fetched, 42);
    assert!(fetcher.peak_concurrency() <= 2);
    assert_eq!(summary.peak_in_flight, 2);
}

#[tokio::test]
async fn test_wide_concurrency_bound() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new().with_delay(Duration::from_millis(5));

    let summary = FetchScheduler::new(
        store,
        Arc::new(fetcher.clone()),
        SchedulerOptions::default().with_concurrency(16),
    )
    .run(zoom10_fixture(), &CancellationToken::new())
    .await;

    assert_eq!(summary.fetched, 42);
    assert!(fetcher.peak_concurrency() <= 16);
    assert!(summary.peak_in_flight > 2);
}

#[tokio::test]
async fn test_batches_are_ceil_of_fetched() {
    let store = Arc::new(RecordingStore::new());

    let summary = FetchScheduler::new(
        store.clone(),
        Arc::new(FakeFetcher::new()),
        SchedulerOptions::default().with_batch_size(10),
    )
    .run(zoom10_fixture(), &CancellationToken::new())
    .await;

    let sizes = store.batch_sizes().await;
    assert_eq!(sizes.len(), 5);
    assert!(sizes.iter().all(|&n| n <= 10));
    assert_eq!(sizes.iter().sum::<usize>(), 42);
    assert_eq!(summary.writer.flushes, 5);
}

#[tokio::test]
async fn test_second_prefetch_skips_cached() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new();
    let cancel = CancellationToken::new();

    for _ in 0..2 {
        run_prefetch(
            store.clone(),
            Arc::new(fetcher.clone()),
            &moscow(),
            8..=10,
            SchedulerOptions::default(),
            &cancel,
        )
        .await
        .unwrap();
    }

    let unique: usize = (8..=10).map(|z| tiles_for(&moscow(), z).unwrap().len()).sum();
    assert_eq!(fetcher.call_count(), unique);
}

// =============================================================================
// Failures and Cancellation
// =============================================================================

#[tokio::test]
async fn test_failed_tiles_isolated() {
    let store = Arc::new(RecordingStore::new());
    let bad = vec![
        TileIndex::new(10, 614, 318).unwrap(),
        TileIndex::new(10, 617, 320).unwrap(),
        TileIndex::new(10, 620, 323).unwrap(),
    ];
    let fetcher = FakeFetcher::new().failing_on(bad.clone());

    let summary = FetchScheduler::new(store.clone(), Arc::new(fetcher), SchedulerOptions::default())
        .run(zoom10_fixture(), &CancellationToken::new())
        .await;

    assert_eq!(summary.failed, 3);
    assert_eq!(summary.fetched, 39);
    assert_eq!(store.len().await, 39);
    for tile in bad {
        assert!(!store.contains(&tile.key()).await);
    }
}

#[tokio::test]
async fn test_failed_batch_discarded() {
    let store = Arc::new(RecordingStore::new().failing_batch(0));

    let summary = FetchScheduler::new(
        store.clone(),
        Arc::new(FakeFetcher::new()),
        SchedulerOptions::default().with_batch_size(20),
    )
    .run(zoom10_fixture(), &CancellationToken::new())
    .await;

    assert_eq!(summary.fetched, 42);
    assert_eq!(summary.writer.failed_flushes, 1);
    assert_eq!(summary.writer.discarded, 20);
    assert_eq!(store.len().await, 22);
}

#[tokio::test]
async fn test_store_read_failure_skips_tiles() {
    let store = Arc::new(RecordingStore::new().failing_reads());
    let fetcher = FakeFetcher::new();

    let summary = FetchScheduler::new(store, Arc::new(fetcher.clone()), SchedulerOptions::default())
        .run(zoom10_fixture(), &CancellationToken::new())
        .await;

    assert_eq!(summary.failed, 42);
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_cancel_during_run() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new().with_delay(Duration::from_millis(20));
    let cancel = CancellationToken::new();

    let trigger = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            cancel.cancel();
        })
    };

    let report = run_prefetch(
        store.clone(),
        Arc::new(fetcher.clone()),
        &moscow(),
        10..=12,
        SchedulerOptions::default(),
        &cancel,
    )
    .await
    .unwrap();
    trigger.await.unwrap();

    assert!(report.cancelled);
    let total = report.total();
    assert!(total.cancelled > 0);
    assert_eq!(total.fetched, fetcher.call_count());
    // Everything fetched before the cancel was still written
    assert_eq!(store.len().await, total.fetched);
}

#[tokio::test]
async fn test_polar_box_rejected() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new();

    let result = run_prefetch(
        store,
        Arc::new(fetcher.clone()),
        &GeoBoundingBox::new(80.0, -10.0, 90.0, 10.0),
        0..=4,
        SchedulerOptions::default(),
        &CancellationToken::new(),
    )
    .await;

    assert!(matches!(result, Err(ProjectionError::InvalidLatitude(_))));
    assert_eq!(fetcher.call_count(), 0);
}

// =============================================================================
// Prefetch then Serve
// =============================================================================

#[tokio::test]
async fn test_prefetched_disk_store_served_without_upstream() {
    let dir = TempDir::new().unwrap();

    {
        let store = Arc::new(DiskStore::open(dir.path()).await.unwrap());
        let report = run_prefetch(
            store,
            Arc::new(FakeFetcher::new()),
            &moscow(),
            1..=1,
            SchedulerOptions::default(),
            &CancellationToken::new(),
        )
        .await
        .unwrap();
        assert_eq!(report.total().writer.stored, 1);
    }

    // A separate process opening the same directory sees the tile
    let store = Arc::new(DiskStore::open(dir.path()).await.unwrap());
    let fetcher = FakeFetcher::new().failing_always();
    let router = create_router(
        TileService::new(store, Arc::new(fetcher.clone())),
        RouterConfig::new().with_tracing(false),
    );

    let response = router
        .oneshot(Request::builder().uri("/1/1/0.png").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "true");
    assert_eq!(fetcher.call_count(), 0);
}
