//! API integration tests for the read-through tile endpoint.
//!
//! Tests verify:
//! - Miss-then-hit behavior and the cache-hit header
//! - Error cases (upstream failure, invalid coordinates, malformed paths)
//! - Store failures never reach the client
//! - Health and stats endpoints

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use osm_tile_cache::tile::{TileIndex, TileKey, TileService};
use osm_tile_cache::{create_router, RouterConfig};

use super::test_utils::{FakeFetcher, RecordingStore};

fn router_with(store: Arc<RecordingStore>, fetcher: FakeFetcher) -> Router {
    let service = TileService::new(store, Arc::new(fetcher));
    create_router(service, RouterConfig::new().with_tracing(false))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let body = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&body).unwrap()
}

// =============================================================================
// Tile Retrieval
// =============================================================================

#[tokio::test]
async fn test_miss_then_hit() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new().with_body(b"ABC");
    let router = router_with(store.clone(), fetcher.clone());

    // First request - cache miss, filled from upstream
    let response = router.clone().oneshot(get("/5/10/12.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("content-type").unwrap(), "image/png");
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "false");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ABC");

    assert!(store.contains(&TileKey::parse("tile_10_12_5").unwrap()).await);

    // Second request - served from the store
    let response = router.oneshot(get("/5/10/12.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "true");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ABC");

    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_tile_without_png_extension() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new().with_body(b"ABC");
    let router = router_with(store, fetcher.clone());

    let response = router.oneshot(get("/5/10/12")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        fetcher.fetched_tiles().await,
        vec![TileIndex::new(5, 10, 12).unwrap()]
    );
}

#[tokio::test]
async fn test_bytes_returned_unmodified() {
    let store = Arc::new(RecordingStore::new());
    let png: &'static [u8] = b"\x89PNG\r\n\x1a\n\x00\x00\x00\rIHDR";
    let router = router_with(store, FakeFetcher::new().with_body(png));

    let response = router.oneshot(get("/0/0/0.png")).await.unwrap();
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], png);
}

#[tokio::test]
async fn test_cache_control_header() {
    let store = Arc::new(RecordingStore::new());
    let service = TileService::new(store, Arc::new(FakeFetcher::new()));
    let router = create_router(
        service,
        RouterConfig::new().with_cache_max_age(86400).with_tracing(false),
    );

    let response = router.oneshot(get("/1/1/1.png")).await.unwrap();
    assert_eq!(
        response.headers().get("cache-control").unwrap(),
        "public, max-age=86400"
    );
}

#[tokio::test]
async fn test_prefilled_tile_never_hits_upstream() {
    let store = Arc::new(RecordingStore::new());
    let tile = TileIndex::new(7, 77, 40).unwrap();
    store.seed(tile, b"prefetched").await;
    let fetcher = FakeFetcher::new();
    let router = router_with(store, fetcher.clone());

    let response = router.oneshot(get("/7/77/40.png")).await.unwrap();
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "true");
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"prefetched");
    assert_eq!(fetcher.call_count(), 0);
}

// =============================================================================
// Error Cases
// =============================================================================

#[tokio::test]
async fn test_upstream_failure_is_404() {
    let store = Arc::new(RecordingStore::new());
    let router = router_with(store.clone(), FakeFetcher::new().failing_always());

    let response = router.oneshot(get("/5/10/12.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    let json = body_json(response).await;
    assert_eq!(json["error"], "tile_unavailable");
    assert!(json["message"].as_str().unwrap().contains("503"));

    // Nothing is cached for a failed fetch
    assert_eq!(store.len().await, 0);
    assert_eq!(store.set_count(), 0);
}

#[tokio::test]
async fn test_out_of_grid_is_400() {
    let store = Arc::new(RecordingStore::new());
    let fetcher = FakeFetcher::new();
    let router = router_with(store, fetcher.clone());

    for uri in ["/1/2/0.png", "/1/0/2.png", "/31/0/0.png", "/3/99999999999/0.png"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_tile");
    }
    assert_eq!(fetcher.call_count(), 0);
}

#[tokio::test]
async fn test_non_numeric_path_is_400() {
    let router = router_with(Arc::new(RecordingStore::new()), FakeFetcher::new());

    for uri in ["/a/0/0.png", "/1/-1/0.png", "/1/0/0.jpg"] {
        let response = router.clone().oneshot(get(uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST, "{}", uri);

        let json = body_json(response).await;
        assert_eq!(json["error"], "invalid_path");
    }
}

#[tokio::test]
async fn test_unknown_route_is_404() {
    let router = router_with(Arc::new(RecordingStore::new()), FakeFetcher::new());

    let response = router.oneshot(get("/tiles/1/0/0/0.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

// =============================================================================
// Store Failures
// =============================================================================

#[tokio::test]
async fn test_store_read_failure_serves_from_upstream() {
    let store = Arc::new(RecordingStore::new().failing_reads());
    let fetcher = FakeFetcher::new().with_body(b"ABC");
    let router = router_with(store, fetcher.clone());

    let response = router.oneshot(get("/5/10/12.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers().get("x-tile-cache-hit").unwrap(), "false");
    assert_eq!(fetcher.call_count(), 1);
}

#[tokio::test]
async fn test_store_write_failure_still_200() {
    let store = Arc::new(RecordingStore::new().failing_writes());
    let router = router_with(store.clone(), FakeFetcher::new().with_body(b"ABC"));

    let response = router.oneshot(get("/5/10/12.png")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let body = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&body[..], b"ABC");
    assert_eq!(store.set_count(), 1);
}

// =============================================================================
// Health and Stats
// =============================================================================

#[tokio::test]
async fn test_health_endpoint() {
    let router = router_with(Arc::new(RecordingStore::new()), FakeFetcher::new());

    let response = router.oneshot(get("/health")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["version"], env!("CARGO_PKG_VERSION"));
}

#[tokio::test]
async fn test_stats_endpoint_counts_requests() {
    let router = router_with(
        Arc::new(RecordingStore::new()),
        FakeFetcher::new().with_body(b"ABC"),
    );

    for _ in 0..3 {
        let response = router.clone().oneshot(get("/2/1/1.png")).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let response = router.oneshot(get("/stats")).await.unwrap();
    let json = body_json(response).await;
    assert_eq!(json["requests"], 3);
    assert_eq!(json["cache_hits"], 2);
    assert_eq!(json["cache_misses"], 1);
    assert_eq!(json["upstream_fetches"], 1);
    assert_eq!(json["single_flight"], false);
}
