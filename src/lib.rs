//! # OSM Tile Cache
//!
//! A cache of slippy-map raster tiles addressed by Web-Mercator `(zoom, x, y)`
//! coordinates, filled from a remote tile provider over HTTP.
//!
//! Two modes share the same core:
//!
//! - **Bulk prefetch**: a geographic bounding box and a zoom range are turned
//!   into the covering tile set, which is fetched with bounded concurrency and
//!   persisted in pipelined batches.
//! - **Read-through proxy**: `GET /{z}/{x}/{y}.png` is served from the cache,
//!   filled from upstream on a miss.
//!
//! ## Architecture
//!
//! - [`geo`] - Web-Mercator projection and bounding-box tiling
//! - [`tile`] - Tile identity, cache keys and the read-through service
//! - [`store`] - The cache store seam with memory and disk implementations
//! - [`upstream`] - The upstream fetcher seam and the HTTP mirror client
//! - [`prefetch`] - Admission gate, batch writer and fetch scheduler
//! - [`server`] - Axum-based HTTP server and routes
//! - [`config`] - CLI and configuration types
//!
//! ## Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use osm_tile_cache::{create_router, HttpTileFetcher, MemoryStore, RouterConfig, TileService};
//!
//! #[tokio::main]
//! async fn main() {
//!     let store = Arc::new(MemoryStore::new());
//!     let fetcher = Arc::new(HttpTileFetcher::openstreetmap().unwrap());
//!
//!     let router = create_router(TileService::new(store, fetcher), RouterConfig::new());
//!     let listener = tokio::net::TcpListener::bind("0.0.0.0:8080").await.unwrap();
//!     axum::serve(listener, router).await.unwrap();
//! }
//! ```

pub mod config;
pub mod error;
pub mod geo;
pub mod prefetch;
pub mod server;
pub mod store;
pub mod tile;
pub mod upstream;

// Re-export commonly used types
pub use config::{Cli, Command, PrefetchConfig, ServeConfig, StoreArgs, UpstreamArgs};
pub use error::{BatchFlushError, KeyError, ProjectionError, StoreError, TileError, UpstreamError};
pub use geo::{tile_index, tile_range, tiles_for, GeoBoundingBox, TileRange};
pub use prefetch::{
    run_prefetch, AdmissionGate, BatchWriter, FetchScheduler, PrefetchReport, RunSummary,
    SchedulerOptions, TileOutcome, WriterStats, ZoomReport,
};
pub use server::{create_router, AppState, ErrorResponse, HealthResponse, RouterConfig};
pub use store::{CacheStore, DiskStore, MemoryStore};
pub use tile::{grid_size, TileIndex, TileKey, TileResponse, TileService, MAX_ZOOM};
pub use upstream::{fetch_with_timeout, HttpTileFetcher, MirrorSet, UpstreamFetcher};
