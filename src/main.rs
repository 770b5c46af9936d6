//! OSM tile cache - bulk prefetcher and read-through proxy for map tiles.
//!
//! This binary wires the configured store and upstream into either the HTTP
//! server or a one-shot prefetch run.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use osm_tile_cache::{
    config::{Cli, Command, PrefetchConfig, ServeConfig, StoreArgs, UpstreamArgs},
    prefetch::run_prefetch,
    server::create_router,
    store::{CacheStore, DiskStore, MemoryStore},
    tile::TileService,
    upstream::HttpTileFetcher,
};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.into_command() {
        Command::Serve(config) => run_serve(config).await,
        Command::Prefetch(config) => run_prefetch_command(config).await,
    }
}

// =============================================================================
// Shared Setup
// =============================================================================

/// Initialize the tracing/logging subsystem.
fn init_logging(verbose: bool) {
    let env_filter = if verbose {
        "osm_tile_cache=debug,tower_http=debug"
    } else {
        "osm_tile_cache=info,tower_http=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| env_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn build_fetcher(upstream: &UpstreamArgs) -> Option<Arc<HttpTileFetcher>> {
    let mirrors = match upstream.mirror_set() {
        Ok(mirrors) => mirrors,
        Err(e) => {
            error!("Configuration error: {}", e);
            return None;
        }
    };

    info!("  Upstream: {} mirror(s)", mirrors.len());
    for mirror in mirrors.iter() {
        info!("    {}", mirror.template());
    }
    info!("  User-Agent: {}", upstream.user_agent);
    info!("  Fetch timeout: {}s", upstream.fetch_timeout_secs);

    match HttpTileFetcher::new(mirrors, &upstream.user_agent, upstream.fetch_timeout()) {
        Ok(fetcher) => Some(Arc::new(fetcher)),
        Err(e) => {
            error!("Failed to create upstream client: {}", e);
            None
        }
    }
}

async fn open_disk_store(store: &StoreArgs) -> Option<Arc<DiskStore>> {
    let dir = store.store_dir.as_ref()?;
    match DiskStore::open(dir).await {
        Ok(store) => {
            info!("  Store: disk at {}", dir.display());
            Some(Arc::new(store))
        }
        Err(e) => {
            error!("Failed to open store at {}: {}", dir.display(), e);
            None
        }
    }
}

fn memory_store(store: &StoreArgs) -> Arc<MemoryStore> {
    info!(
        "  Store: memory, {}MB (not shared between processes)",
        store.memory_capacity / (1024 * 1024)
    );
    Arc::new(MemoryStore::with_capacity(store.memory_capacity))
}

// =============================================================================
// Serve Command
// =============================================================================

async fn run_serve(config: ServeConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    info!("osm-tile-cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");

    let Some(fetcher) = build_fetcher(&config.upstream) else {
        return ExitCode::FAILURE;
    };

    if config.store.store_dir.is_some() {
        match open_disk_store(&config.store).await {
            Some(store) => serve(config, store, fetcher).await,
            None => ExitCode::FAILURE,
        }
    } else {
        let store = memory_store(&config.store);
        serve(config, store, fetcher).await
    }
}

async fn serve<S: CacheStore + 'static>(
    config: ServeConfig,
    store: Arc<S>,
    fetcher: Arc<HttpTileFetcher>,
) -> ExitCode {
    if config.single_flight {
        info!("  Single-flight: enabled");
    }

    let tile_service = TileService::new(store, fetcher)
        .with_fetch_timeout(config.upstream.fetch_timeout())
        .with_single_flight(config.single_flight);
    let router = create_router(tile_service, config.router_config());

    let addr = config.bind_address();

    info!("");
    info!("  Server listening on: http://{}", addr);
    info!("    curl http://{}/health", addr);
    info!("    curl -o tile.png http://{}/0/0/0.png", addr);
    info!("");

    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("Failed to bind to {}: {}", addr, e);
            return ExitCode::FAILURE;
        }
    };

    let shutdown = async {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Shutting down");
        }
    };

    if let Err(e) = axum::serve(listener, router)
        .with_graceful_shutdown(shutdown)
        .await
    {
        error!("Server error: {}", e);
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}

// =============================================================================
// Prefetch Command
// =============================================================================

async fn run_prefetch_command(config: PrefetchConfig) -> ExitCode {
    init_logging(config.verbose);

    if let Err(e) = config.validate() {
        error!("Configuration error: {}", e);
        return ExitCode::FAILURE;
    }

    let bbox = config.bounding_box();
    info!("osm-tile-cache v{}", env!("CARGO_PKG_VERSION"));
    info!("Configuration:");
    info!(
        "  Box: south={} west={} north={} east={}",
        bbox.south, bbox.west, bbox.north, bbox.east
    );
    info!("  Zoom: {}..={}", config.min_zoom, config.max_zoom);
    info!(
        "  Concurrency: {}, batch size: {}",
        config.concurrency, config.batch_size
    );

    let Some(fetcher) = build_fetcher(&config.upstream) else {
        return ExitCode::FAILURE;
    };

    if config.store.store_dir.is_none() {
        warn!("No --store-dir given; prefetched tiles are discarded when this process exits");
        let store = memory_store(&config.store);
        return prefetch(config, store, fetcher).await;
    }

    match open_disk_store(&config.store).await {
        Some(store) => prefetch(config, store, fetcher).await,
        None => ExitCode::FAILURE,
    }
}

async fn prefetch<S: CacheStore + 'static>(
    config: PrefetchConfig,
    store: Arc<S>,
    fetcher: Arc<HttpTileFetcher>,
) -> ExitCode {
    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted; finishing admitted tiles and flushing");
                cancel.cancel();
            }
        });
    }

    let report = match run_prefetch(
        store,
        fetcher,
        &config.bounding_box(),
        config.zooms(),
        config.scheduler_options(),
        &cancel,
    )
    .await
    {
        Ok(report) => report,
        Err(e) => {
            error!("Invalid bounding box: {}", e);
            return ExitCode::FAILURE;
        }
    };

    let total = report.total();
    info!(
        tiles = total.tiles,
        cached = total.cached,
        fetched = total.fetched,
        failed = total.failed,
        stored = total.writer.stored,
        discarded = total.writer.discarded,
        "Prefetch finished"
    );

    if report.cancelled {
        warn!("Prefetch cancelled before completion");
        return ExitCode::FAILURE;
    }

    ExitCode::SUCCESS
}
