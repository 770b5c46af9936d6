//! Configuration management for the tile cache.
//!
//! This module provides the command-line interface:
//! - `serve`: run the read-through HTTP proxy
//! - `prefetch`: fill the cache for a bounding box and zoom range
//!
//! Both subcommands share the store and upstream settings, so a prefetch run
//! and a later `serve` process pointed at the same `--store-dir` agree on
//! where every tile lives.
//!
//! # Environment Variables
//!
//! Every option can also be set with a `TILE_CACHE_` prefixed variable:
//!
//! - `TILE_CACHE_HOST` - Server bind address (default: 0.0.0.0)
//! - `TILE_CACHE_PORT` - Server port (default: 8080)
//! - `TILE_CACHE_STORE_DIR` - Directory for the shared on-disk store
//! - `TILE_CACHE_MEMORY_CAPACITY` - In-memory store size in bytes
//! - `TILE_CACHE_MIRRORS` - Comma-separated `{z}/{x}/{y}` URL templates
//! - `TILE_CACHE_USER_AGENT` - Identifying client header for upstream
//! - `TILE_CACHE_FETCH_TIMEOUT` - Per-fetch timeout in seconds (default: 30)
//! - `TILE_CACHE_CONCURRENCY` - Prefetch concurrency (default: 2)

use std::path::PathBuf;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};

use crate::error::UpstreamError;
use crate::geo::{GeoBoundingBox, MERCATOR_MAX_LAT};
use crate::prefetch::{
    SchedulerOptions, DEFAULT_BATCH_SIZE, DEFAULT_CHANNEL_CAPACITY, DEFAULT_CONCURRENCY,
};
use crate::server::{RouterConfig, DEFAULT_CACHE_MAX_AGE};
use crate::store::DEFAULT_MEMORY_CAPACITY;
use crate::tile::MAX_ZOOM;
use crate::upstream::{MirrorSet, DEFAULT_FETCH_TIMEOUT, DEFAULT_MIRRORS, DEFAULT_USER_AGENT};

// =============================================================================
// Default Values
// =============================================================================

/// Default server host.
pub const DEFAULT_HOST: &str = "0.0.0.0";

/// Default server port.
pub const DEFAULT_PORT: u16 = 8080;

// =============================================================================
// CLI
// =============================================================================

/// OSM tile cache - bulk prefetcher and read-through proxy for map tiles.
#[derive(Parser, Debug, Clone)]
#[command(name = "osm-tile-cache")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    pub fn into_command(self) -> Command {
        self.command
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Serve tiles over HTTP, filling the cache from upstream on miss.
    Serve(ServeConfig),

    /// Fetch every tile covering a bounding box into the cache.
    Prefetch(PrefetchConfig),
}

// =============================================================================
// Shared Arguments
// =============================================================================

/// Where tiles are cached.
#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    /// Directory for the on-disk store (shared between processes).
    ///
    /// If not specified, tiles are kept in memory for this process only.
    #[arg(long, env = "TILE_CACHE_STORE_DIR")]
    pub store_dir: Option<PathBuf>,

    /// Capacity in bytes of the in-memory store.
    #[arg(long, default_value_t = DEFAULT_MEMORY_CAPACITY, env = "TILE_CACHE_MEMORY_CAPACITY")]
    pub memory_capacity: usize,
}

impl StoreArgs {
    pub fn validate(&self) -> Result<(), String> {
        if self.store_dir.is_none() && self.memory_capacity == 0 {
            return Err("memory_capacity must be greater than 0".to_string());
        }
        if let Some(dir) = &self.store_dir {
            if dir.as_os_str().is_empty() {
                return Err("store_dir must not be empty".to_string());
            }
        }
        Ok(())
    }
}

/// How tiles are fetched from the provider.
#[derive(Args, Debug, Clone)]
pub struct UpstreamArgs {
    /// Mirror URL templates with {z}, {x} and {y} placeholders (comma-separated).
    #[arg(
        long,
        env = "TILE_CACHE_MIRRORS",
        value_delimiter = ',',
        default_values_t = DEFAULT_MIRRORS.iter().map(|m| m.to_string()).collect::<Vec<_>>()
    )]
    pub mirrors: Vec<String>,

    /// User-Agent sent to the tile provider.
    #[arg(long, default_value = DEFAULT_USER_AGENT, env = "TILE_CACHE_USER_AGENT")]
    pub user_agent: String,

    /// Per-fetch timeout in seconds.
    #[arg(long = "fetch-timeout", default_value_t = DEFAULT_FETCH_TIMEOUT.as_secs(), env = "TILE_CACHE_FETCH_TIMEOUT")]
    pub fetch_timeout_secs: u64,
}

impl UpstreamArgs {
    pub fn validate(&self) -> Result<(), String> {
        self.mirror_set().map_err(|e| e.to_string())?;
        if self.user_agent.trim().is_empty() {
            return Err("user_agent must not be empty".to_string());
        }
        if self.fetch_timeout_secs == 0 {
            return Err("fetch_timeout must be greater than 0".to_string());
        }
        Ok(())
    }

    pub fn mirror_set(&self) -> Result<MirrorSet, UpstreamError> {
        MirrorSet::new(self.mirrors.iter().map(|m| m.trim().to_string()))
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }
}

// =============================================================================
// Serve
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct ServeConfig {
    /// Host address to bind the server to.
    #[arg(long, default_value = DEFAULT_HOST, env = "TILE_CACHE_HOST")]
    pub host: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = DEFAULT_PORT, env = "TILE_CACHE_PORT")]
    pub port: u16,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Share one upstream fetch between concurrent misses for the same tile.
    #[arg(long, default_value_t = false, env = "TILE_CACHE_SINGLE_FLIGHT")]
    pub single_flight: bool,

    /// HTTP Cache-Control max-age in seconds.
    #[arg(long, default_value_t = DEFAULT_CACHE_MAX_AGE, env = "TILE_CACHE_MAX_AGE")]
    pub cache_max_age: u32,

    /// Allowed CORS origins (comma-separated).
    ///
    /// If not specified, allows any origin.
    #[arg(long, env = "TILE_CACHE_CORS_ORIGINS", value_delimiter = ',')]
    pub cors_origins: Option<Vec<String>>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,

    /// Disable request tracing.
    #[arg(long, default_value_t = false)]
    pub no_tracing: bool,
}

impl ServeConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.host.is_empty() {
            return Err("host must not be empty".to_string());
        }
        self.store.validate()?;
        self.upstream.validate()?;
        Ok(())
    }

    /// Get the server bind address as "host:port".
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn router_config(&self) -> RouterConfig {
        let mut config = RouterConfig::new()
            .with_cache_max_age(self.cache_max_age)
            .with_tracing(!self.no_tracing);

        if let Some(origins) = &self.cors_origins {
            config = config.with_cors_origins(origins.clone());
        }
        config
    }
}

// =============================================================================
// Prefetch
// =============================================================================

#[derive(Args, Debug, Clone)]
pub struct PrefetchConfig {
    /// Southern edge latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub south: f64,

    /// Western edge longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub west: f64,

    /// Northern edge latitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub north: f64,

    /// Eastern edge longitude in degrees.
    #[arg(long, allow_hyphen_values = true)]
    pub east: f64,

    /// First zoom level (inclusive).
    #[arg(long, default_value_t = 0)]
    pub min_zoom: u8,

    /// Last zoom level (inclusive).
    #[arg(long)]
    pub max_zoom: u8,

    #[command(flatten)]
    pub store: StoreArgs,

    #[command(flatten)]
    pub upstream: UpstreamArgs,

    /// Maximum tiles being checked or fetched at once.
    #[arg(short = 'c', long, default_value_t = DEFAULT_CONCURRENCY, env = "TILE_CACHE_CONCURRENCY")]
    pub concurrency: usize,

    /// Tiles per pipelined store write.
    #[arg(long, default_value_t = DEFAULT_BATCH_SIZE, env = "TILE_CACHE_BATCH_SIZE")]
    pub batch_size: usize,

    /// Capacity of the fetch-to-write channel.
    #[arg(long, default_value_t = DEFAULT_CHANNEL_CAPACITY, env = "TILE_CACHE_CHANNEL_CAPACITY")]
    pub channel_capacity: usize,

    /// Enable verbose logging (debug level).
    #[arg(short, long, default_value_t = false)]
    pub verbose: bool,
}

impl PrefetchConfig {
    pub fn validate(&self) -> Result<(), String> {
        for (name, lat) in [("south", self.south), ("north", self.north)] {
            if !lat.is_finite() || lat.abs() > MERCATOR_MAX_LAT {
                return Err(format!(
                    "{} must be a latitude between -{max} and {max}, got {}",
                    name,
                    lat,
                    max = MERCATOR_MAX_LAT
                ));
            }
        }
        for (name, lon) in [("west", self.west), ("east", self.east)] {
            if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
                return Err(format!(
                    "{} must be a longitude between -180 and 180, got {}",
                    name, lon
                ));
            }
        }
        if self.min_zoom > self.max_zoom {
            return Err(format!(
                "min_zoom ({}) must not exceed max_zoom ({})",
                self.min_zoom, self.max_zoom
            ));
        }
        if self.max_zoom > MAX_ZOOM {
            return Err(format!("max_zoom must be at most {}", MAX_ZOOM));
        }
        if self.concurrency == 0 {
            return Err("concurrency must be greater than 0".to_string());
        }
        if self.batch_size == 0 {
            return Err("batch_size must be greater than 0".to_string());
        }
        if self.channel_capacity == 0 {
            return Err("channel_capacity must be greater than 0".to_string());
        }
        self.store.validate()?;
        self.upstream.validate()?;
        Ok(())
    }

    pub fn bounding_box(&self) -> GeoBoundingBox {
        GeoBoundingBox::new(self.south, self.west, self.north, self.east)
    }

    pub fn zooms(&self) -> std::ops::RangeInclusive<u8> {
        self.min_zoom..=self.max_zoom
    }

    pub fn scheduler_options(&self) -> SchedulerOptions {
        SchedulerOptions::default()
            .with_concurrency(self.concurrency)
            .with_batch_size(self.batch_size)
            .with_channel_capacity(self.channel_capacity)
            .with_fetch_timeout(self.upstream.fetch_timeout())
    }
}

// =============================================================================
// Tests
// =============================================================================
