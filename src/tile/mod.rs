//! Tile identity and the read-through tile service.
//!
//! # Components
//!
//! - [`TileIndex`]: Validated `(zoom, x, y)` coordinate
//! - [`TileKey`]: Cache key derived from a tile index (`tile_{x}_{y}_{z}`)
//! - [`TileService`]: Serves tiles from the cache store, filling misses from upstream
//! - [`TileResponse`]: Tile bytes plus whether they came from the store
//!
//! # Example
//!
//! ```
//! use osm_tile_cache::tile::{TileIndex, TileKey};
//!
//! let tile = TileIndex::new(5, 10, 12).unwrap();
//! assert_eq!(tile.key().as_str(), "tile_10_12_5");
//!
//! let key: TileKey = "tile_10_12_5".parse().unwrap();
//! assert_eq!(key.tile_index().unwrap(), tile);
//! ```

mod key;
mod service;

pub use key::{grid_size, TileIndex, TileKey, MAX_ZOOM};
pub use service::{ServiceStats, StatsSnapshot, TileResponse, TileService};
