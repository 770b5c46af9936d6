//! Geographic projection and bounding-box tiling.
//!
//! ```text
//! (lat, lon) x 4 corners ──► tile_index() ──► min/max + clip ──► TileRange
//!                                                                   │
//!                                                    iter(): x-major, then y
//! ```
//!
//! # Example
//!
//! ```
//! use osm_tile_cache::geo::{tiles_for, GeoBoundingBox};
//!
//! let bbox = GeoBoundingBox::new(55.0, 36.0, 56.0, 38.0);
//! let tiles = tiles_for(&bbox, 1).unwrap();
//! assert_eq!(tiles.len(), 1);
//! assert_eq!((tiles[0].x, tiles[0].y), (1, 0));
//! ```

mod mercator;
mod tiler;

pub use mercator::{tile_index, MERCATOR_MAX_LAT};
pub use tiler::{tile_range, tiles_for, GeoBoundingBox, TileRange, TileRangeIter};
