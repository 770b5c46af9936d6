//! Bounding-box tiling.
//!
//! Projects all four corners of a box (a single corner pair is not enough
//! once the projection's non-linearity is taken into account), takes the
//! element-wise min/max and clips the result to the tile grid.

use crate::error::ProjectionError;
use crate::tile::{grid_size, TileIndex};

use super::mercator::tile_index;

// =============================================================================
// Geographic Bounding Box
// =============================================================================

/// A geographic rectangle given by its south-west and north-east corners.
///
/// West and east are assumed not to wrap across the antimeridian.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoBoundingBox {
    pub south: f64,
    pub west: f64,
    pub north: f64,
    pub east: f64,
}

impl GeoBoundingBox {
    /// Create a box, swapping south/north if given in the wrong order.
    pub fn new(south: f64, west: f64, north: f64, east: f64) -> Self {
        let (south, north) = if south <= north {
            (south, north)
        } else {
            (north, south)
        };

        Self {
            south,
            west,
            north,
            east,
        }
    }

    /// A box degenerated to a single point.
    pub fn point(lat: f64, lon: f64) -> Self {
        Self::new(lat, lon, lat, lon)
    }

    fn corners(&self) -> [(f64, f64); 4] {
        [
            (self.south, self.west),
            (self.south, self.east),
            (self.north, self.west),
            (self.north, self.east),
        ]
    }
}

// =============================================================================
// Tile Range
// =============================================================================

/// Inclusive, clipped rectangle of tile indices at one zoom level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileRange {
    pub zoom: u8,
    pub min_x: u32,
    pub max_x: u32,
    pub min_y: u32,
    pub max_y: u32,
    empty: bool,
}

impl TileRange {
    fn empty(zoom: u8) -> Self {
        Self {
            zoom,
            min_x: 0,
            max_x: 0,
            min_y: 0,
            max_y: 0,
            empty: true,
        }
    }

    /// Whether the range covers no tiles.
    pub fn is_empty(&self) -> bool {
        self.empty
    }

    /// Number of tiles in the range.
    pub fn len(&self) -> u64 {
        if self.empty {
            return 0;
        }
        let cols = (self.max_x - self.min_x) as u64 + 1;
        let rows = (self.max_y - self.min_y) as u64 + 1;
        cols * rows
    }

    /// Iterate over the tiles, x-major then y.
    pub fn iter(&self) -> TileRangeIter {
        TileRangeIter {
            range: *self,
            x: self.min_x,
            y: self.min_y,
            done: self.empty,
        }
    }
}

impl IntoIterator for TileRange {
    type Item = TileIndex;
    type IntoIter = TileRangeIter;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over a [`TileRange`].
#[derive(Debug, Clone)]
pub struct TileRangeIter {
    range: TileRange,
    x: u32,
    y: u32,
    done: bool,
}

impl Iterator for TileRangeIter {
    type Item = TileIndex;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }

        let tile = TileIndex {
            zoom: self.range.zoom,
            x: self.x,
            y: self.y,
        };

        if self.y < self.range.max_y {
            self.y += 1;
        } else if self.x < self.range.max_x {
            self.x += 1;
            self.y = self.range.min_y;
        } else {
            self.done = true;
        }

        Some(tile)
    }
}

// =============================================================================
// Tiling
// =============================================================================

/// Compute the clipped tile rectangle covering `bbox` at `zoom`.
///
/// Returns an empty range if the rectangle is inverted after clipping.
pub fn tile_range(bbox: &GeoBoundingBox, zoom: u8) -> Result<TileRange, ProjectionError> {
    let mut min_x = i64::MAX;
    let mut max_x = i64::MIN;
    let mut min_y = i64::MAX;
    let mut max_y = i64::MIN;

    for (lat, lon) in bbox.corners() {
        let (x, y) = tile_index(lat, lon, zoom)?;
        min_x = min_x.min(x);
        max_x = max_x.max(x);
        min_y = min_y.min(y);
        max_y = max_y.max(y);
    }

    let last = grid_size(zoom) as i64 - 1;
    let min_x = min_x.max(0);
    let max_x = max_x.min(last);
    let min_y = min_y.max(0);
    let max_y = max_y.min(last);

    if min_x > max_x || min_y > max_y {
        return Ok(TileRange::empty(zoom));
    }

    Ok(TileRange {
        zoom,
        min_x: min_x as u32,
        max_x: max_x as u32,
        min_y: min_y as u32,
        max_y: max_y as u32,
        empty: false,
    })
}

/// Enumerate every tile covering `bbox` at `zoom`, x-major then y.
pub fn tiles_for(bbox: &GeoBoundingBox, zoom: u8) -> Result<Vec<TileIndex>, ProjectionError> {
    Ok(tile_range(bbox, zoom)?.iter().collect())
}
