//! Tile identity and cache key encoding.
//!
//! A tile is identified solely by its `(zoom, x, y)` triple. The cache key is a
//! pure function of that triple, so the prefetcher (writer path) and the proxy
//! (reader path) always agree on where a tile lives:
//!
//! ```text
//! TileIndex { zoom: 5, x: 10, y: 12 }  <->  "tile_10_12_5"
//! ```

use std::fmt;
use std::str::FromStr;

use crate::error::{KeyError, TileError};

/// Highest zoom level accepted anywhere in the crate.
///
/// At zoom 30 the grid is 2^30 tiles wide, which still fits `u32` indices and
/// is exactly representable in `f64`.
pub const MAX_ZOOM: u8 = 30;

/// Prefix shared by every cache key.
const KEY_PREFIX: &str = "tile_";

// =============================================================================
// Tile Index
// =============================================================================

/// Immutable `(zoom, x, y)` slippy-map tile coordinate.
///
/// Values built through [`TileIndex::new`] always satisfy `0 <= x, y < 2^zoom`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileIndex {
    /// Zoom level (0 = whole world in one tile)
    pub zoom: u8,

    /// Column, 0 at the antimeridian going east
    pub x: u32,

    /// Row, 0 at the north edge going south
    pub y: u32,
}

impl TileIndex {
    /// Create a tile index, validating it against the grid at `zoom`.
    pub fn new(zoom: u8, x: u32, y: u32) -> Result<Self, TileError> {
        let invalid = TileError::InvalidTile {
            zoom: zoom as u64,
            x: x as u64,
            y: y as u64,
        };

        if zoom > MAX_ZOOM {
            return Err(invalid);
        }

        let side = grid_size(zoom);
        if x as u64 >= side || y as u64 >= side {
            return Err(invalid);
        }

        Ok(Self { zoom, x, y })
    }

    /// Build a tile index from untrusted request coordinates.
    ///
    /// Accepts wide integers so that overflowing path segments are reported as
    /// invalid tiles rather than parse failures.
    pub fn from_request(zoom: u64, x: u64, y: u64) -> Result<Self, TileError> {
        let invalid = TileError::InvalidTile { zoom, x, y };

        let zoom = u8::try_from(zoom).map_err(|_| invalid.clone())?;
        let x = u32::try_from(x).map_err(|_| invalid.clone())?;
        let y = u32::try_from(y).map_err(|_| invalid)?;

        Self::new(zoom, x, y)
    }

    /// The cache key for this tile.
    pub fn key(&self) -> TileKey {
        TileKey::from(*self)
    }
}

impl fmt::Display for TileIndex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.zoom, self.x, self.y)
    }
}

/// Number of tiles along one side of the grid at `zoom` (`2^zoom`).
#[inline]
pub fn grid_size(zoom: u8) -> u64 {
    1u64 << zoom
}

// =============================================================================
// Tile Key
// =============================================================================

/// Deterministic cache key for a tile, encoded as `tile_{x}_{y}_{z}`.
///
/// Keys can only be built from a valid [`TileIndex`] or by parsing a string
/// that decodes to one, so every key maps back to exactly one tile.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TileKey(String);

impl TileKey {
    /// Parse and validate an encoded key.
    ///
    /// The result is the canonical encoding, so `tile_010_12_5` parses to the
    /// same key as `tile_10_12_5`.
    pub fn parse(encoded: &str) -> Result<Self, KeyError> {
        Ok(decode(encoded)?.key())
    }

    /// Decode the key back into its tile index.
    pub fn tile_index(&self) -> Result<TileIndex, KeyError> {
        decode(&self.0)
    }

    /// The encoded key.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<TileIndex> for TileKey {
    fn from(tile: TileIndex) -> Self {
        Self(format!("{}{}_{}_{}", KEY_PREFIX, tile.x, tile.y, tile.zoom))
    }
}

impl FromStr for TileKey {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for TileKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for TileKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

fn decode(encoded: &str) -> Result<TileIndex, KeyError> {
    let malformed = || KeyError::Malformed(encoded.to_string());

    let rest = encoded.strip_prefix(KEY_PREFIX).ok_or_else(malformed)?;
    let mut parts = rest.split('_');

    let x = parse_part(parts.next()).ok_or_else(malformed)?;
    let y = parse_part(parts.next()).ok_or_else(malformed)?;
    let zoom = parse_part(parts.next()).ok_or_else(malformed)?;
    if parts.next().is_some() {
        return Err(malformed());
    }

    TileIndex::from_request(zoom, x, y).map_err(|_| KeyError::OutOfRange(encoded.to_string()))
}

// Digits only, so "+1" or "" never sneak through u64::from_str.
fn parse_part(part: Option<&str>) -> Option<u64> {
    let part = part?;
    if part.is_empty() || !part.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    part.parse().ok()
}

// =============================================================================
// Tests
// =============================================================================
