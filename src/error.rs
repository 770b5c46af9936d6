use thiserror::Error;

/// Errors from projecting geographic coordinates onto the tile grid.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ProjectionError {
    /// Latitude is non-finite or beyond the square Mercator world
    #[error("Invalid latitude: {0} (must be between -85.0511 and 85.0511)")]
    InvalidLatitude(f64),

    /// Longitude is non-finite or outside [-180, 180]
    #[error("Invalid longitude: {0} (must be between -180 and 180)")]
    InvalidLongitude(f64),

    /// Zoom level exceeds the supported maximum
    #[error("Invalid zoom: {zoom} (maximum is {max})")]
    InvalidZoom { zoom: u8, max: u8 },
}

/// Errors talking to the cache store.
///
/// These are always recovered locally: a failed read is a cache miss and a
/// failed write leaves the tile to be fetched again later.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// The store could not be reached or answered with an error
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Local I/O failure in a filesystem-backed store
    #[error("Store I/O error: {0}")]
    Io(String),

    /// A key could not be mapped to a storage location
    #[error("Invalid store key: {0}")]
    InvalidKey(#[from] KeyError),

    /// Some writes of a batch failed; the rest were persisted
    #[error("{failed} of {total} batch writes failed, last error: {message}")]
    Partial {
        failed: usize,
        total: usize,
        message: String,
    },
}

impl StoreError {
    /// How many of a `total`-pair batch this error left unwritten.
    pub fn unwritten(&self, total: usize) -> usize {
        match self {
            StoreError::Partial { failed, .. } => (*failed).min(total),
            _ => total,
        }
    }
}

impl From<std::io::Error> for StoreError {
    fn from(err: std::io::Error) -> Self {
        StoreError::Io(err.to_string())
    }
}

/// Errors fetching a tile from the upstream provider.
#[derive(Debug, Clone, Error)]
pub enum UpstreamError {
    /// Transport-level failure (DNS, connect, TLS, body read)
    #[error("Upstream request to {url} failed: {message}")]
    Request { url: String, message: String },

    /// Upstream answered with a non-success status
    #[error("Upstream returned HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    /// The fetch did not complete within the per-call timeout
    #[error("Upstream fetch timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The HTTP client could not be constructed
    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    /// A mirror URL template is missing a placeholder or the set is empty
    #[error("Invalid mirror template: {0}")]
    InvalidTemplate(String),
}

/// A pipelined batch write that failed; its pairs are discarded.
#[derive(Debug, Clone, Error)]
#[error("Failed to flush {count} tiles: {source}")]
pub struct BatchFlushError {
    /// Number of pairs left unwritten
    pub count: usize,

    /// Underlying store failure
    #[source]
    pub source: StoreError,
}

/// Errors decoding a cache key back into a tile index.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum KeyError {
    /// The key does not have the `tile_{x}_{y}_{z}` shape
    #[error("Malformed tile key: {0}")]
    Malformed(String),

    /// The key decodes to a triple outside the tile grid
    #[error("Tile key {0} is outside the tile grid")]
    OutOfRange(String),
}

/// Errors surfaced by the read-through tile service.
#[derive(Debug, Clone, Error)]
pub enum TileError {
    /// Coordinates are outside the `2^zoom x 2^zoom` grid (or zoom is too high)
    #[error("Invalid tile {zoom}/{x}/{y}")]
    InvalidTile { zoom: u64, x: u64, y: u64 },

    /// The tile is not cached and could not be fetched
    #[error("Tile unavailable: {0}")]
    Upstream(#[from] UpstreamError),
}
