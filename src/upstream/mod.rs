//! Upstream tile provider.
//!
//! The [`UpstreamFetcher`] trait is the seam between the cache logic and the
//! network. [`HttpTileFetcher`] is the production implementation; tests plug in
//! fakes that count calls or inject failures.

mod client;
mod mirrors;

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::UpstreamError;
use crate::tile::TileIndex;

pub use client::{HttpTileFetcher, DEFAULT_FETCH_TIMEOUT, DEFAULT_USER_AGENT};
pub use mirrors::{Mirror, MirrorSet, DEFAULT_MIRRORS};

/// Source of truth for tile bytes.
///
/// Implementations must be safe for concurrent use by many tasks.
#[async_trait]
pub trait UpstreamFetcher: Send + Sync {
    /// Fetch the raw bytes of one tile.
    async fn fetch(&self, tile: TileIndex) -> Result<Bytes, UpstreamError>;
}

/// Fetch a tile, failing with [`UpstreamError::Timeout`] if `timeout` elapses.
///
/// A timed-out fetch is an ordinary fetch failure; it is never retried here.
pub async fn fetch_with_timeout<F>(
    fetcher: &F,
    tile: TileIndex,
    timeout: Duration,
) -> Result<Bytes, UpstreamError>
where
    F: UpstreamFetcher + ?Sized,
{
    match tokio::time::timeout(timeout, fetcher.fetch(tile)).await {
        Ok(result) => result,
        Err(_) => Err(UpstreamError::Timeout {
            millis: timeout.as_millis() as u64,
        }),
    }
}
