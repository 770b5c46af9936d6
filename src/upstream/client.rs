//! reqwest-backed upstream fetcher.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, trace};

use crate::error::UpstreamError;
use crate::tile::TileIndex;

use super::{MirrorSet, UpstreamFetcher};

/// Identifying client header sent with every upstream request.
///
/// Public tile providers (OpenStreetMap in particular) reject anonymous
/// clients; override it with a contact address for production use.
pub const DEFAULT_USER_AGENT: &str = concat!("osm-tile-cache/", env!("CARGO_PKG_VERSION"));

/// Default per-fetch timeout.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Fetches tiles over HTTP from a randomly chosen mirror.
#[derive(Clone)]
pub struct HttpTileFetcher {
    client: reqwest::Client,
    mirrors: MirrorSet,
    timeout: Duration,
}

impl HttpTileFetcher {
    /// Create a fetcher with the given mirrors, client header and timeout.
    pub fn new(
        mirrors: MirrorSet,
        user_agent: &str,
        timeout: Duration,
    ) -> Result<Self, UpstreamError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .build()
            .map_err(|e| UpstreamError::Client(e.to_string()))?;

        Ok(Self {
            client,
            mirrors,
            timeout,
        })
    }

    /// Create a fetcher for the OpenStreetMap mirrors with default settings.
    pub fn openstreetmap() -> Result<Self, UpstreamError> {
        Self::new(
            MirrorSet::openstreetmap(),
            DEFAULT_USER_AGENT,
            DEFAULT_FETCH_TIMEOUT,
        )
    }

    pub fn mirrors(&self) -> &MirrorSet {
        &self.mirrors
    }

    fn request_error(&self, url: &str, err: reqwest::Error) -> UpstreamError {
        if err.is_timeout() {
            UpstreamError::Timeout {
                millis: self.timeout.as_millis() as u64,
            }
        } else {
            UpstreamError::Request {
                url: url.to_string(),
                message: err.to_string(),
            }
        }
    }
}

#[async_trait]
impl UpstreamFetcher for HttpTileFetcher {
    async fn fetch(&self, tile: TileIndex) -> Result<Bytes, UpstreamError> {
        let url = self.mirrors.choose().url_for(tile);
        trace!(tile = %tile, url = %url, "Fetching upstream tile");

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| self.request_error(&url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpstreamError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| self.request_error(&url, e))?;

        debug!(tile = %tile, bytes = body.len(), "Fetched upstream tile");
        Ok(body)
    }
}
