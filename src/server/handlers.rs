//! HTTP request handlers for the tile cache.
//!
//! # Endpoints
//!
//! - `GET /{z}/{x}/{y}.png` - Serve a tile (read-through)
//! - `GET /health` - Health check endpoint
//! - `GET /stats` - Service counters

use std::sync::Arc;

use axum::{
    body::Body,
    extract::{Path, State},
    http::{header, HeaderName, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{TileError, UpstreamError};
use crate::store::CacheStore;
use crate::tile::{StatsSnapshot, TileIndex, TileService};
use crate::upstream::UpstreamFetcher;

/// Default `Cache-Control` max-age for served tiles (1 hour).
pub const DEFAULT_CACHE_MAX_AGE: u32 = 3600;

/// Header reporting whether the tile came from the store.
pub const TILE_CACHE_HIT_HEADER: HeaderName = HeaderName::from_static("x-tile-cache-hit");

// =============================================================================
// Application State
// =============================================================================

/// Shared application state containing the tile service.
pub struct AppState<S: CacheStore, F: UpstreamFetcher> {
    pub tile_service: Arc<TileService<S, F>>,

    /// Cache-Control max-age in seconds
    pub cache_max_age: u32,
}

impl<S: CacheStore, F: UpstreamFetcher> AppState<S, F> {
    pub fn new(tile_service: TileService<S, F>) -> Self {
        Self::with_cache_max_age(tile_service, DEFAULT_CACHE_MAX_AGE)
    }

    pub fn with_cache_max_age(tile_service: TileService<S, F>, cache_max_age: u32) -> Self {
        Self {
            tile_service: Arc::new(tile_service),
            cache_max_age,
        }
    }
}

impl<S: CacheStore, F: UpstreamFetcher> Clone for AppState<S, F> {
    fn clone(&self) -> Self {
        Self {
            tile_service: Arc::clone(&self.tile_service),
            cache_max_age: self.cache_max_age,
        }
    }
}

// =============================================================================
// Request Parameters
// =============================================================================

/// Path parameters for tile requests.
///
/// Extracted from `/{z}/{x}/{filename}` where filename is `{y}` or `{y}.png`.
#[derive(Debug, Deserialize)]
pub struct TilePathParams {
    pub z: String,
    pub x: String,
    pub filename: String,
}

impl TilePathParams {
    /// Parse the path into a validated tile index.
    pub fn tile(&self) -> Result<TileIndex, HandlerError> {
        let y = self.filename.strip_suffix(".png").unwrap_or(&self.filename);

        let z = parse_coordinate("z", &self.z)?;
        let x = parse_coordinate("x", &self.x)?;
        let y = parse_coordinate("y", y)?;

        Ok(TileIndex::from_request(z, x, y)?)
    }
}

fn parse_coordinate(name: &str, value: &str) -> Result<u64, HandlerError> {
    if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
        return Err(HandlerError::BadPath(format!(
            "{} must be a non-negative integer, got {:?}",
            name, value
        )));
    }
    // Digits that overflow u64 are still out of any grid
    Ok(value.parse().unwrap_or(u64::MAX))
}

// =============================================================================
// Response Types
// =============================================================================

/// JSON error response returned for all error conditions.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    /// Error type identifier (e.g., "tile_unavailable", "invalid_tile")
    pub error: String,

    /// Human-readable error message
    pub message: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: None,
        }
    }

    pub fn with_status(
        error: impl Into<String>,
        message: impl Into<String>,
        status: StatusCode,
    ) -> Self {
        Self {
            error: error.into(),
            message: message.into(),
            status: Some(status.as_u16()),
        }
    }
}

/// Health check response.
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
}

/// Response from the stats endpoint.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    /// Whether concurrent misses share one upstream fetch
    pub single_flight: bool,

    #[serde(flatten)]
    pub counters: StatsSnapshot,
}

// =============================================================================
// Error Mapping
// =============================================================================

/// Convert TileError to HTTP response.
///
/// Any upstream failure (missing tile, bad status, unreachable, timeout) is a
/// 404; out-of-grid coordinates are a 400.
impl IntoResponse for TileError {
    fn into_response(self) -> Response {
        let (status, error_type) = match &self {
            TileError::InvalidTile { .. } => (StatusCode::BAD_REQUEST, "invalid_tile"),
            TileError::Upstream(UpstreamError::Timeout { .. }) => {
                (StatusCode::NOT_FOUND, "upstream_timeout")
            }
            TileError::Upstream(_) => (StatusCode::NOT_FOUND, "tile_unavailable"),
        };
        let message = self.to_string();

        if status == StatusCode::NOT_FOUND {
            debug!(
                error_type = error_type,
                status = status.as_u16(),
                "Tile not served: {}",
                message
            );
        } else {
            warn!(
                error_type = error_type,
                status = status.as_u16(),
                "Client error: {}",
                message
            );
        }

        let error_response = ErrorResponse::with_status(error_type, message, status);
        (status, Json(error_response)).into_response()
    }
}

/// Errors a tile handler can return.
#[derive(Debug)]
pub enum HandlerError {
    /// Path segments that are not tile coordinates at all
    BadPath(String),

    Tile(TileError),
}

impl IntoResponse for HandlerError {
    fn into_response(self) -> Response {
        match self {
            HandlerError::Tile(err) => err.into_response(),
            HandlerError::BadPath(message) => {
                warn!(status = 400, "Bad tile path: {}", message);
                let status = StatusCode::BAD_REQUEST;
                let body = ErrorResponse::with_status("invalid_path", message, status);
                (status, Json(body)).into_response()
            }
        }
    }
}

impl From<TileError> for HandlerError {
    fn from(err: TileError) -> Self {
        HandlerError::Tile(err)
    }
}

// =============================================================================
// Handlers
// =============================================================================

/// Handle tile requests.
///
/// # Endpoint
///
/// `GET /{z}/{x}/{y}.png` (the `.png` suffix is optional)
///
/// # Response
///
/// - `200 OK`: Tile bytes exactly as stored or fetched
/// - `400 Bad Request`: Non-numeric coordinates or a tile outside the grid
/// - `404 Not Found`: Tile not cached and upstream fetch failed
///
/// # Headers
///
/// - `Content-Type: image/png`
/// - `Cache-Control: public, max-age={cache_max_age}`
/// - `X-Tile-Cache-Hit: true|false`
pub async fn tile_handler<S, F>(
    State(state): State<AppState<S, F>>,
    Path(params): Path<TilePathParams>,
) -> Result<Response, HandlerError>
where
    S: CacheStore + 'static,
    F: UpstreamFetcher + 'static,
{
    let tile = params.tile()?;
    let response = state.tile_service.get_tile(tile).await?;

    let headers = [
        (header::CONTENT_TYPE, "image/png".to_string()),
        (
            header::CACHE_CONTROL,
            format!("public, max-age={}", state.cache_max_age),
        ),
        (TILE_CACHE_HIT_HEADER, response.cache_hit.to_string()),
    ];

    Ok((StatusCode::OK, headers, Body::from(response.data)).into_response())
}

/// Handle health check requests.
///
/// `200 OK` with `{"status": "healthy", "version": "..."}`.
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

/// Handle stats requests.
pub async fn stats_handler<S, F>(State(state): State<AppState<S, F>>) -> Json<StatsResponse>
where
    S: CacheStore + 'static,
    F: UpstreamFetcher + 'static,
{
    Json(StatsResponse {
        single_flight: state.tile_service.single_flight(),
        counters: state.tile_service.stats(),
    })
}

/// Fallback for unmatched routes.
pub async fn not_found_handler() -> Response {
    let status = StatusCode::NOT_FOUND;
    let body = ErrorResponse::with_status("not_found", "No such route", status);
    (status, Json(body)).into_response()
}
