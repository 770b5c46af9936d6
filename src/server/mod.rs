//! HTTP server layer.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                         HTTP Layer                              │
//! │                   GET /{z}/{x}/{y}.png                          │
//! │                                                                 │
//! │  ┌──────────────────────────┐  ┌─────────────────────────────┐  │
//! │  │        handlers          │  │           routes            │  │
//! │  │ (path parsing, errors)   │  │ (router config, CORS, trace)│  │
//! │  └──────────────────────────┘  └─────────────────────────────┘  │
//! └────────────────────────────────┬────────────────────────────────┘
//!                                  ▼
//!                             TileService
//! ```

pub mod handlers;
pub mod routes;

pub use handlers::{
    health_handler, stats_handler, tile_handler, AppState, ErrorResponse, HandlerError,
    HealthResponse, StatsResponse, TilePathParams, DEFAULT_CACHE_MAX_AGE,
};
pub use routes::{create_router, RouterConfig};
