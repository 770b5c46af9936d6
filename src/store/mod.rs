//! Cache store collaborators.
//!
//! The core only needs three operations from a store: read one key, write one
//! key, and write a batch of keys in a single round-trip. Writes are
//! unconditional and idempotent on key; nothing expires.
//!
//! # Implementations
//!
//! - [`MemoryStore`]: process-local LRU bounded by total byte size
//! - [`DiskStore`]: persistent directory tree, shared between a `prefetch`
//!   run and a later `serve` process

mod disk;
mod memory;

use async_trait::async_trait;
use bytes::Bytes;

use crate::error::StoreError;
use crate::tile::TileKey;

pub use disk::DiskStore;
pub use memory::{MemoryStore, DEFAULT_MEMORY_CAPACITY};

/// Key-value store holding encoded tiles.
///
/// Implementations must be safe for concurrent use by many tasks.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Read a tile. `Ok(None)` means the key is absent.
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError>;

    /// Write a single tile.
    async fn set(&self, key: &TileKey, value: Bytes) -> Result<(), StoreError>;

    /// Write a batch of tiles in one round-trip.
    async fn set_many(&self, entries: Vec<(TileKey, Bytes)>) -> Result<(), StoreError>;
}
