//! Filesystem-backed tile store.
//!
//! Tiles are laid out as `{root}/{z}/{x}/{key}.png` so directories stay small
//! at high zoom. Writes go to a temporary sibling file and are renamed into
//! place, so readers never observe a partially written tile.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use bytes::Bytes;
use tokio::fs;
use tracing::debug;

use crate::error::StoreError;
use crate::tile::TileKey;

use super::CacheStore;

/// Persistent [`CacheStore`] rooted at a directory.
#[derive(Debug, Clone)]
pub struct DiskStore {
    root: PathBuf,
}

impl DiskStore {
    /// Open a store at `root`, creating the directory if needed.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let root = root.into();
        fs::create_dir_all(&root).await.map_err(|e| {
            StoreError::Unavailable(format!("cannot create {}: {}", root.display(), e))
        })?;
        Ok(Self { root })
    }

    /// Root directory of the store.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File path a key is stored at.
    pub fn path_for(&self, key: &TileKey) -> Result<PathBuf, StoreError> {
        let tile = key.tile_index()?;
        Ok(self
            .root
            .join(tile.zoom.to_string())
            .join(tile.x.to_string())
            .join(format!("{}.png", key)))
    }

    async fn write(&self, key: &TileKey, value: &[u8]) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        // Unique per writer so two concurrent fills of one key cannot interleave
        let tmp = path.with_extension(format!("tmp-{:016x}", rand::random::<u64>()));
        if let Err(e) = fs::write(&tmp, value).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        if let Err(e) = fs::rename(&tmp, &path).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }
        Ok(())
    }
}

#[async_trait]
impl CacheStore for DiskStore {
    async fn get(&self, key: &TileKey) -> Result<Option<Bytes>, StoreError> {
        let path = self.path_for(key)?;
        match fs::read(&path).await {
            Ok(data) => Ok(Some(Bytes::from(data))),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn set(&self, key: &TileKey, value: Bytes) -> Result<(), StoreError> {
        self.write(key, &value).await
    }

    async fn set_many(&self, entries: Vec<(TileKey, Bytes)>) -> Result<(), StoreError> {
        let total = entries.len();
        let mut failed = 0;
        let mut last_error = None;

        for (key, value) in &entries {
            if let Err(e) = self.write(key, value).await {
                debug!(key = %key, error = %e, "Disk write failed");
                failed += 1;
                last_error = Some(e);
            }
        }

        match last_error {
            None => Ok(()),
            Some(e) => Err(StoreError::Partial {
                failed,
                total,
                message: e.to_string(),
            }),
        }
    }
}
