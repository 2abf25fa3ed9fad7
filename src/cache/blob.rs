//! Blob store for local image snapshots
//!
//! A key-addressed store of files, modelled on CI cache services:
//! `save` captures a set of paths under a key and `restore` puts them
//! back. The directory-backed store keeps blobs under `<root>/<key>/`.

use crate::error::{ArchwayError, ArchwayResult};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

/// Key-addressed persistence for snapshot files
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Restore `paths` saved under `key`. Returns `false` on a miss.
    async fn restore(&self, paths: &[PathBuf], key: &str) -> ArchwayResult<bool>;

    /// Save `paths` under `key`
    async fn save(&self, paths: &[PathBuf], key: &str) -> ArchwayResult<()>;
}

/// Blob store backed by a local directory
#[derive(Debug, Clone)]
pub struct DirBlobStore {
    root: PathBuf,
}

impl DirBlobStore {
    /// Create a store rooted at `root` (created on first save)
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Directory holding the blobs for `key`
    pub fn key_dir(&self, key: &str) -> PathBuf {
        self.root.join(key)
    }

    fn blob_path(&self, key: &str, path: &Path) -> ArchwayResult<PathBuf> {
        let name = path.file_name().ok_or_else(|| ArchwayError::BlobStore {
            key: key.to_string(),
            reason: format!("{} has no file name", path.display()),
        })?;
        Ok(self.key_dir(key).join(name))
    }
}

#[async_trait]
impl BlobStore for DirBlobStore {
    async fn restore(&self, paths: &[PathBuf], key: &str) -> ArchwayResult<bool> {
        let mut blobs = Vec::with_capacity(paths.len());
        for path in paths {
            let blob = self.blob_path(key, path)?;
            if !blob.is_file() {
                debug!("Blob miss for {}: {}", key, blob.display());
                return Ok(false);
            }
            blobs.push((blob, path));
        }

        for (blob, path) in blobs {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent).await.map_err(|e| {
                    ArchwayError::io(format!("creating directory {}", parent.display()), e)
                })?;
            }
            fs::copy(&blob, path).await.map_err(|e| {
                ArchwayError::io(format!("restoring {} from blob store", path.display()), e)
            })?;
        }

        debug!("Restored {} blob(s) for {}", paths.len(), key);
        Ok(true)
    }

    async fn save(&self, paths: &[PathBuf], key: &str) -> ArchwayResult<()> {
        let dir = self.key_dir(key);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| ArchwayError::io(format!("creating directory {}", dir.display()), e))?;

        for path in paths {
            let blob = self.blob_path(key, path)?;
            fs::copy(path, &blob).await.map_err(|e| ArchwayError::BlobStore {
                key: key.to_string(),
                reason: format!("copying {}: {}", path.display(), e),
            })?;
        }

        debug!("Saved {} blob(s) under {}", paths.len(), key);
        Ok(())
    }
}
