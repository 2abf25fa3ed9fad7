//! Local snapshot cache
//!
//! Images are exported to `<dir>/<key>.tar` and the snapshot is handed
//! to a [`BlobStore`] so it survives the runtime instance.

use crate::cache::blob::BlobStore;
use crate::cache::key::CacheKey;
use crate::cache::CacheBackend;
use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::DaemonClient;
use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache strategy persisting exported image snapshots
pub struct LocalCache {
    daemon: Arc<dyn DaemonClient>,
    blobs: Arc<dyn BlobStore>,
    dir: PathBuf,
}

impl LocalCache {
    /// Create a local cache writing snapshots into `dir`
    pub fn new(daemon: Arc<dyn DaemonClient>, blobs: Arc<dyn BlobStore>, dir: PathBuf) -> Self {
        Self { daemon, blobs, dir }
    }

    /// Snapshot file for `key`
    pub fn snapshot_path(&self, key: &CacheKey) -> PathBuf {
        self.dir.join(format!("{}.tar", key))
    }
}

#[async_trait]
impl CacheBackend for LocalCache {
    async fn lookup(&self, key: &CacheKey) -> ArchwayResult<Option<String>> {
        let snapshot = self.snapshot_path(key);

        let hit = match self.blobs.restore(&[snapshot.clone()], &key.to_string()).await {
            Ok(hit) => hit,
            Err(e) => {
                warn!("Cache restore failed, treating as miss: {}", e);
                false
            }
        };

        if !hit {
            debug!("Local cache miss: {}", key);
            return Ok(None);
        }

        info!("Importing cached image {}", key);
        self.daemon.import_image(&snapshot).await?;
        Ok(Some(key.to_string()))
    }

    async fn store(&self, key: &CacheKey, image_id: &str) -> ArchwayResult<String> {
        let reference = key.to_string();
        let snapshot = self.snapshot_path(key);

        self.daemon.tag(image_id, &reference).await?;

        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            ArchwayError::io(format!("creating cache directory {}", self.dir.display()), e)
        })?;

        info!("Exporting {} to {}", reference, snapshot.display());
        self.daemon.export_image(&reference, &snapshot).await?;
        self.blobs.save(&[snapshot], &reference).await?;

        Ok(reference)
    }

    fn strategy_name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::blob::DirBlobStore;
    use crate::cache::key::derive_key;
    use crate::orchestration::testing::MockDaemon;
    use tempfile::TempDir;

    fn cache(daemon: &Arc<MockDaemon>, temp: &TempDir) -> LocalCache {
        LocalCache::new(
            daemon.clone(),
            Arc::new(DirBlobStore::new(temp.path().join("blobs"))),
            temp.path().join("images"),
        )
    }

    #[tokio::test]
    async fn empty_cache_misses_without_import() {
        let temp = TempDir::new().unwrap();
        let daemon = Arc::new(MockDaemon::new());
        let key = derive_key("ns", "FROM alpine", "echo hi");

        assert!(cache(&daemon, &temp).lookup(&key).await.unwrap().is_none());
        assert_eq!(daemon.count("import"), 0);
    }

    #[tokio::test]
    async fn store_tags_exports_and_saves() {
        let temp = TempDir::new().unwrap();
        let daemon = Arc::new(MockDaemon::new());
        let key = derive_key("ns", "FROM alpine", "echo hi");
        let cache = cache(&daemon, &temp);

        let reference = cache.store(&key, "sha256:built").await.unwrap();

        assert_eq!(reference, key.to_string());
        assert_eq!(
            daemon.calls(),
            vec![
                format!("tag sha256:built {}", key),
                format!("export {}", key),
            ]
        );
        assert!(temp.path().join("blobs").join(key.to_string()).is_dir());
    }

    #[tokio::test]
    async fn stored_image_is_found_by_fresh_instance() {
        let temp = TempDir::new().unwrap();
        let key = derive_key("ns", "FROM alpine", "echo hi");

        let first = Arc::new(MockDaemon::new());
        cache(&first, &temp).store(&key, "sha256:built").await.unwrap();
        std::fs::remove_dir_all(temp.path().join("images")).unwrap();

        let second = Arc::new(MockDaemon::new());
        let found = cache(&second, &temp).lookup(&key).await.unwrap();

        assert_eq!(found, Some(key.to_string()));
        assert_eq!(second.count("import"), 1);
    }

    #[tokio::test]
    async fn export_failure_propagates() {
        let temp = TempDir::new().unwrap();
        let daemon = Arc::new(MockDaemon::new().fail_export());
        let key = derive_key("ns", "FROM alpine", "echo hi");

        let err = cache(&daemon, &temp).store(&key, "sha256:built").await.unwrap_err();
        assert!(matches!(err, ArchwayError::ImageExport { .. }));
    }
}
