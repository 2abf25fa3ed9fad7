//! Registry cache
//!
//! Images are pushed to `<repository>:<key>` and pulled back on later
//! runs. A failed pull is a miss, never an error.

use crate::cache::key::CacheKey;
use crate::cache::CacheBackend;
use crate::credentials::RegistryCredentials;
use crate::error::ArchwayResult;
use crate::orchestration::DaemonClient;
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Cache strategy backed by a remote image registry
pub struct RegistryCache {
    daemon: Arc<dyn DaemonClient>,
    repository: String,
    credentials: RegistryCredentials,
}

impl RegistryCache {
    /// Create a registry cache pushing to `repository`
    pub fn new(
        daemon: Arc<dyn DaemonClient>,
        repository: impl Into<String>,
        credentials: RegistryCredentials,
    ) -> Self {
        Self {
            daemon,
            repository: repository.into(),
            credentials,
        }
    }

    /// Full image reference for `key`
    pub fn reference(&self, key: &CacheKey) -> String {
        format!("{}:{}", self.repository, key)
    }

    async fn login_for(&self, reference: &str) -> ArchwayResult<()> {
        if let Some((registry, credential)) = self.credentials.select(reference) {
            debug!("Logging in to {} as {}", registry, credential.username);
            self.daemon.login(&registry, credential).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl CacheBackend for RegistryCache {
    async fn lookup(&self, key: &CacheKey) -> ArchwayResult<Option<String>> {
        let reference = self.reference(key);

        if let Err(e) = self.login_for(&reference).await {
            warn!("Registry login failed, treating as cache miss: {}", e);
            return Ok(None);
        }

        match self.daemon.pull_image(&reference).await {
            Ok(()) => {
                info!("Pulled cached image {}", reference);
                Ok(Some(reference))
            }
            Err(e) => {
                warn!("Cache pull failed, building instead: {}", e);
                Ok(None)
            }
        }
    }

    async fn store(&self, key: &CacheKey, image_id: &str) -> ArchwayResult<String> {
        let reference = self.reference(key);

        self.daemon.tag(image_id, &reference).await?;
        self.login_for(&reference).await?;

        info!("Pushing {}", reference);
        self.daemon.push_image(&reference).await?;

        Ok(reference)
    }

    fn strategy_name(&self) -> &'static str {
        "registry"
    }
}
