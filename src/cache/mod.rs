//! Content-addressed image cache
//!
//! Built images are stored under their cache key so a later invocation
//! with identical inputs can skip the build.
//!
//! # Strategies
//!
//! | Strategy | Lookup | Store |
//! |----------|--------|-------|
//! | Local | restore snapshot from blob store, import | tag, export snapshot, save to blob store |
//! | Registry | pull `<repository>:<key>` | tag, push |
//!
//! The two strategies are mutually exclusive; configuration picks one.

pub mod blob;
pub mod key;
pub mod local;
pub mod registry;

pub use blob::{BlobStore, DirBlobStore};
pub use key::{derive_key, validate_namespace, CacheKey, CACHE_FORMAT_VERSION};
pub use local::LocalCache;
pub use registry::RegistryCache;

use crate::error::ArchwayResult;
use async_trait::async_trait;

/// Persistence for built images, keyed by [`CacheKey`]
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Return a runnable image reference for `key`, or `None` on a miss
    async fn lookup(&self, key: &CacheKey) -> ArchwayResult<Option<String>>;

    /// Persist a freshly built image and return its cached reference
    async fn store(&self, key: &CacheKey, image_id: &str) -> ArchwayResult<String>;

    /// Strategy name for display
    fn strategy_name(&self) -> &'static str;
}
