//! Cache key derivation
//!
//! A build's cache key is a digest of everything that determines the
//! resulting image: the synthesized build file and the user's script,
//! scoped by a namespace. The key doubles as the image tag.

use crate::error::{ArchwayError, ArchwayResult};
use sha2::{Digest, Sha256};
use std::fmt;

/// Bump whenever the archive layout or build file template changes.
/// Every previously stored cache entry becomes unreachable.
pub const CACHE_FORMAT_VERSION: &str = "archway-cache-v1";

/// Hex characters kept from the digest
pub const DIGEST_HEX_LEN: usize = 40;

/// Content-addressed key identifying a build's output
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    namespace: String,
    digest: String,
}

impl CacheKey {
    /// The namespace prefix
    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// The hex digest without the namespace
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.namespace, self.digest)
    }
}

/// Derive the cache key for a build.
///
/// Inputs are fed into one running SHA-256 in a fixed order with no
/// separators; the first 20 bytes are hex encoded.
pub fn derive_key(namespace: &str, build_file: &str, script: &str) -> CacheKey {
    let mut hasher = Sha256::new();
    hasher.update(CACHE_FORMAT_VERSION.as_bytes());
    hasher.update(namespace.as_bytes());
    hasher.update(build_file.as_bytes());
    hasher.update(script.as_bytes());
    let result = hasher.finalize();

    CacheKey {
        namespace: namespace.to_string(),
        digest: hex::encode(&result[..DIGEST_HEX_LEN / 2]),
    }
}

/// Check that a namespace produces a usable image reference
pub fn validate_namespace(namespace: &str) -> ArchwayResult<()> {
    if namespace.is_empty() {
        return Err(ArchwayError::invalid_setting("namespace", "must not be empty"));
    }

    let valid = namespace
        .chars()
        .all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || matches!(c, '-' | '_' | '.'));
    if !valid || !namespace.starts_with(|c: char| c.is_ascii_alphanumeric()) {
        return Err(ArchwayError::invalid_setting(
            "namespace",
            format!(
                "'{}' must start with a lowercase letter or digit and contain only [a-z0-9._-]",
                namespace
            ),
        ));
    }

    Ok(())
}
