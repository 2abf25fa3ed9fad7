//! Configuration schema for Archway
//!
//! Configuration is stored at `~/.config/archway/config.toml`

use crate::orchestration::docker::DEFAULT_BINARY;
use crate::orchestration::emulation::{default_helper_args, DEFAULT_HELPER_IMAGE, DEFAULT_HELPER_TAG};
use crate::orchestration::executor::DEFAULT_SOCKET;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default cache namespace
pub const DEFAULT_NAMESPACE: &str = "archway";

/// Root configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Container runtime settings
    pub runtime: RuntimeConfig,

    /// Emulation helper settings
    pub emulation: EmulationConfig,

    /// Image cache settings
    pub cache: CacheConfig,

    /// Run container defaults
    pub run: RunConfig,
}

/// General application settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Log format: "text" or "json"
    pub log_format: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_format: "text".to_string(),
        }
    }
}

/// Container runtime configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// docker or podman binary
    pub binary: String,

    /// Daemon control socket mounted into run containers
    pub socket: PathBuf,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            binary: DEFAULT_BINARY.to_string(),
            socket: PathBuf::from(DEFAULT_SOCKET),
        }
    }
}

/// Emulation helper configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmulationConfig {
    /// Helper image name
    pub image: String,

    /// Helper image tag
    pub tag: String,

    /// Arguments passed to the helper
    pub args: Vec<String>,
}

impl EmulationConfig {
    /// Full helper image reference
    pub fn reference(&self) -> String {
        format!("{}:{}", self.image, self.tag)
    }
}

impl Default for EmulationConfig {
    fn default() -> Self {
        Self {
            image: DEFAULT_HELPER_IMAGE.to_string(),
            tag: DEFAULT_HELPER_TAG.to_string(),
            args: default_helper_args(),
        }
    }
}

/// Image cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Key namespace, also the local tag prefix
    pub namespace: String,

    /// Snapshot directory for the local strategy
    pub dir: Option<PathBuf>,

    /// Repository for the registry strategy
    pub registry_image: Option<String>,

    /// Registry login name
    pub registry_user: Option<String>,

    /// Per-reference logins, used when no token is given on the command line
    pub credentials: Vec<CredentialRuleConfig>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            dir: None,
            registry_image: None,
            registry_user: None,
            credentials: Vec::new(),
        }
    }
}

/// A login applied to image references starting with `pattern`.
///
/// The secret never lives in the file; it is read from the environment
/// variable named by `token_env` at startup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialRuleConfig {
    pub pattern: String,
    pub username: String,
    pub token_env: String,
}

/// Run container defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Shell used for build scripts and run commands
    pub shell: String,

    /// Base image
    pub image: String,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            shell: "/bin/sh".to_string(),
            image: "alpine:latest".to_string(),
        }
    }
}
