//! Configuration management for Archway

pub mod schema;

pub use schema::Config;

use crate::error::{ArchwayError, ArchwayResult};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

/// Registry host used for the default cache image
pub const DEFAULT_CACHE_REGISTRY: &str = "ghcr.io";

/// Configuration manager
pub struct ConfigManager {
    config_path: PathBuf,
}

impl ConfigManager {
    /// Create a new config manager with default path
    pub fn new() -> Self {
        Self {
            config_path: Self::default_config_path(),
        }
    }

    /// Create a config manager with a custom path
    pub fn with_path(path: PathBuf) -> Self {
        Self { config_path: path }
    }

    /// Get the default config file path
    pub fn default_config_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("archway")
            .join("config.toml")
    }

    /// Get the state directory path
    pub fn state_dir() -> PathBuf {
        dirs::state_dir()
            .or_else(dirs::data_local_dir)
            .unwrap_or_else(|| PathBuf::from("."))
            .join("archway")
    }

    /// One-shot setup markers
    pub fn markers_dir() -> PathBuf {
        Self::state_dir().join("markers")
    }

    /// Blob store root
    pub fn blobs_dir() -> PathBuf {
        Self::state_dir().join("blobs")
    }

    /// Default local snapshot directory
    pub fn images_dir() -> PathBuf {
        Self::state_dir().join("images")
    }

    /// Load configuration, falling back to defaults when the file is missing
    pub async fn load(&self) -> ArchwayResult<Config> {
        if !self.config_path.exists() {
            debug!("Config file not found, using defaults");
            return Ok(Config::default());
        }

        self.load_from_file(&self.config_path).await
    }

    /// Load configuration from a specific file
    pub async fn load_from_file(&self, path: &Path) -> ArchwayResult<Config> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|e| ArchwayError::io(format!("reading config from {}", path.display()), e))?;

        toml::from_str(&content).map_err(|e| ArchwayError::ConfigInvalid {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Save configuration to file
    pub async fn save(&self, config: &Config) -> ArchwayResult<()> {
        self.ensure_config_dir().await?;

        let content = toml::to_string_pretty(config)?;
        fs::write(&self.config_path, content).await.map_err(|e| {
            ArchwayError::io(
                format!("writing config to {}", self.config_path.display()),
                e,
            )
        })?;

        info!("Configuration saved to {}", self.config_path.display());
        Ok(())
    }

    /// Ensure the config directory exists
    async fn ensure_config_dir(&self) -> ArchwayResult<()> {
        if let Some(parent) = self.config_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| ArchwayError::ConfigDirCreate {
                    path: parent.to_path_buf(),
                    source: e,
                })?;
        }
        Ok(())
    }

    /// Ensure all state directories exist
    pub async fn ensure_state_dirs() -> ArchwayResult<()> {
        let dirs = [
            Self::state_dir(),
            Self::markers_dir(),
            Self::blobs_dir(),
            Self::images_dir(),
        ];

        for dir in &dirs {
            fs::create_dir_all(dir).await.map_err(|e| {
                ArchwayError::io(format!("creating directory {}", dir.display()), e)
            })?;
        }

        Ok(())
    }

    /// Get the config file path
    pub fn path(&self) -> &Path {
        &self.config_path
    }
}

impl Default for ConfigManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Which cache strategy an invocation uses
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CacheSelection {
    /// Export snapshots into `dir`
    Local { dir: PathBuf },
    /// Push to and pull from `repository`
    Registry { repository: String },
}

/// Inputs that decide the cache strategy
#[derive(Debug, Clone, Default)]
pub struct CacheInputs<'a> {
    /// Explicitly configured snapshot directory
    pub dir: Option<&'a Path>,
    /// Explicitly configured cache image
    pub image: Option<&'a str>,
    /// `owner/repo` of the surrounding CI run
    pub repository: Option<&'a str>,
    /// A registry token was supplied
    pub has_token: bool,
}

/// Default cache image for a CI repository
pub fn default_cache_image(repository: &str) -> String {
    format!(
        "{}/{}/archway-cache",
        DEFAULT_CACHE_REGISTRY,
        repository.to_lowercase()
    )
}

/// Pick the cache strategy.
///
/// A cache image selects the registry, otherwise snapshots go to the
/// explicit directory or `default_dir`. With no explicit image, a CI
/// repository plus a token implies the repository's default cache image.
/// Setting both an explicit directory and an image is rejected.
pub fn select_cache(
    inputs: &CacheInputs<'_>,
    default_dir: PathBuf,
    config_path: &Path,
) -> ArchwayResult<CacheSelection> {
    if let (Some(dir), Some(image)) = (inputs.dir, inputs.image) {
        return Err(ArchwayError::ConfigInvalid {
            path: config_path.to_path_buf(),
            reason: format!(
                "cache dir {} and cache image {} are mutually exclusive",
                dir.display(),
                image
            ),
        });
    }

    if let Some(image) = inputs.image {
        return Ok(CacheSelection::Registry {
            repository: image.to_string(),
        });
    }

    if let Some(dir) = inputs.dir {
        return Ok(CacheSelection::Local {
            dir: dir.to_path_buf(),
        });
    }

    match inputs.repository {
        Some(repository) if inputs.has_token && !repository.is_empty() => {
            Ok(CacheSelection::Registry {
                repository: default_cache_image(repository),
            })
        }
        _ => Ok(CacheSelection::Local { dir: default_dir }),
    }
}
