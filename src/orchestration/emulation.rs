//! Emulation registration
//!
//! Registers foreign-architecture binary handlers with the host kernel
//! by running a privileged helper container once. A marker in a
//! [`StateStore`] makes later invocations a no-op.

use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::daemon::{ContainerSpec, DaemonClient};
use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;
use tracing::{debug, info};

/// Default helper image installing the emulation handlers
pub const DEFAULT_HELPER_IMAGE: &str = "multiarch/qemu-user-static";

/// Default helper image tag
pub const DEFAULT_HELPER_TAG: &str = "latest";

/// Marker recording a completed registration
pub const EMULATION_MARKER: &str = "emulation-registered";

/// Helper arguments: reset existing handlers, install persistently
pub fn default_helper_args() -> Vec<String> {
    ["--reset", "-p", "yes"].iter().map(|s| s.to_string()).collect()
}

/// Persistence for one-shot setup markers
pub trait StateStore: Send + Sync {
    fn has_marker(&self, key: &str) -> ArchwayResult<bool>;
    fn set_marker(&self, key: &str) -> ArchwayResult<()>;
}

/// Markers stored as zero-byte files in a directory
#[derive(Debug, Clone)]
pub struct FileStateStore {
    dir: PathBuf,
}

impl FileStateStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// File backing `key`
    pub fn marker_path(&self, key: &str) -> PathBuf {
        self.dir.join(key)
    }
}

impl StateStore for FileStateStore {
    fn has_marker(&self, key: &str) -> ArchwayResult<bool> {
        Ok(self.marker_path(key).is_file())
    }

    fn set_marker(&self, key: &str) -> ArchwayResult<()> {
        fs::create_dir_all(&self.dir).map_err(|e| {
            ArchwayError::io(format!("creating marker directory {}", self.dir.display()), e)
        })?;
        let path = self.marker_path(key);
        fs::write(&path, b"")
            .map_err(|e| ArchwayError::io(format!("writing marker {}", path.display()), e))
    }
}

/// Markers kept in memory, for tests and throwaway runs
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    markers: Mutex<HashSet<String>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStateStore {
    fn has_marker(&self, key: &str) -> ArchwayResult<bool> {
        let markers = self
            .markers
            .lock()
            .map_err(|_| ArchwayError::Internal("marker store poisoned".to_string()))?;
        Ok(markers.contains(key))
    }

    fn set_marker(&self, key: &str) -> ArchwayResult<()> {
        let mut markers = self
            .markers
            .lock()
            .map_err(|_| ArchwayError::Internal("marker store poisoned".to_string()))?;
        markers.insert(key.to_string());
        Ok(())
    }
}

/// Registers multi-architecture support with the container runtime
pub struct EmulationRegistrar<'a> {
    daemon: &'a dyn DaemonClient,
    store: &'a dyn StateStore,
    image: String,
    args: Vec<String>,
}

impl<'a> EmulationRegistrar<'a> {
    /// Create a registrar using the default helper image
    pub fn new(daemon: &'a dyn DaemonClient, store: &'a dyn StateStore) -> Self {
        Self {
            daemon,
            store,
            image: format!("{}:{}", DEFAULT_HELPER_IMAGE, DEFAULT_HELPER_TAG),
            args: default_helper_args(),
        }
    }

    /// Use a different helper image reference
    pub fn with_image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Use different helper arguments
    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Register emulation unless the marker says it is already done
    pub async fn ensure(&self) -> ArchwayResult<()> {
        if self.store.has_marker(EMULATION_MARKER)? {
            info!("Emulation already registered");
            return Ok(());
        }

        info!("Registering emulation with {}", self.image);
        self.daemon
            .pull_image(&self.image)
            .await
            .map_err(|e| ArchwayError::emulation(format!("pulling {}", self.image), e))?;

        let spec = ContainerSpec {
            image: self.image.clone(),
            args: self.args.clone(),
            privileged: true,
            auto_remove: true,
            ..ContainerSpec::default()
        };
        let exit_code = self
            .daemon
            .run(&spec)
            .await
            .map_err(|e| ArchwayError::emulation(format!("running {}", self.image), e))?;

        if exit_code != 0 {
            return Err(ArchwayError::Emulation {
                reason: format!("{} exited with code {}", self.image, exit_code),
                source: None,
            });
        }

        self.store.set_marker(EMULATION_MARKER)?;
        debug!("Emulation marker written");
        Ok(())
    }
}
