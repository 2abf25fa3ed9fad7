//! Error types for Archway
//!
//! All modules use `ArchwayResult<T>` as their return type.

use crate::archive::ArchiveError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Archway operations
pub type ArchwayResult<T> = Result<T, ArchwayError>;

/// All errors that can occur in Archway
#[derive(Error, Debug)]
pub enum ArchwayError {
    // Runtime errors
    #[error("Container runtime not found: {binary}")]
    RuntimeNotFound { binary: String },

    #[error("Emulation registration failed: {reason}")]
    Emulation {
        reason: String,
        #[source]
        source: Option<Box<ArchwayError>>,
    },

    // Configuration errors
    #[error("Invalid configuration at {path}: {reason}")]
    ConfigInvalid { path: PathBuf, reason: String },

    #[error("Failed to create config directory {path}: {source}")]
    ConfigDirCreate {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid setting {name}: {reason}")]
    InvalidSetting { name: String, reason: String },

    #[error("A build was requested but the build script is empty")]
    MissingBuildScript,

    #[error("A run was requested but the run command is empty")]
    MissingRunCommand,

    // Image errors
    #[error("Image pull failed: {image}: {reason}")]
    ImagePull { image: String, reason: String },

    #[error("Image push failed: {image}: {reason}")]
    ImagePush { image: String, reason: String },

    #[error("Image build failed:\n{reason}")]
    ImageBuild { reason: String },

    #[error("Image export failed: {image}: {reason}")]
    ImageExport { image: String, reason: String },

    #[error("Image import failed: {path}: {reason}")]
    ImageImport { path: PathBuf, reason: String },

    #[error("Blob store error for {key}: {reason}")]
    BlobStore { key: String, reason: String },

    #[error("Registry login failed for {registry}: {reason}")]
    RegistryLogin { registry: String, reason: String },

    // Container errors
    #[error("Container failed to start: {0}")]
    ContainerStart(String),

    #[error("Waiting for container {id} failed: {reason}")]
    ContainerWait { id: String, reason: String },

    // Build context errors
    #[error("Build context encoding failed: {0}")]
    Archive(#[from] ArchiveError),

    // IO errors
    #[error("IO error: {context}")]
    Io {
        context: String,
        #[source]
        source: std::io::Error,
    },

    // Process errors
    #[error("Command failed: {command}")]
    CommandFailed {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Command execution error: {command}, stderr: {stderr}")]
    CommandExecution { command: String, stderr: String },

    // Serialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("TOML serialize error: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    // General errors
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ArchwayError {
    /// Create an IO error with context
    pub fn io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Io {
            context: context.into(),
            source,
        }
    }

    /// Create a command failed error
    pub fn command_failed(command: impl Into<String>, source: std::io::Error) -> Self {
        Self::CommandFailed {
            command: command.into(),
            source,
        }
    }

    /// Create a command execution error
    pub fn command_exec(command: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self::CommandExecution {
            command: command.into(),
            stderr: stderr.into(),
        }
    }

    /// Create an emulation error caused by a failed daemon call
    pub fn emulation(reason: impl Into<String>, source: ArchwayError) -> Self {
        Self::Emulation {
            reason: reason.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Create an invalid setting error
    pub fn invalid_setting(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSetting {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Get actionable hint for the error
    pub fn hint(&self) -> Option<&'static str> {
        match self {
            Self::RuntimeNotFound { .. } => {
                Some("Install Docker or Podman, or point --runtime-binary at one")
            }
            Self::Emulation { .. } => {
                Some("Emulation setup needs a daemon that allows privileged containers")
            }
            Self::MissingBuildScript => Some("Pass a non-empty --build-script or drop the option"),
            Self::MissingRunCommand => Some("Pass a non-empty --run or drop the option"),
            Self::RegistryLogin { .. } | Self::ImagePush { .. } => {
                Some("Check that --registry-token can write to the cache image")
            }
            _ => None,
        }
    }
}
