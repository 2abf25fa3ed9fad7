//! Container daemon abstraction
//!
//! The pipeline only talks to the daemon through this trait, so tests can
//! substitute a recording fake and the CLI backend can target either
//! docker or podman.

use crate::credentials::Credential;
use crate::error::ArchwayResult;
use async_trait::async_trait;
use futures_util::stream::BoxStream;
use std::collections::BTreeMap;
use std::path::Path;

/// Progress event emitted while an image builds
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildEvent {
    /// A line of build output
    Log(String),
    /// The finished image's identifier
    ImageId(String),
    /// The build failed
    Error(String),
}

/// Incremental build progress
pub type BuildStream = BoxStream<'static, BuildEvent>;

/// A chunk of container output, tagged with its source stream
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputFrame {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
}

/// Demultiplexed output of an attached container
pub type OutputStream = BoxStream<'static, OutputFrame>;

/// Options for an image build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOptions {
    /// `--build-arg` values
    pub build_args: BTreeMap<String, String>,
}

/// Container creation parameters
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Image to run
    pub image: String,
    /// Entrypoint override
    pub entrypoint: Option<String>,
    /// Arguments passed to the entrypoint
    pub args: Vec<String>,
    /// Working directory inside the container
    pub working_dir: Option<String>,
    /// Environment in NAME=VALUE form
    pub env: Vec<String>,
    /// Bind mounts in host:container[:mode] form
    pub binds: Vec<String>,
    /// uid:gid to run as
    pub user: Option<String>,
    /// Run with extended privileges
    pub privileged: bool,
    /// Remove the container once it exits
    pub auto_remove: bool,
}

/// Operations the pipeline needs from a container daemon
#[async_trait]
pub trait DaemonClient: Send + Sync {
    /// Pull an image reference (`name:tag`)
    async fn pull_image(&self, reference: &str) -> ArchwayResult<()>;

    /// Build an image from an encoded context archive
    async fn build(&self, context: Vec<u8>, options: &BuildOptions) -> ArchwayResult<BuildStream>;

    /// Write an image snapshot to `dest`
    async fn export_image(&self, name: &str, dest: &Path) -> ArchwayResult<()>;

    /// Load images from a snapshot file
    async fn import_image(&self, src: &Path) -> ArchwayResult<()>;

    /// Push a tagged image to its registry
    async fn push_image(&self, reference: &str) -> ArchwayResult<()>;

    /// Add a reference to an existing image
    async fn tag(&self, image: &str, reference: &str) -> ArchwayResult<()>;

    /// Authenticate against a registry
    async fn login(&self, registry: &str, credential: &Credential) -> ArchwayResult<()>;

    /// Create a container and return its ID
    async fn create_container(&self, spec: &ContainerSpec) -> ArchwayResult<String>;

    /// Attach to a container's output; must be called before `start`
    async fn attach(&self, container_id: &str) -> ArchwayResult<OutputStream>;

    /// Start a created container
    async fn start(&self, container_id: &str) -> ArchwayResult<()>;

    /// Wait for a container to exit and return its status code
    async fn wait(&self, container_id: &str) -> ArchwayResult<i64>;

    /// Remove a container, stopping it first if it is still running
    async fn remove_container(&self, container_id: &str) -> ArchwayResult<()>;

    /// Run a container to completion without capturing its output
    async fn run(&self, spec: &ContainerSpec) -> ArchwayResult<i64>;

    /// Human-readable runtime name for display
    fn runtime_name(&self) -> &'static str;
}
