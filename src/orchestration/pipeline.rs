//! Build/run pipeline
//!
//! Sequences emulation registration, cache lookup, build on a miss,
//! cache store, and an optional run. Every step is awaited before the
//! next begins; the first error moves the pipeline to [`Stage::Error`]
//! and nothing is rolled back. A pipeline executes at most once.

use crate::archive::ArchiveEncoder;
use crate::cache::CacheBackend;
use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::daemon::{BuildEvent, BuildOptions, DaemonClient};
use crate::orchestration::emulation::EmulationRegistrar;
use crate::orchestration::executor::{run_container, MandatoryMounts, RunSpec};
use crate::orchestration::recipe::BuildRecipe;
use futures_util::StreamExt;
use serde::Serialize;
use std::fmt;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, info, warn};

/// Pipeline progress
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Stage {
    Start,
    EmulationEnsured,
    CacheResolved,
    Built,
    Restored,
    Tagged,
    Run,
    Done,
    Error,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Start => "start",
            Self::EmulationEnsured => "emulation-ensured",
            Self::CacheResolved => "cache-resolved",
            Self::Built => "built",
            Self::Restored => "restored",
            Self::Tagged => "tagged",
            Self::Run => "run",
            Self::Done => "done",
            Self::Error => "error",
        };
        write!(f, "{}", name)
    }
}

/// Inputs for one pipeline invocation
#[derive(Debug, Clone)]
pub struct PipelineRequest {
    /// Base image reference
    pub image: String,
    /// Shell used for the build script and the run command
    pub shell: String,
    /// Build script; `Some("")` is a request with no script
    pub build_script: Option<String>,
    /// Run command; `Some("")` is a request with no command
    pub run_command: Option<String>,
    /// Cache key namespace
    pub namespace: String,
    /// NAME=VALUE pairs for the run container
    pub env: Vec<String>,
    /// User binds for the run container
    pub binds: Vec<String>,
    /// uid:gid for the run container
    pub user: Option<String>,
    /// Paths always mounted into the run container
    pub mounts: MandatoryMounts,
}

impl PipelineRequest {
    /// Reject requests that cannot be executed
    pub fn validate(&self) -> ArchwayResult<()> {
        if matches!(&self.build_script, Some(s) if s.trim().is_empty()) {
            return Err(ArchwayError::MissingBuildScript);
        }
        if matches!(&self.run_command, Some(s) if s.trim().is_empty()) {
            return Err(ArchwayError::MissingRunCommand);
        }
        if self.image.trim().is_empty() || self.image.contains(char::is_whitespace) {
            return Err(ArchwayError::invalid_setting(
                "image",
                format!("'{}' is not an image reference", self.image),
            ));
        }
        if self.shell.is_empty() || self.shell.contains(char::is_whitespace) {
            return Err(ArchwayError::invalid_setting(
                "shell",
                format!("'{}' is not a shell path", self.shell),
            ));
        }
        crate::cache::validate_namespace(&self.namespace)
    }
}

/// What the pipeline produced
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PipelineOutcome {
    /// Image that was built, restored, or used as base
    pub image: String,
    /// Container exit code, when a run happened
    pub exit_code: Option<i64>,
    /// Whether the build was served from cache, when a build was requested
    pub cache_hit: Option<bool>,
}

/// The build/cache/run state machine
pub struct Pipeline<'a> {
    daemon: &'a dyn DaemonClient,
    cache: &'a dyn CacheBackend,
    registrar: EmulationRegistrar<'a>,
    encoder: ArchiveEncoder,
    stage: Stage,
}

impl<'a> Pipeline<'a> {
    pub fn new(
        daemon: &'a dyn DaemonClient,
        cache: &'a dyn CacheBackend,
        registrar: EmulationRegistrar<'a>,
    ) -> Self {
        Self {
            daemon,
            cache,
            registrar,
            encoder: ArchiveEncoder::new(),
            stage: Stage::Start,
        }
    }

    /// Last stage reached
    pub fn stage(&self) -> Stage {
        self.stage
    }

    fn advance(&mut self, stage: Stage) {
        debug!("Pipeline stage: {} -> {}", self.stage, stage);
        self.stage = stage;
    }

    /// Run the pipeline. Build progress goes to `stdout`; container
    /// output is split between `stdout` and `stderr`.
    ///
    /// Only a pipeline still at [`Stage::Start`] can execute. Any failure
    /// leaves it at [`Stage::Error`].
    pub async fn execute<O, E>(
        &mut self,
        request: &PipelineRequest,
        stdout: &mut O,
        stderr: &mut E,
    ) -> ArchwayResult<PipelineOutcome>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        if self.stage != Stage::Start {
            return Err(ArchwayError::Internal(format!(
                "pipeline already executed (stage: {})",
                self.stage
            )));
        }

        let result = self.run_stages(request, stdout, stderr).await;
        if let Err(e) = &result {
            debug!("Pipeline failed at stage {}: {}", self.stage, e);
            self.stage = Stage::Error;
        }
        result
    }

    async fn run_stages<O, E>(
        &mut self,
        request: &PipelineRequest,
        stdout: &mut O,
        stderr: &mut E,
    ) -> ArchwayResult<PipelineOutcome>
    where
        O: AsyncWrite + Unpin + ?Sized,
        E: AsyncWrite + Unpin + ?Sized,
    {
        request.validate()?;

        if request.build_script.is_none() && request.run_command.is_none() {
            warn!("Neither a build script nor a run command was given; nothing to do");
        }

        self.registrar.ensure().await?;
        self.advance(Stage::EmulationEnsured);

        let (image, cache_hit) = match &request.build_script {
            Some(script) => {
                let (image, hit) = self.resolve_image(request, script, stdout).await?;
                (image, Some(hit))
            }
            None => (request.image.clone(), None),
        };

        let exit_code = match &request.run_command {
            Some(command) => {
                self.advance(Stage::Run);
                let spec = RunSpec {
                    image: image.clone(),
                    shell: request.shell.clone(),
                    command: command.clone(),
                    working_dir: None,
                    env: request.env.clone(),
                    binds: request.binds.clone(),
                    user: request.user.clone(),
                };
                let container = spec.to_container_spec(&request.mounts);
                Some(run_container(self.daemon, &container, stdout, stderr).await?)
            }
            None => None,
        };

        self.advance(Stage::Done);
        Ok(PipelineOutcome {
            image,
            exit_code,
            cache_hit,
        })
    }

    /// Look the build up in the cache, building and storing it on a miss
    async fn resolve_image<O>(
        &mut self,
        request: &PipelineRequest,
        script: &str,
        progress: &mut O,
    ) -> ArchwayResult<(String, bool)>
    where
        O: AsyncWrite + Unpin + ?Sized,
    {
        let recipe = BuildRecipe::synthesize(&request.image, &request.shell, script);
        let key = recipe.cache_key(&request.namespace);
        info!("Cache key: {} ({})", key, self.cache.strategy_name());

        let cached = self.cache.lookup(&key).await?;
        self.advance(Stage::CacheResolved);

        if let Some(image) = cached {
            info!("Cache hit, skipping build");
            self.advance(Stage::Restored);
            return Ok((image, true));
        }

        info!("Cache miss, building {}", key);
        let image_id = self.build(&recipe, progress).await?;
        self.advance(Stage::Built);

        let image = self.cache.store(&key, &image_id).await.inspect_err(|e| {
            error!("Image {} built but caching it failed: {}", image_id, e);
        })?;
        self.advance(Stage::Tagged);

        Ok((image, false))
    }

    async fn build<O>(&self, recipe: &BuildRecipe, progress: &mut O) -> ArchwayResult<String>
    where
        O: AsyncWrite + Unpin + ?Sized,
    {
        let context = recipe.context(&self.encoder)?;
        let options = BuildOptions {
            build_args: recipe.build_args.clone(),
        };

        let mut events = self.daemon.build(context, &options).await?;
        let mut image_id = None;

        while let Some(event) = events.next().await {
            match event {
                BuildEvent::Log(line) => {
                    progress
                        .write_all(format!("{}\n", line).as_bytes())
                        .await
                        .map_err(|e| ArchwayError::io("writing build output", e))?;
                }
                BuildEvent::ImageId(id) => image_id = Some(id),
                BuildEvent::Error(reason) => return Err(ArchwayError::ImageBuild { reason }),
            }
        }

        image_id.ok_or_else(|| ArchwayError::ImageBuild {
            reason: "build finished without reporting an image ID".to_string(),
        })
    }
}
