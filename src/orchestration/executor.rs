//! Container run executor
//!
//! Runs a command in a fresh container, forwarding its output live and
//! returning the exit status. The container is removed afterwards.

use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::daemon::{ContainerSpec, DaemonClient, OutputFrame};
use futures_util::StreamExt;
use std::path::PathBuf;
use tokio::io::{AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

/// Default location of the daemon control socket
pub const DEFAULT_SOCKET: &str = "/var/run/docker.sock";

/// Host paths mounted into every run container
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MandatoryMounts {
    /// Daemon control socket (read-only)
    pub socket: PathBuf,
    /// This tool's installation directory (read-only)
    pub install_dir: PathBuf,
    /// Workspace directory (read-write, also the working directory)
    pub workspace: PathBuf,
}

impl MandatoryMounts {
    /// Bind strings in mount order
    pub fn binds(&self) -> Vec<String> {
        vec![
            format!("{0}:{0}:ro", self.socket.display()),
            format!("{0}:{0}:ro", self.install_dir.display()),
            format!("{0}:{0}", self.workspace.display()),
        ]
    }
}

/// What to run and how
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunSpec {
    pub image: String,
    pub shell: String,
    pub command: String,
    /// Working directory; the workspace when unset
    pub working_dir: Option<String>,
    /// NAME=VALUE pairs
    pub env: Vec<String>,
    /// User binds, appended after the mandatory ones
    pub binds: Vec<String>,
    /// uid:gid
    pub user: Option<String>,
}

impl RunSpec {
    /// Build the daemon-level container spec.
    ///
    /// Mandatory binds come first; a user bind targeting the same
    /// container path is passed through and the daemon decides.
    pub fn to_container_spec(&self, mounts: &MandatoryMounts) -> ContainerSpec {
        let mut binds = mounts.binds();
        binds.extend(self.binds.iter().cloned());

        let working_dir = self
            .working_dir
            .clone()
            .unwrap_or_else(|| mounts.workspace.display().to_string());

        ContainerSpec {
            image: self.image.clone(),
            entrypoint: Some(self.shell.clone()),
            args: vec!["-c".to_string(), self.command.clone()],
            working_dir: Some(working_dir),
            env: self.env.clone(),
            binds,
            user: self.user.clone(),
            privileged: false,
            auto_remove: false,
        }
    }
}

/// Create, attach, start and wait for a container, then remove it.
///
/// Output is attached before the container starts so nothing is lost;
/// stdout frames go to `stdout`, stderr frames to `stderr`. Removal is
/// best effort and happens whether or not the run succeeded.
pub async fn run_container<O, E>(
    daemon: &dyn DaemonClient,
    spec: &ContainerSpec,
    stdout: &mut O,
    stderr: &mut E,
) -> ArchwayResult<i64>
where
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let container_id = daemon.create_container(spec).await?;
    info!(
        "Created container {} from {}",
        &container_id[..12.min(container_id.len())],
        spec.image
    );

    let result = attach_and_wait(daemon, &container_id, stdout, stderr).await;

    if let Err(e) = daemon.remove_container(&container_id).await {
        warn!("Failed to remove container {}: {}", container_id, e);
    }

    result
}

async fn attach_and_wait<O, E>(
    daemon: &dyn DaemonClient,
    container_id: &str,
    stdout: &mut O,
    stderr: &mut E,
) -> ArchwayResult<i64>
where
    O: AsyncWrite + Unpin + ?Sized,
    E: AsyncWrite + Unpin + ?Sized,
{
    let mut output = daemon.attach(container_id).await?;
    daemon.start(container_id).await?;

    while let Some(frame) = output.next().await {
        let result = match &frame {
            OutputFrame::Stdout(data) => stdout.write_all(data).await,
            OutputFrame::Stderr(data) => stderr.write_all(data).await,
        };
        result.map_err(|e| ArchwayError::io("forwarding container output", e))?;
    }

    stdout
        .flush()
        .await
        .map_err(|e| ArchwayError::io("flushing container output", e))?;
    stderr
        .flush()
        .await
        .map_err(|e| ArchwayError::io("flushing container output", e))?;

    let exit_code = daemon.wait(container_id).await?;
    debug!("Container {} exited with {}", container_id, exit_code);
    Ok(exit_code)
}
