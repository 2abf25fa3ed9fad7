//! CLI-backed daemon client
//!
//! Implements [`DaemonClient`] by running the `docker` (or a
//! docker-compatible `podman`) binary. The binary talks to the daemon over
//! its control socket; this module only builds argument lists and parses
//! the results.

use crate::credentials::Credential;
use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::daemon::{
    BuildEvent, BuildOptions, BuildStream, ContainerSpec, DaemonClient, OutputFrame, OutputStream,
};
use crate::orchestration::{error_tail, stream_child_output};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStderr, ChildStdout, Command};
use tracing::{debug, info, warn};

/// Default runtime binary
pub const DEFAULT_BINARY: &str = "docker";

/// Container runtime driven through its command-line client
pub struct DockerCli {
    binary: String,
    /// Containers already started by `attach`
    attached: Mutex<HashSet<String>>,
}

impl DockerCli {
    /// Create a client for `binary` (a path or a name on `PATH`)
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            attached: Mutex::new(HashSet::new()),
        }
    }

    /// Binary this client runs
    pub fn binary(&self) -> &str {
        &self.binary
    }

    /// Check that the binary runs and can reach a daemon
    pub async fn ensure_available(&self) -> ArchwayResult<()> {
        let output = self.exec(&["version"]).await?;

        if output.status.success() {
            debug!("{} is reachable", self.binary);
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(ArchwayError::command_exec(
                format!("{} version", self.binary),
                stderr,
            ))
        }
    }

    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new(&self.binary);
        cmd.args(args);
        cmd
    }

    /// Command whose output is consumed as a stream. Dropping the stream
    /// kills the child.
    fn streaming_command(&self, args: &[&str], stdin: Stdio) -> Command {
        let mut cmd = self.command(args);
        cmd.stdin(stdin)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        cmd
    }

    fn describe(&self, args: &[&str]) -> String {
        format!("{} {}", self.binary, args.join(" "))
    }

    fn spawn_error(&self, args: &[&str], e: std::io::Error) -> ArchwayError {
        if e.kind() == std::io::ErrorKind::NotFound {
            ArchwayError::RuntimeNotFound {
                binary: self.binary.clone(),
            }
        } else {
            ArchwayError::command_failed(self.describe(args), e)
        }
    }

    /// Execute a command and return the output
    async fn exec(&self, args: &[&str]) -> ArchwayResult<std::process::Output> {
        debug!("Executing: {}", self.describe(args));

        self.command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .output()
            .await
            .map_err(|e| self.spawn_error(args, e))
    }

    /// Execute a command, mapping a non-zero status through `on_failure`
    async fn exec_checked<F>(&self, args: &[&str], on_failure: F) -> ArchwayResult<String>
    where
        F: FnOnce(String) -> ArchwayError,
    {
        let output = self.exec(args).await?;

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            Err(on_failure(stderr.trim().to_string()))
        }
    }

    /// Spawn a command with piped output, logging each line at debug level
    async fn exec_streamed(&self, args: &[&str]) -> ArchwayResult<(bool, i64, Vec<String>)> {
        debug!("Executing: {}", self.describe(args));

        let mut child = self
            .command(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(args, e))?;

        let lines = stream_child_output(&mut child, &|line| debug!("{}", line)).await?;

        let status = child
            .wait()
            .await
            .map_err(|e| ArchwayError::command_failed(self.describe(args), e))?;

        Ok((status.success(), status.code().unwrap_or(-1) as i64, lines))
    }

    fn started_by_attach(&self, container_id: &str) -> ArchwayResult<bool> {
        let mut attached = self
            .attached
            .lock()
            .map_err(|_| ArchwayError::Internal("attach registry poisoned".to_string()))?;
        Ok(attached.remove(container_id))
    }
}

impl Default for DockerCli {
    fn default() -> Self {
        Self::new(DEFAULT_BINARY)
    }
}

/// `create`/`run` flags shared by both commands
fn container_args(spec: &ContainerSpec) -> Vec<String> {
    let mut args = Vec::new();

    if spec.auto_remove {
        args.push("--rm".to_string());
    }
    if spec.privileged {
        args.push("--privileged".to_string());
    }
    if let Some(entrypoint) = &spec.entrypoint {
        args.push("--entrypoint".to_string());
        args.push(entrypoint.clone());
    }
    if let Some(dir) = &spec.working_dir {
        args.push("-w".to_string());
        args.push(dir.clone());
    }
    if let Some(user) = &spec.user {
        args.push("-u".to_string());
        args.push(user.clone());
    }
    for e in &spec.env {
        args.push("-e".to_string());
        args.push(e.clone());
    }
    for b in &spec.binds {
        args.push("-v".to_string());
        args.push(b.clone());
    }

    args.push(spec.image.clone());
    args.extend(spec.args.iter().cloned());
    args
}

/// `build` arguments reading the context from stdin
fn build_args(options: &BuildOptions, iidfile: &Path) -> Vec<String> {
    let mut args = vec![
        "build".to_string(),
        "--iidfile".to_string(),
        iidfile.display().to_string(),
    ];

    for (name, value) in &options.build_args {
        args.push("--build-arg".to_string());
        args.push(format!("{}={}", name, value));
    }

    args.push("-".to_string());
    args
}

fn as_refs(args: &[String]) -> Vec<&str> {
    args.iter().map(String::as_str).collect()
}

/// A running `build` and everything needed to turn it into events
struct BuildProcess {
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
    stderr: Lines<BufReader<ChildStderr>>,
    stdout_done: bool,
    stderr_done: bool,
    iidfile: PathBuf,
    output: Vec<String>,
    feeder: tokio::task::JoinHandle<std::io::Result<()>>,
}

impl BuildProcess {
    async fn next_line(&mut self) -> Option<String> {
        while !self.stdout_done || !self.stderr_done {
            tokio::select! {
                line = self.stderr.next_line(), if !self.stderr_done => match line {
                    Ok(Some(line)) => return Some(line),
                    _ => self.stderr_done = true,
                },
                line = self.stdout.next_line(), if !self.stdout_done => match line {
                    Ok(Some(line)) => return Some(line),
                    _ => self.stdout_done = true,
                },
            }
        }
        None
    }

    /// Terminal event once both pipes are closed
    async fn finish(mut self) -> BuildEvent {
        match self.feeder.await {
            Ok(Err(e)) => warn!("Writing build context failed: {}", e),
            Err(e) => warn!("Build context writer panicked: {}", e),
            Ok(Ok(())) => {}
        }

        let status = match self.child.wait().await {
            Ok(status) => status,
            Err(e) => return BuildEvent::Error(format!("waiting for build: {}", e)),
        };

        let image_id = tokio::fs::read_to_string(&self.iidfile).await;
        let _ = tokio::fs::remove_file(&self.iidfile).await;

        if !status.success() {
            return BuildEvent::Error(error_tail(&self.output));
        }

        match image_id {
            Ok(id) if !id.trim().is_empty() => BuildEvent::ImageId(id.trim().to_string()),
            _ => BuildEvent::Error(format!(
                "build succeeded but wrote no image ID\n{}",
                error_tail(&self.output)
            )),
        }
    }
}

fn build_events(process: BuildProcess) -> BuildStream {
    stream::unfold(Some(process), |state| async move {
        let mut process = state?;
        match process.next_line().await {
            Some(line) => {
                process.output.push(line.clone());
                Some((BuildEvent::Log(line), Some(process)))
            }
            None => Some((process.finish().await, None)),
        }
    })
    .boxed()
}

/// Output of a `start --attach` child as tagged chunks
struct AttachProcess {
    child: Child,
    stdout: ChildStdout,
    stderr: ChildStderr,
    stdout_done: bool,
    stderr_done: bool,
}

fn output_frames(process: AttachProcess) -> OutputStream {
    stream::unfold(process, |mut process| async move {
        let mut out_buf = [0u8; 8192];
        let mut err_buf = [0u8; 8192];

        while !process.stdout_done || !process.stderr_done {
            tokio::select! {
                read = process.stdout.read(&mut out_buf), if !process.stdout_done => match read {
                    Ok(n) if n > 0 => {
                        return Some((OutputFrame::Stdout(out_buf[..n].to_vec()), process));
                    }
                    _ => process.stdout_done = true,
                },
                read = process.stderr.read(&mut err_buf), if !process.stderr_done => match read {
                    Ok(n) if n > 0 => {
                        return Some((OutputFrame::Stderr(err_buf[..n].to_vec()), process));
                    }
                    _ => process.stderr_done = true,
                },
            }
        }

        if let Err(e) = process.child.wait().await {
            warn!("Attach process did not exit cleanly: {}", e);
        }
        None
    })
    .boxed()
}

#[async_trait]
impl DaemonClient for DockerCli {
    async fn pull_image(&self, reference: &str) -> ArchwayResult<()> {
        info!("Pulling image: {}", reference);

        let (success, _, lines) = self.exec_streamed(&["pull", reference]).await?;
        if success {
            Ok(())
        } else {
            Err(ArchwayError::ImagePull {
                image: reference.to_string(),
                reason: error_tail(&lines),
            })
        }
    }

    async fn build(&self, context: Vec<u8>, options: &BuildOptions) -> ArchwayResult<BuildStream> {
        let iidfile = std::env::temp_dir().join(format!("archway-{}.iid", uuid::Uuid::new_v4()));
        let args = build_args(options, &iidfile);
        let args = as_refs(&args);
        debug!(
            "Executing: {} ({} byte context)",
            self.describe(&args),
            context.len()
        );

        let mut child = self
            .streaming_command(&args, Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(&args, e))?;

        let missing = |stream: &str| ArchwayError::Internal(format!("build {} not piped", stream));
        let mut stdin = child.stdin.take().ok_or_else(|| missing("stdin"))?;
        let stdout = child.stdout.take().ok_or_else(|| missing("stdout"))?;
        let stderr = child.stderr.take().ok_or_else(|| missing("stderr"))?;

        // Feed the context concurrently so a full output pipe cannot stall the write
        let feeder = tokio::spawn(async move {
            stdin.write_all(&context).await?;
            stdin.shutdown().await
        });

        Ok(build_events(BuildProcess {
            child,
            stdout: BufReader::new(stdout).lines(),
            stderr: BufReader::new(stderr).lines(),
            stdout_done: false,
            stderr_done: false,
            iidfile,
            output: Vec::new(),
            feeder,
        }))
    }

    async fn export_image(&self, name: &str, dest: &Path) -> ArchwayResult<()> {
        let dest = dest.display().to_string();
        self.exec_checked(&["save", "-o", &dest, name], |reason| {
            ArchwayError::ImageExport {
                image: name.to_string(),
                reason,
            }
        })
        .await
        .map(|_| ())
    }

    async fn import_image(&self, src: &Path) -> ArchwayResult<()> {
        let path = src.display().to_string();
        let loaded = self
            .exec_checked(&["load", "-i", &path], |reason| ArchwayError::ImageImport {
                path: src.to_path_buf(),
                reason,
            })
            .await?;
        debug!("{}", loaded);
        Ok(())
    }

    async fn push_image(&self, reference: &str) -> ArchwayResult<()> {
        let (success, _, lines) = self.exec_streamed(&["push", reference]).await?;
        if success {
            Ok(())
        } else {
            Err(ArchwayError::ImagePush {
                image: reference.to_string(),
                reason: error_tail(&lines),
            })
        }
    }

    async fn tag(&self, image: &str, reference: &str) -> ArchwayResult<()> {
        debug!("Tagging {} as {}", image, reference);
        self.exec_checked(&["tag", image, reference], |stderr| {
            ArchwayError::command_exec(format!("{} tag", self.binary), stderr)
        })
        .await
        .map(|_| ())
    }

    async fn login(&self, registry: &str, credential: &Credential) -> ArchwayResult<()> {
        let args = [
            "login",
            registry,
            "--username",
            credential.username.as_str(),
            "--password-stdin",
        ];
        debug!("Executing: {}", self.describe(&args));

        let mut child = self
            .command(&args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| self.spawn_error(&args, e))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(credential.secret.as_bytes())
                .await
                .map_err(|e| ArchwayError::io("writing registry secret", e))?;
        }

        let output = child
            .wait_with_output()
            .await
            .map_err(|e| ArchwayError::command_failed(self.describe(&args), e))?;

        if output.status.success() {
            Ok(())
        } else {
            Err(ArchwayError::RegistryLogin {
                registry: registry.to_string(),
                reason: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            })
        }
    }

    async fn create_container(&self, spec: &ContainerSpec) -> ArchwayResult<String> {
        let mut args = vec!["create".to_string()];
        args.extend(container_args(spec));

        self.exec_checked(&as_refs(&args), ArchwayError::ContainerStart)
            .await
    }

    async fn attach(&self, container_id: &str) -> ArchwayResult<OutputStream> {
        // The CLI cannot attach to a created container, so attaching starts it
        let args = ["start", "--attach", container_id];
        debug!("Executing: {}", self.describe(&args));

        let mut child = self
            .streaming_command(&args, Stdio::null())
            .spawn()
            .map_err(|e| self.spawn_error(&args, e))?;

        let stdout = child.stdout.take();
        let stderr = child.stderr.take();
        let (Some(stdout), Some(stderr)) = (stdout, stderr) else {
            return Err(ArchwayError::Internal("attach output not piped".to_string()));
        };

        self.attached
            .lock()
            .map_err(|_| ArchwayError::Internal("attach registry poisoned".to_string()))?
            .insert(container_id.to_string());

        Ok(output_frames(AttachProcess {
            child,
            stdout,
            stderr,
            stdout_done: false,
            stderr_done: false,
        }))
    }

    async fn start(&self, container_id: &str) -> ArchwayResult<()> {
        if self.started_by_attach(container_id)? {
            debug!("Container {} already started by attach", container_id);
            return Ok(());
        }

        self.exec_checked(&["start", container_id], ArchwayError::ContainerStart)
            .await
            .map(|_| ())
    }

    async fn wait(&self, container_id: &str) -> ArchwayResult<i64> {
        let status = self
            .exec_checked(&["wait", container_id], |reason| ArchwayError::ContainerWait {
                id: container_id.to_string(),
                reason,
            })
            .await?;

        status.parse().map_err(|_| ArchwayError::ContainerWait {
            id: container_id.to_string(),
            reason: format!("unexpected exit status '{}'", status),
        })
    }

    async fn remove_container(&self, container_id: &str) -> ArchwayResult<()> {
        self.exec_checked(&["rm", "-f", container_id], |stderr| {
            ArchwayError::command_exec(format!("{} rm", self.binary), stderr)
        })
        .await
        .map(|_| ())
    }

    async fn run(&self, spec: &ContainerSpec) -> ArchwayResult<i64> {
        let mut args = vec!["run".to_string()];
        args.extend(container_args(spec));

        let (_, code, _) = self.exec_streamed(&as_refs(&args)).await?;
        Ok(code)
    }

    fn runtime_name(&self) -> &'static str {
        let name = Path::new(&self.binary)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default();
        if name.starts_with("podman") {
            "Podman"
        } else {
            "Docker"
        }
    }
}
