//! Orchestration of the container daemon
//!
//! Everything that talks to the daemon lives here:
//! - `daemon`: the [`DaemonClient`] trait and protocol types
//! - `docker`: a CLI-backed client for docker or podman
//! - `recipe`: build file and build context synthesis
//! - `emulation`: one-shot cross-architecture registration
//! - `executor`: create/attach/start/wait for a run container
//! - `pipeline`: the build/cache/run state machine

pub mod daemon;
pub mod docker;
pub mod emulation;
pub mod executor;
pub mod pipeline;
pub mod recipe;

#[cfg(test)]
pub(crate) mod testing;

pub use daemon::{
    BuildEvent, BuildOptions, BuildStream, ContainerSpec, DaemonClient, OutputFrame, OutputStream,
};
pub use docker::DockerCli;
pub use emulation::{EmulationRegistrar, FileStateStore, MemoryStateStore, StateStore};
pub use executor::{run_container, MandatoryMounts, RunSpec};
pub use pipeline::{Pipeline, PipelineOutcome, PipelineRequest, Stage};
pub use recipe::{BuildRecipe, ScriptMode};

use crate::error::{ArchwayError, ArchwayResult};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Max number of output lines to include in error messages.
const ERROR_TAIL_LINES: usize = 50;

/// The useful tail of command output for error diagnostics.
pub(crate) fn error_tail(lines: &[String]) -> String {
    let start = lines.len().saturating_sub(ERROR_TAIL_LINES);
    lines[start..].join("\n")
}

/// Stream stdout+stderr from a child process, calling `on_output` for each line.
///
/// Returns all collected output lines for error reporting.
pub(crate) async fn stream_child_output(
    child: &mut tokio::process::Child,
    on_output: &(dyn Fn(String) + Send + Sync),
) -> ArchwayResult<Vec<String>> {
    let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
        return Err(ArchwayError::Internal(
            "child output was not piped".to_string(),
        ));
    };

    let mut stderr_reader = BufReader::new(stderr).lines();
    let mut stdout_reader = BufReader::new(stdout).lines();

    let mut all_output = Vec::new();
    let mut stderr_done = false;
    let mut stdout_done = false;

    while !stderr_done || !stdout_done {
        tokio::select! {
            line = stderr_reader.next_line(), if !stderr_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stderr_done = true,
                }
            }
            line = stdout_reader.next_line(), if !stdout_done => {
                match line {
                    Ok(Some(line)) => {
                        on_output(line.clone());
                        all_output.push(line);
                    }
                    _ => stdout_done = true,
                }
            }
        }
    }

    Ok(all_output)
}
