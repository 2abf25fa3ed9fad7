//! Recording in-memory daemon for tests

use crate::credentials::Credential;
use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::daemon::{
    BuildEvent, BuildOptions, BuildStream, ContainerSpec, DaemonClient, OutputFrame, OutputStream,
};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::HashSet;
use std::path::Path;
use std::sync::Mutex;

/// A fake daemon that records every call as a short string
pub(crate) struct MockDaemon {
    calls: Mutex<Vec<String>>,
    builds: Mutex<Vec<(Vec<u8>, BuildOptions)>>,
    containers: Mutex<Vec<ContainerSpec>>,
    build_events: Vec<BuildEvent>,
    failing_pulls: HashSet<String>,
    fail_push: bool,
    fail_export: bool,
    fail_remove: bool,
    exit_code: i64,
    run_exit_code: i64,
    output: Vec<OutputFrame>,
}

impl MockDaemon {
    pub(crate) fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            builds: Mutex::new(Vec::new()),
            containers: Mutex::new(Vec::new()),
            build_events: vec![
                BuildEvent::Log("STEP 1/2: FROM alpine".to_string()),
                BuildEvent::ImageId("sha256:built".to_string()),
            ],
            failing_pulls: HashSet::new(),
            fail_push: false,
            fail_export: false,
            fail_remove: false,
            exit_code: 0,
            run_exit_code: 0,
            output: Vec::new(),
        }
    }

    pub(crate) fn with_build_events(mut self, events: Vec<BuildEvent>) -> Self {
        self.build_events = events;
        self
    }

    pub(crate) fn fail_pull(mut self, reference: &str) -> Self {
        self.failing_pulls.insert(reference.to_string());
        self
    }

    pub(crate) fn fail_push(mut self) -> Self {
        self.fail_push = true;
        self
    }

    pub(crate) fn fail_export(mut self) -> Self {
        self.fail_export = true;
        self
    }

    pub(crate) fn fail_remove(mut self) -> Self {
        self.fail_remove = true;
        self
    }

    pub(crate) fn with_exit_code(mut self, code: i64) -> Self {
        self.exit_code = code;
        self
    }

    pub(crate) fn with_run_exit_code(mut self, code: i64) -> Self {
        self.run_exit_code = code;
        self
    }

    pub(crate) fn with_output(mut self, frames: Vec<OutputFrame>) -> Self {
        self.output = frames;
        self
    }

    /// Every recorded call, in order
    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of calls whose record starts with `prefix`
    pub(crate) fn count(&self, prefix: &str) -> usize {
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    /// Contexts and options passed to `build`
    pub(crate) fn builds(&self) -> Vec<(Vec<u8>, BuildOptions)> {
        self.builds.lock().unwrap().clone()
    }

    /// Specs passed to `create_container` and `run`
    pub(crate) fn containers(&self) -> Vec<ContainerSpec> {
        self.containers.lock().unwrap().clone()
    }

    fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }
}

#[async_trait]
impl DaemonClient for MockDaemon {
    async fn pull_image(&self, reference: &str) -> ArchwayResult<()> {
        self.record(format!("pull {}", reference));
        if self.failing_pulls.contains(reference) {
            return Err(ArchwayError::ImagePull {
                image: reference.to_string(),
                reason: "manifest unknown".to_string(),
            });
        }
        Ok(())
    }

    async fn build(&self, context: Vec<u8>, options: &BuildOptions) -> ArchwayResult<BuildStream> {
        self.record("build");
        self.builds.lock().unwrap().push((context, options.clone()));
        Ok(stream::iter(self.build_events.clone()).boxed())
    }

    async fn export_image(&self, name: &str, dest: &Path) -> ArchwayResult<()> {
        self.record(format!("export {}", name));
        if self.fail_export {
            return Err(ArchwayError::ImageExport {
                image: name.to_string(),
                reason: "no space left on device".to_string(),
            });
        }
        std::fs::write(dest, format!("snapshot:{}", name))
            .map_err(|e| ArchwayError::io("writing snapshot", e))
    }

    async fn import_image(&self, src: &Path) -> ArchwayResult<()> {
        self.record(format!("import {}", src.display()));
        if !src.is_file() {
            return Err(ArchwayError::ImageImport {
                path: src.to_path_buf(),
                reason: "no such file".to_string(),
            });
        }
        Ok(())
    }

    async fn push_image(&self, reference: &str) -> ArchwayResult<()> {
        self.record(format!("push {}", reference));
        if self.fail_push {
            return Err(ArchwayError::ImagePush {
                image: reference.to_string(),
                reason: "denied".to_string(),
            });
        }
        Ok(())
    }

    async fn tag(&self, image: &str, reference: &str) -> ArchwayResult<()> {
        self.record(format!("tag {} {}", image, reference));
        Ok(())
    }

    async fn login(&self, registry: &str, _credential: &Credential) -> ArchwayResult<()> {
        self.record(format!("login {}", registry));
        Ok(())
    }

    async fn create_container(&self, spec: &ContainerSpec) -> ArchwayResult<String> {
        self.record(format!("create {}", spec.image));
        self.containers.lock().unwrap().push(spec.clone());
        Ok("c0ffee".to_string())
    }

    async fn attach(&self, container_id: &str) -> ArchwayResult<OutputStream> {
        self.record(format!("attach {}", container_id));
        Ok(stream::iter(self.output.clone()).boxed())
    }

    async fn start(&self, container_id: &str) -> ArchwayResult<()> {
        self.record(format!("start {}", container_id));
        Ok(())
    }

    async fn wait(&self, container_id: &str) -> ArchwayResult<i64> {
        self.record(format!("wait {}", container_id));
        Ok(self.exit_code)
    }

    async fn remove_container(&self, container_id: &str) -> ArchwayResult<()> {
        self.record(format!("remove {}", container_id));
        if self.fail_remove {
            return Err(ArchwayError::command_exec("rm", "container is busy"));
        }
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> ArchwayResult<i64> {
        self.record(format!("run {}", spec.image));
        self.containers.lock().unwrap().push(spec.clone());
        Ok(self.run_exit_code)
    }

    fn runtime_name(&self) -> &'static str {
        "Mock"
    }
}
