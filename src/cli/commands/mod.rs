//! CLI command implementations

pub mod completions;
pub mod config;
pub mod key;
pub mod register;
pub mod run;

pub use completions::execute as completions;
pub use config::execute as config;
pub use key::execute as key;
pub use register::execute as register;
pub use run::execute as run;

use crate::cli::args::{BuildInputArgs, RuntimeArgs};
use crate::config::{Config, ConfigManager};
use crate::error::ArchwayResult;
use crate::orchestration::{
    DaemonClient, DockerCli, EmulationRegistrar, FileStateStore, StateStore,
};
use crate::ui::{TaskSpinner, UiContext};

/// Build inputs after applying configuration defaults
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct BuildInputs {
    pub image: String,
    pub shell: String,
    pub build_script: Option<String>,
    pub namespace: String,
}

impl BuildInputs {
    /// Command-line values win over the configuration file
    pub(crate) fn resolve(args: &BuildInputArgs, config: &Config) -> Self {
        Self {
            image: args.image.clone().unwrap_or_else(|| config.run.image.clone()),
            shell: args.shell.clone().unwrap_or_else(|| config.run.shell.clone()),
            build_script: args.build_script.clone(),
            namespace: args
                .namespace
                .clone()
                .unwrap_or_else(|| config.cache.namespace.clone()),
        }
    }
}

/// Client for the configured runtime binary
pub(crate) fn docker_cli(args: &RuntimeArgs, config: &Config) -> DockerCli {
    DockerCli::new(
        args.runtime_binary
            .clone()
            .unwrap_or_else(|| config.runtime.binary.clone()),
    )
}

/// Marker store in the state directory
pub(crate) fn marker_store() -> FileStateStore {
    FileStateStore::new(ConfigManager::markers_dir())
}

/// Registrar using the configured helper image
pub(crate) fn registrar<'a>(
    daemon: &'a dyn DaemonClient,
    store: &'a dyn StateStore,
    config: &Config,
) -> EmulationRegistrar<'a> {
    EmulationRegistrar::new(daemon, store)
        .with_image(config.emulation.reference())
        .with_args(config.emulation.args.clone())
}

/// Run emulation registration behind a status spinner
pub(crate) async fn register_emulation(
    daemon: &dyn DaemonClient,
    store: &dyn StateStore,
    config: &Config,
) -> ArchwayResult<()> {
    let ctx = UiContext::detect();
    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!(
        "Registering emulation with {}...",
        config.emulation.reference()
    ));

    match registrar(daemon, store, config).ensure().await {
        Ok(()) => {
            spinner.stop("Emulation registered");
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Emulation registration failed");
            Err(e)
        }
    }
}
