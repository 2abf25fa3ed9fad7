//! Register command - one-shot emulation registration

use crate::cli::args::RegisterArgs;
use crate::cli::commands::{docker_cli, marker_store, register_emulation};
use crate::config::{Config, ConfigManager};
use crate::error::ArchwayResult;
use crate::orchestration::emulation::EMULATION_MARKER;
use crate::orchestration::{DaemonClient, StateStore};
use crate::ui;
use tracing::info;

/// Execute the register command
pub async fn execute(args: RegisterArgs, config: &Config) -> ArchwayResult<()> {
    let store = marker_store();
    if store.has_marker(EMULATION_MARKER)? {
        ui::step_ok(&format!(
            "Emulation already registered ({})",
            store.marker_path(EMULATION_MARKER).display()
        ));
        return Ok(());
    }

    ConfigManager::ensure_state_dirs().await?;

    let daemon = docker_cli(&args.runtime, config);
    daemon.ensure_available().await?;
    info!("Using runtime: {} ({})", daemon.runtime_name(), daemon.binary());

    register_emulation(&daemon, &store, config).await
}
