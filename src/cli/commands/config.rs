//! Config command - show or edit configuration

use crate::cli::args::{ConfigAction, ConfigArgs};
use crate::config::{Config, ConfigManager};
use crate::error::{ArchwayError, ArchwayResult};
use crate::ui;
use std::path::PathBuf;

/// Every key `config set` accepts
const VALID_KEYS: [&str; 12] = [
    "general.log_format",
    "runtime.binary",
    "runtime.socket",
    "emulation.image",
    "emulation.tag",
    "emulation.args",
    "cache.namespace",
    "cache.dir",
    "cache.registry_image",
    "cache.registry_user",
    "run.shell",
    "run.image",
];

/// Execute the config command
pub async fn execute(args: ConfigArgs, config: &Config, manager: &ConfigManager) -> ArchwayResult<()> {
    match args.action {
        None | Some(ConfigAction::Show) => show_config(config)?,
        Some(ConfigAction::Path) => println!("{}", manager.path().display()),
        Some(ConfigAction::Init { force }) => init_config(manager, force).await?,
        Some(ConfigAction::Set { key, value }) => {
            let mut updated = config.clone();
            set_value(&mut updated, &key, &value)?;
            manager.save(&updated).await?;
            ui::step_ok(&format!("Set {} = {}", key, value));
        }
    }

    Ok(())
}

fn show_config(config: &Config) -> ArchwayResult<()> {
    println!("{}", toml::to_string_pretty(config)?);
    Ok(())
}

async fn init_config(manager: &ConfigManager, force: bool) -> ArchwayResult<()> {
    let path = manager.path();

    if path.exists() && !force {
        ui::step_warn_hint(
            &format!("Config already exists at {}", path.display()),
            "Use --force to overwrite",
        );
        return Ok(());
    }

    manager.save(&Config::default()).await?;
    ui::step_ok(&format!("Configuration initialized ({})", path.display()));
    Ok(())
}

/// Apply one dot-separated key to `config`
fn set_value(config: &mut Config, key: &str, value: &str) -> ArchwayResult<()> {
    let parts: Vec<&str> = key.split('.').collect();
    let optional = |v: &str| (!v.is_empty()).then(|| v.to_string());

    match parts.as_slice() {
        ["general", "log_format"] => match value {
            "text" | "json" => config.general.log_format = value.to_string(),
            _ => {
                return Err(ArchwayError::invalid_setting(
                    key,
                    format!("'{}' is not one of text, json", value),
                ))
            }
        },

        ["runtime", "binary"] => config.runtime.binary = value.to_string(),
        ["runtime", "socket"] => config.runtime.socket = PathBuf::from(value),

        ["emulation", "image"] => config.emulation.image = value.to_string(),
        ["emulation", "tag"] => config.emulation.tag = value.to_string(),
        ["emulation", "args"] => {
            config.emulation.args = value.split_whitespace().map(str::to_string).collect()
        }

        ["cache", "namespace"] => {
            crate::cache::validate_namespace(value)?;
            config.cache.namespace = value.to_string();
        }
        ["cache", "dir"] => config.cache.dir = optional(value).map(PathBuf::from),
        ["cache", "registry_image"] => config.cache.registry_image = optional(value),
        ["cache", "registry_user"] => config.cache.registry_user = optional(value),

        ["run", "shell"] => config.run.shell = value.to_string(),
        ["run", "image"] => config.run.image = value.to_string(),

        _ => {
            return Err(ArchwayError::invalid_setting(
                key,
                format!("unknown key; valid keys: {}", VALID_KEYS.join(", ")),
            ))
        }
    }

    Ok(())
}
