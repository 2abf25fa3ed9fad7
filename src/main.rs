//! Archway - cross-architecture container builds
//!
//! CLI entry point that dispatches to subcommands.

use archway::cli::{Cli, Commands, LogFormat};
use archway::config::ConfigManager;
use archway::error::ArchwayResult;
use clap::Parser;
use console::style;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            let mut cause = std::error::Error::source(&e);
            while let Some(inner) = cause {
                eprintln!("  {} {}", style("Caused by:").dim(), inner);
                cause = inner.source();
            }
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> ArchwayResult<u8> {
    let cli = Cli::parse();

    // Completions need neither logging nor config
    if let Commands::Completions(args) = cli.command {
        archway::cli::commands::completions(args)?;
        return Ok(0);
    }

    let config_manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let config = config_manager.load().await?;

    let log_format = cli.log_format.unwrap_or(match config.general.log_format.as_str() {
        "json" => LogFormat::Json,
        _ => LogFormat::Text,
    });
    init_logging(cli.verbose, log_format);
    debug!("Configuration: {}", config_manager.path().display());

    match cli.command {
        Commands::Completions(_) => unreachable!("Completions handled above"),
        Commands::Run(args) => {
            archway::cli::commands::run(args, &config, config_manager.path()).await
        }
        Commands::Key(args) => archway::cli::commands::key(args, &config).await.map(|_| 0),
        Commands::Register(args) => archway::cli::commands::register(args, &config)
            .await
            .map(|_| 0),
        Commands::Config(args) => archway::cli::commands::config(args, &config, &config_manager)
            .await
            .map(|_| 0),
    }
}

/// 0 = warn, 1 = info, 2+ = debug; logs go to stderr
fn init_logging(verbose: u8, format: LogFormat) {
    let filter = match verbose {
        0 => EnvFilter::new("archway=warn"),
        1 => EnvFilter::new("archway=info"),
        _ => EnvFilter::new("archway=debug"),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    match format {
        LogFormat::Text => builder.without_time().init(),
        LogFormat::Json => builder.json().init(),
    }
}
