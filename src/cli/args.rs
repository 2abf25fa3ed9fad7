//! CLI argument definitions using clap derive

use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Archway - cross-architecture container builds
///
/// Registers emulation with the container runtime, builds an image from a
/// script with content-addressed caching, and runs a command in it.
#[derive(Parser, Debug)]
#[command(name = "archway")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "ARCHWAY_CONFIG")]
    pub config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, env = "ARCHWAY_LOG_FORMAT")]
    pub log_format: Option<LogFormat>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build (with caching) and/or run a command in an emulated container
    Run(RunArgs),

    /// Print the cache key for a build without contacting the runtime
    Key(KeyArgs),

    /// Register cross-architecture emulation with the runtime
    Register(RegisterArgs),

    /// Show or edit configuration
    Config(ConfigArgs),

    /// Generate shell completions
    Completions(CompletionsArgs),
}

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    /// Human-readable lines
    Text,
    /// One JSON object per line
    Json,
}

/// Build inputs shared by `run` and `key`
#[derive(Args, Debug, Clone, Default)]
pub struct BuildInputArgs {
    /// Base image reference
    #[arg(long, env = "ARCHWAY_IMAGE")]
    pub image: Option<String>,

    /// Shell used for the build script and the run command
    #[arg(long, env = "ARCHWAY_SHELL")]
    pub shell: Option<String>,

    /// Script run while building the image
    #[arg(long, env = "ARCHWAY_BUILD_SCRIPT")]
    pub build_script: Option<String>,

    /// Cache key namespace
    #[arg(long, env = "ARCHWAY_NAMESPACE")]
    pub namespace: Option<String>,
}

/// Container runtime selection
#[derive(Args, Debug, Clone, Default)]
pub struct RuntimeArgs {
    /// docker or podman binary
    #[arg(long, env = "ARCHWAY_RUNTIME_BINARY")]
    pub runtime_binary: Option<String>,
}

/// Arguments for the run command
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub build: BuildInputArgs,

    #[command(flatten)]
    pub runtime: RuntimeArgs,

    /// Command run in the container
    #[arg(long, env = "ARCHWAY_RUN")]
    pub run: Option<String>,

    /// Space-separated bind mounts (host:container[:mode])
    #[arg(long, env = "ARCHWAY_BINDS")]
    pub binds: Option<String>,

    /// Space-separated names of host environment variables to pass through
    #[arg(long = "env", env = "ARCHWAY_ENV")]
    pub env_names: Option<String>,

    /// Local snapshot cache directory
    #[arg(long, env = "ARCHWAY_CACHE_DIR", conflicts_with = "cache_image")]
    pub cache_dir: Option<PathBuf>,

    /// Registry repository used as the image cache
    #[arg(long, env = "ARCHWAY_CACHE_IMAGE")]
    pub cache_image: Option<String>,

    /// Token for logging in to the cache registry
    #[arg(long, env = "ARCHWAY_REGISTRY_TOKEN", hide_env_values = true)]
    pub registry_token: Option<String>,

    /// User name for logging in to the cache registry
    #[arg(long, env = "ARCHWAY_REGISTRY_USER")]
    pub registry_user: Option<String>,

    /// uid:gid to run the container as
    #[arg(long, env = "ARCHWAY_USER")]
    pub user: Option<String>,

    /// Workspace directory mounted read-write (defaults to current directory)
    #[arg(long, env = "ARCHWAY_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Installation directory mounted read-only (defaults to this binary's directory)
    #[arg(long, env = "ARCHWAY_INSTALL_DIR")]
    pub install_dir: Option<PathBuf>,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,

    /// File the result lines are appended to
    #[arg(long, env = "GITHUB_OUTPUT")]
    pub output_file: Option<PathBuf>,
}

/// Arguments for the key command
#[derive(Args, Debug)]
pub struct KeyArgs {
    #[command(flatten)]
    pub build: BuildInputArgs,
}

/// Arguments for the register command
#[derive(Args, Debug)]
pub struct RegisterArgs {
    #[command(flatten)]
    pub runtime: RuntimeArgs,
}

/// Arguments for the config command
#[derive(Args, Debug)]
pub struct ConfigArgs {
    /// Subcommand for config
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write the default configuration
    Init {
        /// Overwrite existing configuration
        #[arg(short, long)]
        force: bool,
    },

    /// Set a configuration value
    Set {
        /// Configuration key (e.g., cache.namespace)
        key: String,
        /// Value to set
        value: String,
    },
}

/// Arguments for the completions command
#[derive(Args, Debug)]
pub struct CompletionsArgs {
    /// Target shell
    #[arg(value_enum)]
    pub shell: clap_complete::Shell,
}

/// Split a space-separated option into its items
pub fn split_list(value: Option<&str>) -> Vec<String> {
    value
        .map(|v| v.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}
