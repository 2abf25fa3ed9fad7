//! Run command - emulation, cached build, and container run

use crate::cache::{CacheBackend, DirBlobStore, LocalCache, RegistryCache};
use crate::cli::args::{split_list, RunArgs};
use crate::cli::commands::{
    docker_cli, marker_store, register_emulation, registrar, BuildInputs,
};
use crate::config::schema::CredentialRuleConfig;
use crate::config::{select_cache, CacheInputs, CacheSelection, Config, ConfigManager};
use crate::credentials::{registry_host, Credential, CredentialRule, RegistryCredentials};
use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::emulation::EMULATION_MARKER;
use crate::orchestration::{
    DaemonClient, MandatoryMounts, Pipeline, PipelineOutcome, PipelineRequest, StateStore,
};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Login name used with a token when none is configured
const DEFAULT_REGISTRY_USER: &str = "archway";

/// Execute the run command, returning the process exit code
pub async fn execute(args: RunArgs, config: &Config, config_path: &Path) -> ArchwayResult<u8> {
    let inputs = BuildInputs::resolve(&args.build, config);

    let request = PipelineRequest {
        image: inputs.image,
        shell: inputs.shell,
        build_script: inputs.build_script,
        run_command: args.run.clone(),
        namespace: inputs.namespace,
        env: resolve_env(args.env_names.as_deref(), |name| env::var(name).ok()),
        binds: split_list(args.binds.as_deref()),
        user: args.user.clone(),
        mounts: MandatoryMounts {
            socket: config.runtime.socket.clone(),
            install_dir: resolve_install_dir(&args)?,
            workspace: resolve_workspace(&args)?,
        },
    };

    // Reject bad input before touching the runtime
    request.validate()?;

    let ci_repository = env::var("GITHUB_REPOSITORY").ok();
    let selection = select_cache(
        &cache_inputs(&args, config, ci_repository.as_deref()),
        ConfigManager::images_dir(),
        config_path,
    )?;
    debug!("Cache selection: {:?}", selection);

    ConfigManager::ensure_state_dirs().await?;

    let daemon = Arc::new(docker_cli(&args.runtime, config));
    daemon.ensure_available().await?;
    info!("Using runtime: {} ({})", daemon.runtime_name(), daemon.binary());

    let cache: Box<dyn CacheBackend> = match selection {
        CacheSelection::Local { dir } => Box::new(LocalCache::new(
            daemon.clone(),
            Arc::new(DirBlobStore::new(ConfigManager::blobs_dir())),
            dir,
        )),
        CacheSelection::Registry { repository } => {
            let credentials = registry_credentials(&args, config, &repository);
            Box::new(RegistryCache::new(daemon.clone(), repository, credentials))
        }
    };

    let store = marker_store();
    if !store.has_marker(EMULATION_MARKER)? {
        register_emulation(&*daemon, &store, config).await?;
    }

    let registrar = registrar(&*daemon, &store, config);
    let mut pipeline = Pipeline::new(&*daemon, &*cache, registrar);

    let mut stdout = tokio::io::stdout();
    let mut stderr = tokio::io::stderr();
    let outcome = pipeline.execute(&request, &mut stdout, &mut stderr).await?;

    report(&outcome, args.json, args.output_file.as_deref()).await?;

    Ok(exit_status(outcome.exit_code))
}

/// Command-line cache options replace the file's as a pair
fn cache_inputs<'a>(
    args: &'a RunArgs,
    config: &'a Config,
    ci_repository: Option<&'a str>,
) -> CacheInputs<'a> {
    let (dir, image) = if args.cache_dir.is_some() || args.cache_image.is_some() {
        (args.cache_dir.as_deref(), args.cache_image.as_deref())
    } else {
        (
            config.cache.dir.as_deref(),
            config.cache.registry_image.as_deref(),
        )
    };

    CacheInputs {
        dir,
        image,
        repository: ci_repository,
        has_token: args.registry_token.is_some(),
    }
}

/// A command-line token wins; otherwise the file's per-reference rules apply
fn registry_credentials(args: &RunArgs, config: &Config, repository: &str) -> RegistryCredentials {
    let Some(token) = args.registry_token.clone() else {
        let rules = credential_rules(&config.cache.credentials, |name| env::var(name).ok());
        return if rules.is_empty() {
            RegistryCredentials::None
        } else {
            RegistryCredentials::ByReference(rules)
        };
    };

    let username = args
        .registry_user
        .clone()
        .or_else(|| config.cache.registry_user.clone())
        .or_else(|| env::var("GITHUB_ACTOR").ok())
        .unwrap_or_else(|| DEFAULT_REGISTRY_USER.to_string());

    RegistryCredentials::Static {
        registry: registry_host(repository).to_string(),
        credential: Credential::new(username, token),
    }
}

/// Rules whose token variable is unset are skipped
fn credential_rules<F>(rules: &[CredentialRuleConfig], lookup: F) -> Vec<CredentialRule>
where
    F: Fn(&str) -> Option<String>,
{
    rules
        .iter()
        .filter_map(|rule| match lookup(&rule.token_env) {
            Some(secret) => Some(CredentialRule {
                pattern: rule.pattern.clone(),
                credential: Credential::new(rule.username.clone(), secret),
            }),
            None => {
                warn!(
                    "{} is not set, skipping credentials for {}",
                    rule.token_env, rule.pattern
                );
                None
            }
        })
        .collect()
}

/// NAME=VALUE pairs for the listed names; unset names are skipped
fn resolve_env<F>(names: Option<&str>, lookup: F) -> Vec<String>
where
    F: Fn(&str) -> Option<String>,
{
    split_list(names)
        .into_iter()
        .filter_map(|name| match lookup(&name) {
            Some(value) => Some(format!("{}={}", name, value)),
            None => {
                debug!("Environment variable {} is not set, skipping", name);
                None
            }
        })
        .collect()
}

fn resolve_workspace(args: &RunArgs) -> ArchwayResult<PathBuf> {
    match &args.workspace {
        Some(path) => path.canonicalize().map_err(|e| {
            ArchwayError::io(format!("resolving workspace path {}", path.display()), e)
        }),
        None => env::current_dir().map_err(|e| ArchwayError::io("getting current directory", e)),
    }
}

fn resolve_install_dir(args: &RunArgs) -> ArchwayResult<PathBuf> {
    if let Some(path) = &args.install_dir {
        return Ok(path.clone());
    }

    let exe = env::current_exe().map_err(|e| ArchwayError::io("locating executable", e))?;
    exe.parent()
        .map(Path::to_path_buf)
        .ok_or_else(|| ArchwayError::Internal(format!("{} has no parent", exe.display())))
}

/// Result values as `name=value` lines
fn result_lines(outcome: &PipelineOutcome) -> Vec<String> {
    let mut lines = vec![format!("image={}", outcome.image)];
    if let Some(code) = outcome.exit_code {
        lines.push(format!("exit-code={}", code));
    }
    if let Some(hit) = outcome.cache_hit {
        lines.push(format!("cache-hit={}", hit));
    }
    lines
}

async fn report(
    outcome: &PipelineOutcome,
    json: bool,
    output_file: Option<&Path>,
) -> ArchwayResult<()> {
    let lines = result_lines(outcome);

    if json {
        println!("{}", serde_json::to_string(outcome)?);
    } else {
        for line in &lines {
            println!("{}", line);
        }
    }

    if let Some(path) = output_file {
        append_lines(path, &lines).await?;
    }

    Ok(())
}

async fn append_lines(path: &Path, lines: &[String]) -> ArchwayResult<()> {
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await
        .map_err(|e| ArchwayError::io(format!("opening output file {}", path.display()), e))?;

    let mut content = lines.join("\n");
    content.push('\n');
    file.write_all(content.as_bytes())
        .await
        .map_err(|e| ArchwayError::io(format!("writing output file {}", path.display()), e))
}

/// Process exit status for a container exit code
fn exit_status(code: Option<i64>) -> u8 {
    match code {
        None => 0,
        Some(code) => u8::try_from(code).unwrap_or(1),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::{Cli, Commands};
    use clap::Parser;
    use serial_test::serial;
    use tempfile::TempDir;

    fn run_args(extra: &[&str]) -> RunArgs {
        let mut argv = vec!["archway", "run"];
        argv.extend_from_slice(extra);
        match Cli::parse_from(argv).command {
            Commands::Run(args) => args,
            _ => panic!("expected Run command"),
        }
    }

    #[test]
    fn env_names_resolve_from_lookup() {
        let env = resolve_env(Some("CI HOME MISSING"), |name| match name {
            "CI" => Some("true".to_string()),
            "HOME" => Some("/root".to_string()),
            _ => None,
        });
        assert_eq!(env, vec!["CI=true", "HOME=/root"]);
    }

    #[test]
    #[serial]
    fn env_names_resolve_from_process() {
        env::set_var("ARCHWAY_TEST_PASSTHROUGH", "value with spaces");
        let env = resolve_env(Some("ARCHWAY_TEST_PASSTHROUGH"), |name| env::var(name).ok());
        env::remove_var("ARCHWAY_TEST_PASSTHROUGH");

        assert_eq!(env, vec!["ARCHWAY_TEST_PASSTHROUGH=value with spaces"]);
    }

    #[test]
    fn result_lines_for_build_and_run() {
        let outcome = PipelineOutcome {
            image: "archway-abc".to_string(),
            exit_code: Some(3),
            cache_hit: Some(true),
        };
        assert_eq!(
            result_lines(&outcome),
            vec!["image=archway-abc", "exit-code=3", "cache-hit=true"]
        );
    }

    #[test]
    fn result_lines_without_run() {
        let outcome = PipelineOutcome {
            image: "alpine".to_string(),
            exit_code: None,
            cache_hit: None,
        };
        assert_eq!(result_lines(&outcome), vec!["image=alpine"]);
    }

    #[tokio::test]
    async fn output_file_is_appended() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("github_output");
        std::fs::write(&path, "existing=1\n").unwrap();

        append_lines(&path, &["image=alpine".to_string()]).await.unwrap();

        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "existing=1\nimage=alpine\n"
        );
    }

    #[test]
    fn exit_status_mapping() {
        assert_eq!(exit_status(None), 0);
        assert_eq!(exit_status(Some(0)), 0);
        assert_eq!(exit_status(Some(42)), 42);
        assert_eq!(exit_status(Some(-1)), 1);
        assert_eq!(exit_status(Some(300)), 1);
    }

    #[test]
    #[serial]
    fn token_defaults_user_to_actor() {
        env::set_var("GITHUB_ACTOR", "octocat");
        let args = run_args(&["--registry-token", "s3cret"]);
        let creds = registry_credentials(&args, &Config::default(), "ghcr.io/acme/cache");
        env::remove_var("GITHUB_ACTOR");

        match creds {
            RegistryCredentials::Static {
                registry,
                credential,
            } => {
                assert_eq!(registry, "ghcr.io");
                assert_eq!(credential.username, "octocat");
                assert_eq!(credential.secret, "s3cret");
            }
            other => panic!("unexpected credentials {:?}", other),
        }
    }

    #[test]
    fn no_token_means_no_login() {
        let mut args = run_args(&[]);
        args.registry_token = None;

        let creds = registry_credentials(&args, &Config::default(), "ghcr.io/acme/cache");

        assert!(matches!(creds, RegistryCredentials::None));
    }

    fn rule(pattern: &str, username: &str, token_env: &str) -> CredentialRuleConfig {
        CredentialRuleConfig {
            pattern: pattern.to_string(),
            username: username.to_string(),
            token_env: token_env.to_string(),
        }
    }

    #[test]
    fn credential_rules_read_tokens_from_lookup() {
        let rules = credential_rules(
            &[
                rule("ghcr.io/acme/*", "acme-bot", "ACME_TOKEN"),
                rule("quay.io/", "quay-bot", "QUAY_TOKEN"),
            ],
            |name| (name == "ACME_TOKEN").then(|| "t0ken".to_string()),
        );

        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, "ghcr.io/acme/*");
        assert_eq!(rules[0].credential, Credential::new("acme-bot", "t0ken"));
    }

    #[test]
    #[serial]
    fn config_rules_apply_without_token() {
        env::set_var("ARCHWAY_TEST_RULE_TOKEN", "s3cret");
        let mut config = Config::default();
        config.cache.credentials =
            vec![rule("ghcr.io/acme/", "acme-bot", "ARCHWAY_TEST_RULE_TOKEN")];
        let mut args = run_args(&[]);
        args.registry_token = None;

        let creds = registry_credentials(&args, &config, "ghcr.io/acme/cache");
        env::remove_var("ARCHWAY_TEST_RULE_TOKEN");

        let (registry, credential) = creds.select("ghcr.io/acme/cache:archway-abc").unwrap();
        assert_eq!(registry, "ghcr.io");
        assert_eq!(credential.username, "acme-bot");
        assert!(creds.select("ghcr.io/other/cache:archway-abc").is_none());
    }

    #[test]
    fn cli_cache_options_replace_config_pair() {
        let mut config = Config::default();
        config.cache.registry_image = Some("ghcr.io/acme/cache".to_string());
        let args = run_args(&["--cache-dir", "/tmp/snapshots"]);

        let inputs = cache_inputs(&args, &config, Some("acme/widgets"));

        assert_eq!(inputs.dir, Some(Path::new("/tmp/snapshots")));
        assert_eq!(inputs.image, None);
        assert_eq!(inputs.repository, Some("acme/widgets"));
    }
}
