//! Integration tests for Archway

mod cli_tests {
    use assert_cmd::{cargo::cargo_bin_cmd, Command};
    use predicates::prelude::*;
    use tempfile::TempDir;

    /// A command isolated from the caller's config, state and CI variables
    fn archway(home: &TempDir) -> Command {
        let mut cmd = cargo_bin_cmd!("archway");
        cmd.env("HOME", home.path())
            .env("XDG_CONFIG_HOME", home.path().join("config"))
            .env("XDG_STATE_HOME", home.path().join("state"))
            .env_remove("GITHUB_OUTPUT")
            .env_remove("GITHUB_REPOSITORY")
            .env_remove("ARCHWAY_CONFIG")
            .env_remove("ARCHWAY_BUILD_SCRIPT")
            .env_remove("ARCHWAY_RUN")
            .env_remove("ARCHWAY_CACHE_DIR")
            .env_remove("ARCHWAY_CACHE_IMAGE")
            .env_remove("ARCHWAY_REGISTRY_TOKEN");
        cmd
    }

    #[test]
    fn help_displays() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .arg("--help")
            .assert()
            .success()
            .stdout(predicate::str::contains("cross-architecture container builds"));
    }

    #[test]
    fn version_displays() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .arg("--version")
            .assert()
            .success()
            .stdout(predicate::str::contains("archway"));
    }

    #[test]
    fn key_prints_namespaced_digest() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .args(["key", "--image", "alpine:3.19", "--build-script", "echo hi"])
            .assert()
            .success()
            .stdout(predicate::str::is_match(r"^archway-[0-9a-f]{40}\n$").unwrap());
    }

    #[test]
    fn key_is_deterministic() {
        let home = TempDir::new().unwrap();
        let args = ["key", "--namespace", "widgets", "--build-script", "make"];

        let first = archway(&home).args(args).output().unwrap();
        let second = archway(&home).args(args).output().unwrap();

        assert!(first.status.success());
        assert_eq!(first.stdout, second.stdout);
        assert!(String::from_utf8_lossy(&first.stdout).starts_with("widgets-"));
    }

    #[test]
    fn key_without_script_fails() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .arg("key")
            .assert()
            .failure()
            .stderr(predicate::str::contains("build script is empty"));
    }

    #[test]
    fn config_path() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .args(["config", "path"])
            .assert()
            .success()
            .stdout(predicate::str::contains("config.toml"));
    }

    #[test]
    fn config_show() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .args(["config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("[cache]"));
    }

    #[test]
    fn config_set_then_show() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("custom.toml");
        let config = config.to_str().unwrap();

        archway(&home)
            .args(["--config", config, "config", "set", "cache.namespace", "widgets"])
            .assert()
            .success();

        archway(&home)
            .args(["--config", config, "config", "show"])
            .assert()
            .success()
            .stdout(predicate::str::contains("namespace = \"widgets\""));
    }

    #[test]
    fn malformed_config_is_reported() {
        let home = TempDir::new().unwrap();
        let config = home.path().join("broken.toml");
        std::fs::write(&config, "[cache\n").unwrap();

        archway(&home)
            .args(["--config", config.to_str().unwrap(), "config", "show"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Invalid configuration"));
    }

    #[test]
    fn empty_build_script_fails_before_runtime() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .args([
                "run",
                "--build-script",
                "",
                "--runtime-binary",
                "archway-no-such-runtime",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("build script is empty"))
            .stderr(predicate::str::contains("Hint:"));
    }

    #[test]
    fn empty_run_command_fails_before_runtime() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .args(["run", "--run", "", "--runtime-binary", "archway-no-such-runtime"])
            .assert()
            .failure()
            .stderr(predicate::str::contains("run command is empty"));
    }

    #[test]
    fn missing_runtime_is_reported() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .args([
                "run",
                "--run",
                "echo ok",
                "--runtime-binary",
                "archway-no-such-runtime",
            ])
            .assert()
            .failure()
            .stderr(predicate::str::contains("Container runtime not found"));
    }

    #[test]
    fn completions_generate() {
        let home = TempDir::new().unwrap();
        archway(&home)
            .args(["completions", "bash"])
            .assert()
            .success()
            .stdout(predicate::str::contains("archway"));
    }
}
