//! Build file synthesis
//!
//! Turns a base image and a user build script into a build file plus
//! the archive entries and build arguments the daemon needs.

use crate::archive::{ArchiveEncoder, ArchiveEntry, ArchiveError};
use crate::cache::key::{derive_key, CacheKey};
use std::collections::BTreeMap;

/// Name of the build file inside the context
pub const BUILD_FILE: &str = "Dockerfile";

/// Build argument carrying an inlined script
pub const SCRIPT_ARG: &str = "ARCHWAY_BUILD_SCRIPT";

/// Script file name inside the context
pub const SCRIPT_FILE: &str = "archway-build.sh";

/// How the script reaches the build
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptMode {
    /// Passed as a build argument and run by a single `RUN`
    Inline,
    /// Copied into the image, executed, then removed
    CopyIn,
}

impl ScriptMode {
    /// Inline only single-line scripts free of quoting and expansion characters
    pub fn for_script(script: &str) -> Self {
        let unsafe_char = |c: char| matches!(c, '"' | '\\' | '$' | '`' | '\'') || c.is_control();
        if script.chars().any(unsafe_char) {
            Self::CopyIn
        } else {
            Self::Inline
        }
    }
}

/// Everything needed to build an image from a script
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildRecipe {
    pub mode: ScriptMode,
    pub build_file: String,
    pub script: String,
    pub build_args: BTreeMap<String, String>,
}

impl BuildRecipe {
    /// Synthesize a recipe, choosing the script mode from the script's contents
    pub fn synthesize(base_image: &str, shell: &str, script: &str) -> Self {
        Self::with_mode(base_image, shell, script, ScriptMode::for_script(script))
    }

    /// Synthesize a recipe with an explicit script mode
    pub fn with_mode(base_image: &str, shell: &str, script: &str, mode: ScriptMode) -> Self {
        let mut lines = vec![format!("FROM {}", base_image)];
        let mut build_args = BTreeMap::new();

        match mode {
            ScriptMode::Inline => {
                lines.push(format!("ARG {}", SCRIPT_ARG));
                lines.push(format!("RUN {} -c \"${}\"", shell, SCRIPT_ARG));
                build_args.insert(SCRIPT_ARG.to_string(), script.to_string());
            }
            ScriptMode::CopyIn => {
                lines.push(format!("COPY {SCRIPT_FILE} /tmp/{SCRIPT_FILE}"));
                lines.push(format!(
                    "RUN {shell} /tmp/{SCRIPT_FILE} && rm -f /tmp/{SCRIPT_FILE}"
                ));
            }
        }

        let mut build_file = lines.join("\n");
        build_file.push('\n');

        Self {
            mode,
            build_file,
            script: script.to_string(),
            build_args,
        }
    }

    /// Cache key for this recipe
    pub fn cache_key(&self, namespace: &str) -> CacheKey {
        derive_key(namespace, &self.build_file, &self.script)
    }

    /// Files making up the build context
    pub fn entries(&self) -> Vec<ArchiveEntry> {
        let mut entries = vec![ArchiveEntry::new(BUILD_FILE, self.build_file.as_bytes())];
        if self.mode == ScriptMode::CopyIn {
            entries.push(ArchiveEntry::new(SCRIPT_FILE, self.script.as_bytes()).with_mode(0o755));
        }
        entries
    }

    /// Encode the build context archive
    pub fn context(&self, encoder: &ArchiveEncoder) -> Result<Vec<u8>, ArchiveError> {
        encoder.encode(&self.entries())
    }
}
