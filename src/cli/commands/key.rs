//! Key command - print the cache key a build would use

use crate::cli::args::KeyArgs;
use crate::cli::commands::BuildInputs;
use crate::config::Config;
use crate::error::{ArchwayError, ArchwayResult};
use crate::orchestration::BuildRecipe;

/// Execute the key command
pub async fn execute(args: KeyArgs, config: &Config) -> ArchwayResult<()> {
    println!("{}", cache_key(&BuildInputs::resolve(&args.build, config))?);
    Ok(())
}

fn cache_key(inputs: &BuildInputs) -> ArchwayResult<String> {
    let script = match inputs.build_script.as_deref() {
        Some(script) if !script.trim().is_empty() => script,
        _ => return Err(ArchwayError::MissingBuildScript),
    };
    crate::cache::validate_namespace(&inputs.namespace)?;

    let recipe = BuildRecipe::synthesize(&inputs.image, &inputs.shell, script);
    Ok(recipe.cache_key(&inputs.namespace).to_string())
}
