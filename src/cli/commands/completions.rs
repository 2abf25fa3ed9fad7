//! Completions command - shell completion scripts

use crate::cli::args::{Cli, CompletionsArgs};
use crate::error::ArchwayResult;
use clap::CommandFactory;

/// Execute the completions command
pub fn execute(args: CompletionsArgs) -> ArchwayResult<()> {
    let mut command = Cli::command();
    let name = command.get_name().to_string();
    clap_complete::generate(args.shell, &mut command, name, &mut std::io::stdout());
    Ok(())
}
