//! completion command - Generate shell completion scripts

use anyhow::Result;
use clap::{Arg, ArgMatches};
use clap_complete::{generate, shells};

use crate::cli::args::Shell;
use crate::engine::{CommandArgs, CommandSpec, CommandValue};

pub const NAME: &str = "completion";
const DESCRIPTION: &str = "Generates shell completion scripts";

pub fn command() -> CommandSpec {
    CommandSpec::new(NAME, DESCRIPTION, completion).with_builder(|cmd| {
        cmd.arg(
            Arg::new("shell")
                .help("Shell to generate completions for")
                .required(true)
                .value_parser(clap::value_parser!(Shell)),
        )
    })
}

/// Generate shell completion scripts for the full command tree.
pub async fn completion(args: CommandArgs) -> Result<CommandValue> {
    let shell = selected_shell(&args.matches)?;
    let mut cmd = args.parser;
    let mut out = Vec::new();
    render(shell, &mut cmd, &mut out);

    let script = String::from_utf8(out)?;
    print!("{}", script);
    Ok(CommandValue::Text(script))
}

fn selected_shell(matches: &ArgMatches) -> Result<Shell> {
    matches
        .try_get_one::<Shell>("shell")?
        .copied()
        .ok_or_else(|| anyhow::anyhow!("a shell is required"))
}

fn render(shell: Shell, cmd: &mut clap::Command, out: &mut Vec<u8>) {
    let name = cmd.get_name().to_string();

    match shell {
        Shell::Bash => generate(shells::Bash, cmd, &name, out),
        Shell::Zsh => generate(shells::Zsh, cmd, &name, out),
        Shell::Fish => generate(shells::Fish, cmd, &name, out),
        Shell::PowerShell => generate(shells::PowerShell, cmd, &name, out),
    }
}
