//! start command - Start the instance in the working directory
//!
//! The instance is resolved and initialized by the command itself, then the
//! process is kept alive until interrupted.

use anyhow::{bail, Result};

use crate::engine::{CommandArgs, CommandSpec, CommandValue};
use crate::ui::output;

pub const NAME: &str = "start";
const DESCRIPTION: &str = "Starts a jsreport process in current working directory";

pub fn command() -> CommandSpec {
    CommandSpec::new(NAME, DESCRIPTION, start)
}

/// Resolve, initialize, and keep the instance running.
pub async fn start(args: CommandArgs) -> Result<CommandValue> {
    let context = args.context.clone();
    match run(&args).await {
        Ok(value) => Ok(value),
        Err(err) => {
            context.on_error(&err);
            Err(err)
        }
    }
}

async fn run(args: &CommandArgs) -> Result<CommandValue> {
    if args.globals.server_url.is_some() {
        bail!("serverUrl option is not supported in this command");
    }

    let context = &args.context;
    let verbosity = context.verbosity();

    output::verbose("resolving jsreport location..", verbosity);
    let instance = context.get_instance().await?;

    output::verbose("starting jsreport..", verbosity);
    let instance = context.init_instance(&instance).await?;

    output::verbose("jsreport successfully started", verbosity);
    context.keep_process_alive();

    Ok(CommandValue::Instance(instance))
}
