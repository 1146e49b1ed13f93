//! engine::executor
//!
//! Runs one command handler inside the uniform event sequence.
//!
//! ```text
//! command.init, command.<name>.init
//!   -> handler
//!   -> command.success, command.<name>.success | command.error, command.<name>.error
//!   -> command.finish, command.<name>.finish
//! ```
//!
//! Handler failures (including panics) become `error` events and are not
//! returned to the caller. Deciding the exit code is left to the dispatcher.

use thiserror::Error;

use super::context::CommandArgs;
use super::events::EventBus;
use super::registry::CommandRegistry;

/// Errors from dispatching to a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ExecuteError {
    #[error("\"{0}\" command is not a valid command")]
    UnknownCommand(String),
}

/// Execute the registered command `name`.
pub async fn execute(
    registry: &CommandRegistry,
    bus: &EventBus,
    name: &str,
    args: CommandArgs,
) -> Result<(), ExecuteError> {
    let spec = registry
        .lookup(name)
        .ok_or_else(|| ExecuteError::UnknownCommand(name.to_string()))?;

    bus.command_init(name, &args);

    tracing::debug!(command = name, "running command handler");
    let outcome = match tokio::spawn(spec.handler().handle(args)).await {
        Ok(result) => result,
        Err(join_error) if join_error.is_panic() => {
            Err(anyhow::anyhow!("\"{}\" command panicked", name))
        }
        Err(join_error) => Err(anyhow::Error::new(join_error)),
    };

    match outcome {
        Ok(value) => {
            tracing::debug!(command = name, "command succeeded");
            bus.command_success(name, &value);
        }
        Err(err) => {
            tracing::debug!(command = name, error = %format!("{:#}", err), "command failed");
            bus.command_error(name, &err);
        }
    }
    bus.command_finish(name);

    Ok(())
}
