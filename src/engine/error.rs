//! engine::error
//!
//! Dispatcher errors and how fatal errors are reported to the user.

use thiserror::Error;

use crate::core::paths::PathsError;
use crate::instance::{LifecycleError, LocateError, ResolveError};
use crate::ui::output;
use crate::ui::prompts::PromptError;

use super::registry::RegistryError;

/// Errors that abort a dispatch.
#[derive(Debug, Error)]
pub enum CommanderError {
    #[error(transparent)]
    Locate(#[from] LocateError),

    #[error(transparent)]
    Resolve(#[from] ResolveError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Paths(#[from] PathsError),

    #[error("No value for password option")]
    Password(#[source] PromptError),

    #[error("An unexpected error ocurred while trying to execute the command:")]
    UnexpectedParser { detail: String },
}

impl CommanderError {
    /// The port that was already in use, if that is why startup failed.
    pub fn port_in_use(&self) -> Option<u16> {
        match self {
            CommanderError::Lifecycle(err) => err.port_in_use(),
            _ => None,
        }
    }

    /// Print the error, its causes, and any remediation hint.
    pub fn report(&self) {
        output::error(output::format_error_chain(self));
        if let CommanderError::UnexpectedParser { detail } = self {
            output::error(detail);
        }
        if let Some(port) = self.port_in_use() {
            output::error(port_hint(port));
        }
    }
}

/// Print a command failure reported through the execution context.
pub fn report_anyhow(err: &anyhow::Error) {
    output::error(output::format_error_chain(err.as_ref()));
    let port = err.chain().find_map(|cause| {
        cause
            .downcast_ref::<CommanderError>()
            .and_then(CommanderError::port_in_use)
            .or_else(|| cause.downcast_ref::<LifecycleError>().and_then(LifecycleError::port_in_use))
    });
    if let Some(port) = port {
        output::error(port_hint(port));
    }
}

fn port_hint(port: u16) -> String {
    format!("seems like there is already a server running in port: {}", port)
}
