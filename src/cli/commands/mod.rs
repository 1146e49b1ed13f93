//! cli::commands
//!
//! Built-in command descriptors.
//!
//! # Architecture
//!
//! Each built-in module exposes `command()`, returning a
//! [`CommandSpec`] that the dispatcher registers at construction.
//! Handlers receive [`crate::engine::CommandArgs`] and report fatal failures
//! through the execution context.

mod completion;
mod start;

pub use completion::completion;
pub use start::start;

use crate::engine::CommandSpec;

/// Commands that run without a prepared instance.
///
/// `init`, `repair`, `install`, `uninstall` and `render` are provided by
/// extensions and either never need the local instance or target a remote
/// server.
pub const IGNORE_ENTRY_POINT_COMMANDS: &[&str] = &[
    "init",
    "repair",
    "install",
    "uninstall",
    "render",
    start::NAME,
    completion::NAME,
];

/// The commands registered by default.
pub fn built_in_commands() -> Vec<CommandSpec> {
    vec![start::command(), completion::command()]
}
