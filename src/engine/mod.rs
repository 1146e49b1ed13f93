//! engine
//!
//! Command dispatch: registry, execution, events, and the dispatcher itself.
//!
//! # Architecture
//!
//! The [`Commander`] owns every collaborator and drives one dispatch per
//! [`Commander::start`] call:
//!
//! 1. **Pre-scan**: Inspect raw arguments for the command name and global flags
//! 2. **Prepare**: Prompt for a password if needed; locate, resolve and
//!    initialize the instance unless the command resolves it itself
//! 3. **Parse**: Hand the arguments to the parser built from the registry
//! 4. **Execute**: Run the matched handler inside the event sequence
//!
//! # Modules
//!
//! - [`commander`] - The dispatcher state machine
//! - [`registry`] - Command descriptors and the registry
//! - [`executor`] - Runs a handler inside the uniform event sequence
//! - [`events`] - Typed observer interface and a recording observer
//! - [`context`] - Execution context handed to handlers
//! - [`pipeline`] - Locate -> resolve -> initialize with events
//! - [`parser`] - Builds the argument parser
//! - [`error`] - Dispatcher errors and fatal error reporting
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use jsreport_cli::core::paths::StatePaths;
//! use jsreport_cli::engine::{CommandArgs, CommandSpec, CommandValue, Commander, CommanderOptions};
//! use jsreport_cli::instance::process::NodeProcessProvider;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let cwd = std::env::current_dir()?;
//! let provider = Arc::new(NodeProcessProvider::new(&cwd));
//! let mut commander = Commander::new(CommanderOptions::new(&cwd, StatePaths::from_home()?, provider))?;
//!
//! commander.register_command(CommandSpec::new("ping", "Checks the instance", |_args: CommandArgs| async {
//!     Ok::<_, anyhow::Error>(CommandValue::Text("pong".into()))
//! }))?;
//!
//! let code = commander.start(["ping"]).await;
//! std::process::exit(code.as_i32());
//! # }
//! ```

pub mod commander;
pub mod context;
pub mod error;
pub mod events;
pub mod executor;
pub mod parser;
pub mod pipeline;
pub mod registry;

pub use commander::{Commander, CommanderOptions, ExitCode};
pub use context::{CommandArgs, CommandValue, ExecutionContext, InstanceAccess};
pub use error::CommanderError;
pub use events::{CommandObserver, CommanderObserver, Event, EventBus, EventLog, StartInfo};
pub use executor::ExecuteError;
pub use parser::ParserSettings;
pub use pipeline::InstancePipeline;
pub use registry::{CommandHandler, CommandRegistry, CommandSpec, RegistryError};
