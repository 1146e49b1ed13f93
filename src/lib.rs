//! jsreport-cli - Command-line dispatcher for jsreport instances
//!
//! The dispatcher discovers or constructs the reporting runtime instance for
//! the working directory, brings it to a ready state, and routes command
//! invocations to registered handlers while broadcasting lifecycle events.
//!
//! # Architecture
//!
//! The codebase follows a layered architecture:
//!
//! - [`cli`] - Global options, argument pre-scan, built-in commands
//! - [`engine`] - Dispatcher state machine, command registry/executor, events
//! - [`instance`] - Instance location, resolution and initialization
//! - [`core`] - State paths, CLI configuration, project descriptor
//! - [`ui`] - User-facing output and password prompt
//!
//! # Correctness Invariants
//!
//! 1. A command needing an instance only runs after the instance is resolved
//!    and initialized
//! 2. An instance's `init()` runs at most once
//! 3. An entry point resolves its instance at most once; a second attempt is
//!    fatal
//! 4. Every dispatched command emits exactly one terminal event followed by
//!    exactly one `finish` event

pub mod cli;
pub mod core;
pub mod engine;
pub mod instance;
pub mod ui;
