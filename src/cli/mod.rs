//! cli
//!
//! Command-line interface layer.
//!
//! # Responsibilities
//!
//! - Declare the global options and pre-scan raw arguments
//! - Provide the built-in commands
//! - Wire configuration, state paths and the process-backed provider into a
//!   [`crate::engine::Commander`] and dispatch the process arguments
//!
//! # Architecture
//!
//! The CLI layer is thin. Everything with state lives in [`crate::engine`]
//! and [`crate::instance`].

pub mod args;
pub mod commands;

pub use args::{GlobalOptions, PreScan, Shell};

use std::sync::Arc;

use anyhow::{Context as _, Result};

use crate::core::config::Config;
use crate::core::paths::StatePaths;
use crate::engine::{Commander, CommanderOptions, ExitCode};
use crate::instance::process::NodeProcessProvider;

/// Run the CLI application.
///
/// This is the main entry point called from `main.rs`. `args` excludes the
/// program name.
pub async fn run(args: Vec<String>) -> Result<ExitCode> {
    let cwd = std::env::current_dir().context("failed to read the working directory")?;

    let home_paths = StatePaths::from_home()?;
    let config = Config::load(&home_paths)?;
    let paths = config.state_paths(&home_paths);
    tracing::debug!(root = %paths.root().display(), config = ?config.path(), "loaded configuration");

    let provider = Arc::new(NodeProcessProvider::new(&cwd));
    let options = CommanderOptions::new(&cwd, paths, provider)
        .ignoring_entry_point(config.ignore_entry_point().iter().cloned())
        .with_verbose(config.verbose());

    let commander = Commander::new(options)?;
    Ok(commander.start(args).await)
}
