//! engine::context
//!
//! Execution context handed to a command handler.
//!
//! # Invariants
//!
//! - Built once per dispatch and passed to exactly one handler
//! - Exactly one of the two instance access modes is available: a ready
//!   instance, or the deferred pipeline for commands that resolve the
//!   instance themselves

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::ArgMatches;

use super::error::{self, CommanderError};
use super::pipeline::InstancePipeline;
use crate::cli::args::GlobalOptions;
use crate::core::paths::StatePaths;
use crate::instance::SharedInstance;
use crate::ui::output::Verbosity;

/// How a command reaches the instance.
#[derive(Debug)]
pub enum InstanceAccess {
    /// Resolved and initialized before the handler runs.
    Ready(SharedInstance),
    /// Resolution deferred to the command.
    Deferred(InstancePipeline),
}

/// Context shared with the command being dispatched.
#[derive(Debug)]
pub struct ExecutionContext {
    cwd: PathBuf,
    sock_path: PathBuf,
    worker_sock_path: PathBuf,
    verbose: bool,
    access: InstanceAccess,
    failed: AtomicBool,
    keep_alive: AtomicBool,
}

impl ExecutionContext {
    pub fn new(cwd: PathBuf, paths: &StatePaths, verbose: bool, access: InstanceAccess) -> Self {
        Self {
            cwd,
            sock_path: paths.sock_path(),
            worker_sock_path: paths.worker_sock_path(),
            verbose,
            access,
            failed: AtomicBool::new(false),
            keep_alive: AtomicBool::new(false),
        }
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn sock_path(&self) -> &Path {
        &self.sock_path
    }

    pub fn worker_sock_path(&self) -> &Path {
        &self.worker_sock_path
    }

    pub fn verbose(&self) -> bool {
        self.verbose
    }

    pub fn verbosity(&self) -> Verbosity {
        Verbosity::from_flag(self.verbose)
    }

    /// The ready instance, absent when resolution is deferred.
    pub fn instance(&self) -> Option<&SharedInstance> {
        match &self.access {
            InstanceAccess::Ready(instance) => Some(instance),
            InstanceAccess::Deferred(_) => None,
        }
    }

    /// The deferred resolution pipeline, absent when an instance is ready.
    pub fn pipeline(&self) -> Option<&InstancePipeline> {
        match &self.access {
            InstanceAccess::Ready(_) => None,
            InstanceAccess::Deferred(pipeline) => Some(pipeline),
        }
    }

    /// Locate and resolve the instance for the working directory.
    ///
    /// Returns the ready instance as-is when one was provided.
    pub async fn get_instance(&self) -> Result<SharedInstance, CommanderError> {
        match &self.access {
            InstanceAccess::Ready(instance) => Ok(Arc::clone(instance)),
            InstanceAccess::Deferred(pipeline) => pipeline.get_instance().await,
        }
    }

    /// Initialize `instance` unless it already is.
    pub async fn init_instance(
        &self,
        instance: &SharedInstance,
    ) -> Result<SharedInstance, CommanderError> {
        match &self.access {
            InstanceAccess::Ready(ready) => Ok(Arc::clone(ready)),
            InstanceAccess::Deferred(pipeline) => pipeline.init_instance(instance).await,
        }
    }

    /// Report a fatal command failure.
    ///
    /// Prints the error and makes the dispatch end with a failure exit code.
    pub fn on_error(&self, err: &anyhow::Error) {
        error::report_anyhow(err);
        self.failed.store(true, Ordering::SeqCst);
    }

    pub fn has_failed(&self) -> bool {
        self.failed.load(Ordering::SeqCst)
    }

    /// Ask the dispatcher not to return until the process is interrupted.
    pub fn keep_process_alive(&self) {
        self.keep_alive.store(true, Ordering::SeqCst);
    }

    pub fn keeps_process_alive(&self) -> bool {
        self.keep_alive.load(Ordering::SeqCst)
    }
}

/// Arguments passed to a command handler.
#[derive(Debug, Clone)]
pub struct CommandArgs {
    /// Name of the dispatched command.
    pub command: String,
    /// Parsed matches of the command's sub-command.
    pub matches: ArgMatches,
    pub globals: GlobalOptions,
    pub context: Arc<ExecutionContext>,
    /// The full parser, e.g. for generating completions.
    pub parser: clap::Command,
}

/// Value produced by a successful command.
#[derive(Debug, Clone)]
pub enum CommandValue {
    Empty,
    Text(String),
    Json(serde_json::Value),
    Instance(SharedInstance),
}

impl CommandValue {
    pub fn instance(&self) -> Option<&SharedInstance> {
        match self {
            CommandValue::Instance(instance) => Some(instance),
            _ => None,
        }
    }
}
