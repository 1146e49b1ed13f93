//! engine::registry
//!
//! Command descriptors and the registry that owns them.
//!
//! # Invariants
//!
//! - Command names are non-empty and unique within a registry
//! - Descriptors are immutable once registered; lookups return the same
//!   `Arc` that registration returned

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use thiserror::Error;

use super::context::{CommandArgs, CommandValue};

/// Type alias for handler futures.
///
/// Handlers run on their own task, so the future must be `Send + 'static`.
pub type HandlerFut = Pin<Box<dyn Future<Output = anyhow::Result<CommandValue>> + Send>>;

/// Customizes the parser sub-command for one command.
pub type OptionBuilder = Arc<dyn Fn(clap::Command) -> clap::Command + Send + Sync>;

/// Runs a command.
pub trait CommandHandler: Send + Sync {
    fn handle(&self, args: CommandArgs) -> HandlerFut;
}

impl<F, Fut> CommandHandler for F
where
    F: Fn(CommandArgs) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<CommandValue>> + Send + 'static,
{
    fn handle(&self, args: CommandArgs) -> HandlerFut {
        Box::pin(self(args))
    }
}

/// Errors from registering a command.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("command name must not be empty")]
    EmptyName,

    #[error("\"{0}\" command is already registered")]
    Duplicate(String),
}

/// A command descriptor.
#[derive(Clone)]
pub struct CommandSpec {
    name: String,
    description: String,
    builder: Option<OptionBuilder>,
    handler: Arc<dyn CommandHandler>,
}

impl fmt::Debug for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandSpec")
            .field("name", &self.name)
            .field("description", &self.description)
            .field("builder", &self.builder.is_some())
            .finish_non_exhaustive()
    }
}

impl CommandSpec {
    /// Describe a command run by `handler`.
    pub fn new<F, Fut>(name: impl Into<String>, description: impl Into<String>, handler: F) -> Self
    where
        F: Fn(CommandArgs) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<CommandValue>> + Send + 'static,
    {
        Self::with_handler(name, description, Arc::new(handler))
    }

    /// Describe a command run by an existing handler.
    pub fn with_handler(
        name: impl Into<String>,
        description: impl Into<String>,
        handler: Arc<dyn CommandHandler>,
    ) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            builder: None,
            handler,
        }
    }

    /// Customize the command's options.
    pub fn with_builder<B>(mut self, builder: B) -> Self
    where
        B: Fn(clap::Command) -> clap::Command + Send + Sync + 'static,
    {
        self.builder = Some(Arc::new(builder));
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn handler(&self) -> Arc<dyn CommandHandler> {
        Arc::clone(&self.handler)
    }

    /// Parser sub-command for this descriptor.
    pub fn to_clap(&self) -> clap::Command {
        let command = clap::Command::new(self.name.clone()).about(self.description.clone());
        match &self.builder {
            Some(builder) => builder(command),
            None => command,
        }
    }
}

/// Registered commands in registration order.
#[derive(Debug, Default)]
pub struct CommandRegistry {
    commands: Vec<Arc<CommandSpec>>,
    index: HashMap<String, usize>,
}

impl CommandRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a command.
    pub fn register(&mut self, spec: CommandSpec) -> Result<Arc<CommandSpec>, RegistryError> {
        if spec.name.trim().is_empty() {
            return Err(RegistryError::EmptyName);
        }
        if self.index.contains_key(&spec.name) {
            return Err(RegistryError::Duplicate(spec.name));
        }

        let spec = Arc::new(spec);
        self.index.insert(spec.name.clone(), self.commands.len());
        self.commands.push(Arc::clone(&spec));
        Ok(spec)
    }

    pub fn lookup(&self, name: &str) -> Option<Arc<CommandSpec>> {
        self.index.get(name).map(|&i| Arc::clone(&self.commands[i]))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.index.contains_key(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.commands.iter().map(|c| c.name()).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<CommandSpec>> {
        self.commands.iter()
    }

    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }
}
