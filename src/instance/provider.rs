//! instance::provider
//!
//! Pluggable capability that constructs and loads runtime instances.
//!
//! # Design
//!
//! The resolver never loads modules itself. It asks an [`InstanceProvider`]
//! to either default-construct an installed package or load an entry-point
//! file, and then applies the resolution rules to whatever the provider
//! returns. This keeps the resolution state machine testable without real
//! module loading (see [`crate::instance::mock`]).
//!
//! # Entry-point contract
//!
//! An entry point exports one of:
//! - a ready instance ([`ExportValue::Instance`])
//! - a function receiving a [`ResolveHandle`] ([`ExportValue::Function`]),
//!   which may return a value, return a deferred value, or return nothing and
//!   call the handle later
//! - anything else ([`ExportValue::Other`]), which is rejected

use std::fmt;
use std::future::Future;
use std::path::Path;
use std::pin::Pin;

use async_trait::async_trait;
use thiserror::Error;

use super::guard::ResolveHandle;
use super::locator::Package;
use super::SharedInstance;

/// Boxed future for values an entry point produces later.
pub type Deferred<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Function exported by an entry point.
pub type EntryPointFn = Box<dyn FnOnce(ResolveHandle) -> EntryPointReturn + Send>;

/// A value exported by an entry point or produced by its resolution.
pub enum ExportValue {
    Instance(SharedInstance),
    Function(EntryPointFn),
    /// Unrecognized value, described by its kind (e.g. "object", "string").
    Other(String),
}

impl ExportValue {
    /// Wrap a closure as an exported function.
    pub fn function<F>(f: F) -> Self
    where
        F: FnOnce(ResolveHandle) -> EntryPointReturn + Send + 'static,
    {
        ExportValue::Function(Box::new(f))
    }

    /// Short description of the value kind.
    pub fn kind(&self) -> &str {
        match self {
            ExportValue::Instance(_) => "instance",
            ExportValue::Function(_) => "function",
            ExportValue::Other(kind) => kind,
        }
    }
}

impl fmt::Debug for ExportValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportValue::Instance(instance) => f.debug_tuple("Instance").field(instance).finish(),
            ExportValue::Function(_) => f.write_str("Function(..)"),
            ExportValue::Other(kind) => f.debug_tuple("Other").field(kind).finish(),
        }
    }
}

impl From<SharedInstance> for ExportValue {
    fn from(instance: SharedInstance) -> Self {
        ExportValue::Instance(instance)
    }
}

/// What an exported entry-point function returned.
pub enum EntryPointReturn {
    /// Returned nothing; the function resolves through its handle.
    Nothing,
    /// Returned a value synchronously.
    Value(ExportValue),
    /// Returned a deferred value.
    Deferred(Deferred<anyhow::Result<ExportValue>>),
}

impl EntryPointReturn {
    /// Build a deferred return from any future.
    pub fn deferred<F>(future: F) -> Self
    where
        F: Future<Output = anyhow::Result<ExportValue>> + Send + 'static,
    {
        EntryPointReturn::Deferred(Box::pin(future))
    }
}

impl fmt::Debug for EntryPointReturn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryPointReturn::Nothing => f.write_str("Nothing"),
            EntryPointReturn::Value(value) => f.debug_tuple("Value").field(value).finish(),
            EntryPointReturn::Deferred(_) => f.write_str("Deferred(..)"),
        }
    }
}

/// Options for default construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DefaultOptions {
    /// Construct with runtime logging suppressed.
    pub quiet_logging: bool,
}

/// Errors from loading an entry point.
#[derive(Debug, Error)]
pub enum LoadError {
    /// The entry-point module does not exist.
    #[error("module not found")]
    NotFound,

    /// The module exists but failed to load.
    #[error("{0:#}")]
    Failed(anyhow::Error),
}

/// Capability that constructs and loads runtime instances.
#[async_trait]
pub trait InstanceProvider: Send + Sync {
    /// Invoke the package's factory export.
    fn create_default(
        &self,
        package: Package,
        options: DefaultOptions,
    ) -> anyhow::Result<SharedInstance>;

    /// Load the module at `path` and return its export.
    async fn load_entry_point(&self, path: &Path) -> Result<ExportValue, LoadError>;
}
