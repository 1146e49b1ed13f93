//! instance
//!
//! Discovery, resolution, and initialization of the reporting runtime instance.
//!
//! # Pipeline
//!
//! ```text
//! locate(cwd) -> InstanceInfo -> Resolver::resolve -> ensure_initialized -> ready instance
//! ```
//!
//! # Modules
//!
//! - [`locator`] - Decides which installed package or entry point to use
//! - [`provider`] - Pluggable capability that constructs/loads instances
//! - [`guard`] - One-shot guard for entry-point resolution
//! - [`resolver`] - Turns an `InstanceInfo` into a concrete instance
//! - [`lifecycle`] - Brings an instance to the initialized state exactly once
//! - [`process`] - Provider that runs the runtime as a `node` child process
//! - [`mock`] - Deterministic provider and instance for tests
//!
//! # Invariants
//!
//! - The instance is an opaque handle; this crate only initializes it, never
//!   destroys it
//! - `init()` runs at most once per instance, guarded by `is_initialized()`

pub mod guard;
pub mod lifecycle;
pub mod locator;
pub mod mock;
pub mod process;
pub mod provider;
pub mod resolver;

pub use guard::{GuardState, GuardWatch, ResolutionGuard, ResolveHandle};
pub use lifecycle::{ensure_initialized, InitOutcome, LifecycleError};
pub use locator::{locate, InstanceInfo, InstanceSource, LocateError, Package};
pub use provider::{DefaultOptions, EntryPointReturn, ExportValue, InstanceProvider, LoadError};
pub use resolver::{Resolution, ResolveError, Resolver};

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

/// Errors reported by an instance's `init()`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum InitError {
    /// The runtime could not bind its port.
    #[error("address already in use (port {port})")]
    AddrInUse { port: u16 },

    /// Any other startup failure.
    #[error("{0}")]
    Failed(String),
}

impl InitError {
    /// The offending port if this is a port-already-in-use failure.
    pub fn port_in_use(&self) -> Option<u16> {
        match self {
            InitError::AddrInUse { port } => Some(*port),
            InitError::Failed(_) => None,
        }
    }
}

/// Handle to a reporting runtime.
///
/// Implementations must flip `is_initialized()` to `true` once `init()`
/// succeeds.
#[async_trait]
pub trait ServiceInstance: Send + Sync + fmt::Debug {
    /// Whether `init()` already completed successfully.
    fn is_initialized(&self) -> bool;

    /// Start the runtime.
    async fn init(&self) -> Result<(), InitError>;

    /// Ask the runtime to suppress its own diagnostic logging.
    ///
    /// Best-effort; called before `init()` when not in verbose mode.
    fn silence_logging(&self) {}
}

/// Shared handle to a runtime instance.
pub type SharedInstance = Arc<dyn ServiceInstance>;

/// Whether two handles point at the same instance.
pub fn same_instance(a: &SharedInstance, b: &SharedInstance) -> bool {
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}
