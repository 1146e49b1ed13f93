//! instance::lifecycle
//!
//! Brings an instance to the initialized state exactly once.
//!
//! # Invariants
//!
//! - An already initialized instance is returned untouched (`init()` is not
//!   called again)
//! - Initialization failure is never retried; it is returned to the caller,
//!   which treats it as fatal
//! - Outside verbose mode the instance is asked to silence its own logging
//!   before `init()` runs

use thiserror::Error;

use super::{InitError, SharedInstance};

/// Errors from initializing an instance.
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("An error has occurred when trying to initialize jsreport..")]
    InitFailed {
        #[source]
        source: InitError,
    },
}

impl LifecycleError {
    /// The port that was already in use, if that is why startup failed.
    pub fn port_in_use(&self) -> Option<u16> {
        match self {
            LifecycleError::InitFailed { source } => source.port_in_use(),
        }
    }
}

/// What `ensure_initialized` did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    /// The instance was already initialized; nothing ran.
    AlreadyInitialized,
    /// `init()` ran and succeeded.
    Initialized,
}

/// Ensure `instance` is initialized.
pub async fn ensure_initialized(
    instance: &SharedInstance,
    verbose: bool,
) -> Result<InitOutcome, LifecycleError> {
    if instance.is_initialized() {
        tracing::debug!("instance already initialized, skipping init()");
        return Ok(InitOutcome::AlreadyInitialized);
    }

    if !verbose {
        instance.silence_logging();
    }

    tracing::debug!("initializing instance");
    match instance.init().await {
        Ok(()) => {
            if !instance.is_initialized() {
                tracing::warn!("instance reported success from init() but is not marked initialized");
            }
            Ok(InitOutcome::Initialized)
        }
        Err(source) => {
            tracing::error!(error = %source, "instance initialization failed");
            Err(LifecycleError::InitFailed { source })
        }
    }
}
