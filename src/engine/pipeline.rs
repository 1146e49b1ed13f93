//! engine::pipeline
//!
//! Locate -> resolve -> initialize, with the matching `instance.*` events.
//!
//! The last resolution is kept so that an entry point completing a second
//! time after resolution is caught at the next check point: after
//! initialization, and again by the dispatcher right before parsing.

use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::error::CommanderError;
use super::events::EventBus;
use crate::instance::{ensure_initialized, locate, InitOutcome, Resolution, Resolver, SharedInstance};
use crate::ui::output::{self, Verbosity};

/// Instance pipeline for one working directory.
#[derive(Debug, Clone)]
pub struct InstancePipeline {
    cwd: PathBuf,
    resolver: Resolver,
    verbose: bool,
    bus: EventBus,
    resolution: Arc<Mutex<Option<Resolution>>>,
}

impl InstancePipeline {
    pub fn new(cwd: PathBuf, resolver: Resolver, verbose: bool, bus: EventBus) -> Self {
        Self {
            cwd,
            resolver,
            verbose,
            bus,
            resolution: Arc::new(Mutex::new(None)),
        }
    }

    /// Locate and resolve the instance.
    ///
    /// Emits `instance.lookup` once the installation is confirmed, then
    /// `instance.found` (entry point) or `instance.default` once resolved.
    pub async fn get_instance(&self) -> Result<SharedInstance, CommanderError> {
        let info = locate(&self.cwd)?;
        self.bus.instance_lookup(&info);

        let verbosity = Verbosity::from_flag(self.verbose);
        match &info.entry_point_path {
            Some(entry_point) if !info.is_default => output::verbose(
                format!("using jsreport instance found in: {}", entry_point.display()),
                verbosity,
            ),
            _ => output::verbose(
                format!(
                    "no entry point was found, creating a default instance using: require(\"{}\")()",
                    info.package
                ),
                verbosity,
            ),
        }

        let resolution = self.resolver.resolve_watched(&info, self.verbose).await?;
        let instance = Arc::clone(resolution.instance());
        *self.last_resolution() = Some(resolution);

        match &info.entry_point_path {
            Some(entry_point) if !info.is_default => {
                self.bus.instance_found(&instance, entry_point)
            }
            _ => self.bus.instance_default(&instance, info.package),
        }
        Ok(instance)
    }

    /// Initialize `instance` unless it already is.
    ///
    /// `instance.initializing` is only emitted when `init()` actually runs;
    /// `instance.initialized` is emitted either way.
    pub async fn init_instance(
        &self,
        instance: &SharedInstance,
    ) -> Result<SharedInstance, CommanderError> {
        self.verify_resolution()?;
        if !instance.is_initialized() {
            self.bus.instance_initializing();
        }

        let outcome = ensure_initialized(instance, self.verbose).await?;
        if outcome == InitOutcome::AlreadyInitialized {
            tracing::debug!("reusing initialized instance");
        }
        self.verify_resolution()?;

        self.bus.instance_initialized(instance);
        Ok(Arc::clone(instance))
    }

    /// Resolve and initialize.
    pub async fn ready_instance(&self) -> Result<SharedInstance, CommanderError> {
        let instance = self.get_instance().await?;
        self.init_instance(&instance).await
    }

    /// Fail if the entry point behind the last resolution completed again.
    pub fn verify_resolution(&self) -> Result<(), CommanderError> {
        match self.last_resolution().as_ref() {
            Some(resolution) => Ok(resolution.verify()?),
            None => Ok(()),
        }
    }

    fn last_resolution(&self) -> MutexGuard<'_, Option<Resolution>> {
        self.resolution.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
