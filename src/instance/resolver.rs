//! instance::resolver
//!
//! Turns an [`InstanceInfo`] into a concrete runtime instance.
//!
//! # Resolution rules
//!
//! - Default sources invoke the package factory through the provider. The
//!   full package is constructed with logging suppressed unless verbose.
//! - Entry-point sources load the module through the provider:
//!   - an exported instance is used directly
//!   - an exported function is called with a one-shot [`ResolveHandle`]; the
//!     first completion (return value, deferred value, or handle call) wins
//!     and any other completion is [`ResolveError::DuplicateResolution`]
//!   - anything that does not end up as an instance is rejected with an error
//!     naming the entry-point path
//! - A [`Resolution`] keeps watching the guard, so a completion that arrives
//!   after the instance was produced is still reported as a duplicate by
//!   [`Resolution::verify`]

use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;

use super::guard::{GuardState, GuardWatch, ResolutionGuard};
use super::locator::{InstanceInfo, InstanceSource, Package};
use super::provider::{DefaultOptions, EntryPointReturn, ExportValue, InstanceProvider, LoadError};
use super::SharedInstance;

/// Errors from resolving an instance.
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("failed to create a default instance using require(\"{package}\")(): {error:#}")]
    Construction {
        package: Package,
        error: anyhow::Error,
    },

    #[error("Couldn't find a jsreport entry point in: {}", path.display())]
    EntryPointNotFound { path: PathBuf },

    #[error("An error has occurred when trying to find a jsreport instance in {}: {error:#}", path.display())]
    EntryPointFailed { path: PathBuf, error: anyhow::Error },

    #[error("Entry point must return a valid jsreport instance or a function resolving to a jsreport instance, check file in {}", path.display())]
    InvalidExport { path: PathBuf },

    #[error("Promise in entry point must resolve to a jsreport instance, check file in {}", path.display())]
    InvalidResolvedValue { path: PathBuf },

    #[error("jsreport instance is already resolved, are you using promise and callback at the same time? you should only use one way to resolve the instance from entry point, check file in {}", path.display())]
    DuplicateResolution { path: PathBuf },

    #[error("Entry point finished without resolving a jsreport instance, check file in {}", path.display())]
    Unresolved { path: PathBuf },

    #[error("instance info for an entry point is missing its path")]
    MissingEntryPointPath,
}

impl ResolveError {
    /// Whether this is the duplicate-resolution protocol violation.
    pub fn is_duplicate_resolution(&self) -> bool {
        matches!(self, ResolveError::DuplicateResolution { .. })
    }
}

/// A resolved instance.
#[derive(Debug, Clone)]
pub struct Resolution {
    instance: SharedInstance,
    entry_point: Option<(PathBuf, GuardWatch)>,
}

impl Resolution {
    fn direct(instance: SharedInstance) -> Self {
        Self {
            instance,
            entry_point: None,
        }
    }

    pub fn instance(&self) -> &SharedInstance {
        &self.instance
    }

    pub fn into_instance(self) -> SharedInstance {
        self.instance
    }

    /// Fail if the entry point attempted another completion since it
    /// resolved.
    pub fn verify(&self) -> Result<(), ResolveError> {
        match &self.entry_point {
            Some((path, watch)) if watch.duplicate_attempted() => {
                Err(ResolveError::DuplicateResolution { path: path.clone() })
            }
            _ => Ok(()),
        }
    }
}

/// Resolves instances through an [`InstanceProvider`].
#[derive(Clone)]
pub struct Resolver {
    provider: Arc<dyn InstanceProvider>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver").finish_non_exhaustive()
    }
}

impl Resolver {
    pub fn new(provider: Arc<dyn InstanceProvider>) -> Self {
        Self { provider }
    }

    /// Produce the instance described by `info`.
    pub async fn resolve(
        &self,
        info: &InstanceInfo,
        verbose: bool,
    ) -> Result<SharedInstance, ResolveError> {
        self.resolve_watched(info, verbose)
            .await
            .map(Resolution::into_instance)
    }

    /// Like [`Resolver::resolve`], keeping the means to detect a later
    /// duplicate completion.
    pub async fn resolve_watched(
        &self,
        info: &InstanceInfo,
        verbose: bool,
    ) -> Result<Resolution, ResolveError> {
        match info.source {
            InstanceSource::DefaultPackage | InstanceSource::DefaultCorePackage => self
                .create_default(info.package, verbose)
                .map(Resolution::direct),
            InstanceSource::EntryPointFile => {
                let path = info
                    .entry_point_path
                    .as_deref()
                    .ok_or(ResolveError::MissingEntryPointPath)?;
                self.resolve_entry_point(path).await
            }
        }
    }

    fn create_default(&self, package: Package, verbose: bool) -> Result<SharedInstance, ResolveError> {
        let options = DefaultOptions {
            quiet_logging: package == Package::Full && !verbose,
        };

        tracing::debug!(%package, ?options, "creating default instance");
        self.provider
            .create_default(package, options)
            .map_err(|error| ResolveError::Construction { package, error })
    }

    async fn resolve_entry_point(&self, path: &Path) -> Result<Resolution, ResolveError> {
        tracing::debug!(path = %path.display(), "loading entry point");

        let export = self
            .provider
            .load_entry_point(path)
            .await
            .map_err(|e| match e {
                LoadError::NotFound => ResolveError::EntryPointNotFound {
                    path: path.to_path_buf(),
                },
                LoadError::Failed(error) => ResolveError::EntryPointFailed {
                    path: path.to_path_buf(),
                    error,
                },
            })?;

        match export {
            ExportValue::Instance(instance) => Ok(Resolution::direct(instance)),
            ExportValue::Function(function) => run_entry_function(function, path).await,
            ExportValue::Other(kind) => {
                tracing::debug!(%kind, "entry point export is not an instance");
                Err(ResolveError::InvalidExport {
                    path: path.to_path_buf(),
                })
            }
        }
    }
}

async fn run_entry_function(
    function: super::provider::EntryPointFn,
    path: &Path,
) -> Result<Resolution, ResolveError> {
    let guard = ResolutionGuard::new();
    let watch = guard.watch();
    let instance = settle_entry_function(function, guard, path).await?;

    let resolution = Resolution {
        instance,
        entry_point: Some((path.to_path_buf(), watch)),
    };
    resolution.verify()?;
    Ok(resolution)
}

async fn settle_entry_function(
    function: super::provider::EntryPointFn,
    guard: ResolutionGuard,
    path: &Path,
) -> Result<SharedInstance, ResolveError> {
    let duplicate = || ResolveError::DuplicateResolution {
        path: path.to_path_buf(),
    };

    let returned = function(guard.handle());

    let completion = match returned {
        EntryPointReturn::Value(value) => {
            guard.settle(true).map_err(|_| duplicate())?;
            Ok(value)
        }
        EntryPointReturn::Deferred(deferred) => {
            if guard.state() != GuardState::Unresolved {
                return Err(duplicate());
            }
            let settled = deferred.await;
            guard.settle(settled.is_ok()).map_err(|_| duplicate())?;
            return match settled {
                Ok(ExportValue::Instance(instance)) => Ok(instance),
                Ok(_) => Err(ResolveError::InvalidResolvedValue {
                    path: path.to_path_buf(),
                }),
                Err(error) => Err(ResolveError::EntryPointFailed {
                    path: path.to_path_buf(),
                    error,
                }),
            };
        }
        EntryPointReturn::Nothing => guard.wait().await.ok_or_else(|| ResolveError::Unresolved {
            path: path.to_path_buf(),
        })?,
    };

    match completion {
        Ok(ExportValue::Instance(instance)) => Ok(instance),
        Ok(_) => Err(ResolveError::InvalidExport {
            path: path.to_path_buf(),
        }),
        Err(error) => Err(ResolveError::EntryPointFailed {
            path: path.to_path_buf(),
            error,
        }),
    }
}
