//! instance::locator
//!
//! Decides where the runtime instance comes from.
//!
//! # Algorithm
//!
//! 1. Detect the installed package. A dependency declared in the project
//!    descriptor wins over a raw `node_modules` scan, and the full package is
//!    preferred over the core variant.
//! 2. If the descriptor declares `jsreport.entryPoint`, resolve it relative to
//!    the working directory and use it.
//! 3. Otherwise default-construct the detected package.
//!
//! A project with neither package discoverable cannot run any command that
//! needs an instance; that is reported as [`LocateError::NotInstalled`].

use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::core::project::{ProjectDescriptor, ProjectError};

/// Directory scanned when no dependency is declared.
pub const MODULES_DIR: &str = "node_modules";

/// Installable runtime packages, in order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Package {
    /// `jsreport`
    Full,
    /// `jsreport-core`
    Core,
}

impl Package {
    /// All packages in order of preference.
    pub const ALL: [Package; 2] = [Package::Full, Package::Core];

    /// Package name as installed.
    pub fn name(self) -> &'static str {
        match self {
            Package::Full => "jsreport",
            Package::Core => "jsreport-core",
        }
    }
}

impl fmt::Display for Package {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Where the instance will come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceSource {
    DefaultPackage,
    DefaultCorePackage,
    EntryPointFile,
}

/// Result of locating an instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceInfo {
    pub source: InstanceSource,
    /// Absolute entry-point path, only for `EntryPointFile`.
    pub entry_point_path: Option<PathBuf>,
    pub is_default: bool,
    /// Installed package detected for the project.
    pub package: Package,
}

impl InstanceInfo {
    fn default_for(package: Package) -> Self {
        let source = match package {
            Package::Full => InstanceSource::DefaultPackage,
            Package::Core => InstanceSource::DefaultCorePackage,
        };

        Self {
            source,
            entry_point_path: None,
            is_default: true,
            package,
        }
    }
}

/// Errors from locating an instance.
#[derive(Debug, Error)]
pub enum LocateError {
    #[error("Couldn't find a jsreport installation necessary to process the command, try to install jsreport first")]
    NotInstalled,

    #[error(transparent)]
    Project(#[from] ProjectError),
}

/// Locate the instance to use for `cwd`.
pub fn locate(cwd: &Path) -> Result<InstanceInfo, LocateError> {
    let descriptor = ProjectDescriptor::read(cwd)?;
    let package = detect_package(cwd, descriptor.as_ref()).ok_or(LocateError::NotInstalled)?;

    let entry_point = descriptor.as_ref().and_then(ProjectDescriptor::entry_point);

    Ok(match entry_point {
        Some(entry) => InstanceInfo {
            source: InstanceSource::EntryPointFile,
            entry_point_path: Some(cwd.join(entry)),
            is_default: false,
            package,
        },
        None => InstanceInfo::default_for(package),
    })
}

/// Detect which runtime package is available for the project.
pub fn detect_package(cwd: &Path, descriptor: Option<&ProjectDescriptor>) -> Option<Package> {
    if let Some(descriptor) = descriptor {
        if let Some(package) = Package::ALL.into_iter().find(|p| descriptor.declares(p.name())) {
            return Some(package);
        }
    }

    Package::ALL
        .into_iter()
        .find(|p| cwd.join(MODULES_DIR).join(p.name()).is_dir())
}
