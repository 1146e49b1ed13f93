//! core::paths
//!
//! Centralized path routing for the CLI state directory.
//!
//! # Storage Layout
//!
//! All CLI state is stored under a single root directory (`~/.jsreport` by
//! default):
//! - `cli.toml` - Optional CLI configuration
//! - `sock/` - Main socket directory handed to commands
//! - `sock/workerSock/` - Worker socket directory handed to commands
//!
//! Directories are created lazily by [`StatePaths::ensure`], the first time an
//! execution context is built. Directories that already exist are not an error.
//!
//! # Example
//!
//! ```
//! use jsreport_cli::core::paths::StatePaths;
//! use std::path::PathBuf;
//!
//! let paths = StatePaths::new(PathBuf::from("/home/me/.jsreport"));
//!
//! assert_eq!(paths.sock_path(), PathBuf::from("/home/me/.jsreport/sock"));
//! assert_eq!(
//!     paths.worker_sock_path(),
//!     PathBuf::from("/home/me/.jsreport/sock/workerSock")
//! );
//! ```

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;

/// Name of the root state directory under the user's home.
pub const ROOT_DIR_NAME: &str = ".jsreport";

/// Errors from state directory handling.
#[derive(Debug, Error)]
pub enum PathsError {
    #[error("Couldn't detect the user home folder")]
    NoHomeDir,

    #[error("failed to create directory '{path}': {source}")]
    CreateDir { path: PathBuf, source: io::Error },
}

/// State directory layout.
///
/// # Invariants
///
/// - `sock_path()` is always nested under `root`
/// - `worker_sock_path()` is always nested under `sock_path()`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    root: PathBuf,
}

impl StatePaths {
    /// Create a layout rooted at an explicit directory.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the default layout rooted at `~/.jsreport`.
    pub fn from_home() -> Result<Self, PathsError> {
        let home = dirs::home_dir().ok_or(PathsError::NoHomeDir)?;
        Ok(Self::new(home.join(ROOT_DIR_NAME)))
    }

    /// Root state directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Main socket directory (`<root>/sock`).
    pub fn sock_path(&self) -> PathBuf {
        self.root.join("sock")
    }

    /// Worker socket directory (`<root>/sock/workerSock`).
    pub fn worker_sock_path(&self) -> PathBuf {
        self.sock_path().join("workerSock")
    }

    /// Default location of the CLI config file (`<root>/cli.toml`).
    pub fn config_path(&self) -> PathBuf {
        self.root.join("cli.toml")
    }

    /// Create the root and nested socket directories.
    ///
    /// Pre-existing directories are accepted. Any other I/O failure is
    /// returned with the offending path.
    pub fn ensure(&self) -> Result<(), PathsError> {
        for dir in [self.root.clone(), self.sock_path(), self.worker_sock_path()] {
            create_dir(&dir)?;
        }
        Ok(())
    }
}

fn create_dir(dir: &Path) -> Result<(), PathsError> {
    match fs::create_dir_all(dir) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::AlreadyExists && dir.is_dir() => Ok(()),
        Err(source) => Err(PathsError::CreateDir {
            path: dir.to_path_buf(),
            source,
        }),
    }
}
