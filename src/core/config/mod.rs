//! core::config
//!
//! Configuration schema and loading.
//!
//! # Precedence
//!
//! Configuration values are resolved in this order (later overrides earlier):
//! 1. Default values
//! 2. Config file
//! 3. CLI flags (not handled here)
//!
//! # Example
//!
//! ```no_run
//! use jsreport_cli::core::config::Config;
//! use jsreport_cli::core::paths::StatePaths;
//!
//! let paths = StatePaths::from_home().unwrap();
//! let config = Config::load(&paths).unwrap();
//!
//! println!("State root: {}", config.state_paths(&paths).root().display());
//! println!("Verbose: {}", config.verbose());
//! ```

pub mod schema;

pub use schema::CliConfig;

use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use super::paths::StatePaths;

/// Environment variable pointing at an explicit config file.
pub const CONFIG_ENV: &str = "JSREPORT_CLI_CONFIG";

/// Errors from configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file '{path}': {message}")]
    ParseError { path: PathBuf, message: String },

    #[error("invalid config value: {0}")]
    InvalidValue(String),
}

/// Loaded configuration.
#[derive(Debug, Clone, Default)]
pub struct Config {
    /// File contents (defaults when no file was found)
    pub file: CliConfig,
    /// Path the config was read from, if any
    path: Option<PathBuf>,
}

impl Config {
    /// Load configuration from the default locations.
    ///
    /// # Errors
    ///
    /// Returns an error if a config file exists but cannot be parsed.
    /// A missing config file is not an error (defaults are used).
    pub fn load(paths: &StatePaths) -> Result<Self, ConfigError> {
        if let Ok(path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(path);
            if path.exists() {
                return Self::load_from(&path);
            }
        }

        let path = paths.config_path();
        if path.exists() {
            return Self::load_from(&path);
        }

        Ok(Self::default())
    }

    /// Load and validate a specific config file.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let file: CliConfig = toml::from_str(&contents).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        file.validate()?;

        Ok(Self {
            file,
            path: Some(path.to_path_buf()),
        })
    }

    /// Path the configuration was loaded from.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// State paths with the `root_dir` override applied.
    pub fn state_paths(&self, defaults: &StatePaths) -> StatePaths {
        match &self.file.root_dir {
            Some(root) => StatePaths::new(root.clone()),
            None => defaults.clone(),
        }
    }

    /// Default verbose mode.
    ///
    /// Defaults to `false` if not configured.
    pub fn verbose(&self) -> bool {
        self.file.verbose.unwrap_or(false)
    }

    /// Extra entry-point-independent command names.
    pub fn ignore_entry_point(&self) -> &[String] {
        self.file.ignore_entry_point.as_deref().unwrap_or(&[])
    }
}
