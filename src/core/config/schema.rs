//! core::config::schema
//!
//! Configuration schema types.
//!
//! # Location
//!
//! Searched in order:
//! 1. `$JSREPORT_CLI_CONFIG` if set
//! 2. `<state root>/cli.toml`
//!
//! # Validation
//!
//! Values are validated after parsing: extra entry-point-independent command
//! names must be non-empty and must not contain whitespace.

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::ConfigError;

/// CLI configuration file.
///
/// # Example
///
/// ```toml
/// root_dir = "/var/lib/jsreport-cli"
/// verbose = false
/// ignore_entry_point = ["doctor"]
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CliConfig {
    /// Override for the state directory root
    pub root_dir: Option<PathBuf>,

    /// Default verbose mode
    pub verbose: Option<bool>,

    /// Extra commands that run without resolving an instance first
    pub ignore_entry_point: Option<Vec<String>>,
}

impl CliConfig {
    /// Validate the configuration values.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::InvalidValue` if any value is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if let Some(names) = &self.ignore_entry_point {
            for name in names {
                if name.is_empty() || name.chars().any(char::is_whitespace) {
                    return Err(ConfigError::InvalidValue(format!(
                        "invalid command name '{}' in ignore_entry_point",
                        name
                    )));
                }
            }
        }

        if let Some(root) = &self.root_dir {
            if root.as_os_str().is_empty() {
                return Err(ConfigError::InvalidValue(
                    "root_dir cannot be empty".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_config() {
        let config: CliConfig = toml::from_str(
            r#"
            root_dir = "/tmp/state"
            verbose = true
            ignore_entry_point = ["doctor", "clean"]
            "#,
        )
        .unwrap();

        assert_eq!(config.root_dir, Some(PathBuf::from("/tmp/state")));
        assert_eq!(config.verbose, Some(true));
        assert_eq!(
            config.ignore_entry_point,
            Some(vec!["doctor".to_string(), "clean".to_string()])
        );
        config.validate().unwrap();
    }

    #[test]
    fn rejects_unknown_keys() {
        let result: Result<CliConfig, _> = toml::from_str("colour = \"red\"");
        assert!(result.is_err());
    }

    #[test]
    fn rejects_blank_command_names() {
        let config = CliConfig {
            ignore_entry_point: Some(vec!["my command".to_string()]),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue(_))
        ));
    }
}
