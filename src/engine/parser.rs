//! engine::parser
//!
//! Builds the argument parser from the global options and the registry.

use crate::cli::args;

use super::registry::CommandRegistry;

/// Parser customization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParserSettings {
    pub bin_name: String,
    pub version: String,
    pub about: String,
}

impl Default for ParserSettings {
    fn default() -> Self {
        Self {
            bin_name: "jsreport".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            about: "jsreport command line interface".to_string(),
        }
    }
}

/// Root parser with one sub-command per registered command.
///
/// Version display is handled by the dispatcher through the global
/// `--version` flag, so clap's own version flag is disabled.
pub fn build(settings: &ParserSettings, registry: &CommandRegistry) -> clap::Command {
    let mut command = clap::Command::new(settings.bin_name.clone())
        .about(settings.about.clone())
        .override_usage(format!("{} [options] <command> [options]", settings.bin_name))
        .after_help(format!(
            "To show more information about a command, type: {} <command> -h",
            settings.bin_name
        ))
        .disable_version_flag(true)
        .disable_help_subcommand(true)
        .args(args::global_args());

    for spec in registry.iter() {
        command = command.subcommand(spec.to_clap());
    }
    command
}
