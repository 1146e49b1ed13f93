//! ui::output
//!
//! Output formatting and display.
//!
//! # Design
//!
//! User-facing output is plain text. Progress messages are only printed in
//! verbose mode; errors are always printed to stderr.

use std::fmt::Display;

/// Output verbosity level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    /// Normal mode - standard output
    Normal,
    /// Verbose mode - progress and resolution details
    Verbose,
}

impl Verbosity {
    /// Create verbosity from the verbose flag.
    pub fn from_flag(verbose: bool) -> Self {
        if verbose {
            Verbosity::Verbose
        } else {
            Verbosity::Normal
        }
    }

    pub fn is_verbose(self) -> bool {
        self == Verbosity::Verbose
    }
}

/// Print a message.
pub fn print(message: impl Display) {
    println!("{}", message);
}

/// Print a progress message (only in verbose mode).
pub fn verbose(message: impl Display, verbosity: Verbosity) {
    if verbosity.is_verbose() {
        println!("{}", message);
    }
}

/// Print an error message (always shown).
pub fn error(message: impl Display) {
    eprintln!("{}", message);
}

/// Render an error with its source chain, one cause per line.
pub fn format_error_chain(error: &(dyn std::error::Error + 'static)) -> String {
    let mut lines = vec![error.to_string()];
    let mut source = error.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !lines.iter().any(|line| line.contains(&text)) {
            lines.push(text);
        }
        source = cause.source();
    }
    lines.join("\n")
}
