//! cli::args
//!
//! Global option declarations and the argument pre-scan.
//!
//! # Global Flags
//!
//! These flags are available on all commands:
//! - `--help` / `-h`: Show help
//! - `--version` / `-v`: Show version number
//! - `--verbose` / `-b`: Enables verbose mode
//! - `--serverUrl` / `-s <url>`: Remote server targeted by the command
//! - `--user` / `-u <user>`: Username for authentication
//! - `--password` / `-p [<password>]`: Password; prompted for when no value is given
//!
//! # Pre-scan
//!
//! [`PreScan`] inspects the raw arguments before the parser runs, because the
//! dispatcher must decide whether a command needs an instance (and whether to
//! prompt for a password) before commands can be parsed.

use clap::{Arg, ArgAction, ArgMatches};
use url::Url;

pub const VERBOSE: &str = "verbose";
pub const VERSION: &str = "version";
pub const SERVER_URL: &str = "serverUrl";
pub const USER: &str = "user";
pub const PASSWORD: &str = "password";
pub const CONTEXT: &str = "context";

const INVALID_SERVER_URL: &str = "serverUrl option must be a valid absolute url";

/// Options declared on every command.
pub fn global_args() -> Vec<Arg> {
    vec![
        Arg::new(VERBOSE)
            .short('b')
            .long("verbose")
            .help("Enables verbose mode")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new(VERSION)
            .short('v')
            .long("version")
            .help("Show version number")
            .action(ArgAction::SetTrue)
            .global(true),
        Arg::new(SERVER_URL)
            .short('s')
            .long("serverUrl")
            .value_name("url")
            .help("Specifies a url to a remote jsreport server, that server will be the target of the command (only if command support this mode)")
            .value_parser(parse_server_url)
            .global(true),
        Arg::new(USER)
            .short('u')
            .long("user")
            .value_name("user")
            .help("Specifies a username for authentication against a jsreport server (Use if some command needs authentication information)")
            .global(true),
        Arg::new(PASSWORD)
            .short('p')
            .long("password")
            .value_name("password")
            .help("Specifies a password for authentication against a jsreport server (Use if some command needs authentication information)")
            .num_args(0..=1)
            .default_missing_value("")
            .global(true),
        // Accepted so strict parsing does not reject it; the real context is
        // always the one built by the dispatcher.
        Arg::new(CONTEXT)
            .long("context")
            .alias("_context_")
            .hide(true)
            .global(true),
    ]
}

fn parse_server_url(value: &str) -> Result<String, String> {
    match Url::parse(value) {
        Ok(url) if !url.cannot_be_a_base() => Ok(value.to_string()),
        _ => Err(INVALID_SERVER_URL.to_string()),
    }
}

/// Parsed values of the global options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GlobalOptions {
    pub verbose: bool,
    pub server_url: Option<String>,
    pub user: Option<String>,
    pub password: Option<String>,
}

impl GlobalOptions {
    /// Read the global options from parsed matches.
    ///
    /// A bare `--password` (no value) yields `None`; the dispatcher fills it
    /// in from the prompt.
    pub fn from_matches(matches: &ArgMatches) -> Self {
        let string = |id: &str| matches.try_get_one::<String>(id).ok().flatten().cloned();

        Self {
            verbose: matches
                .try_get_one::<bool>(VERBOSE)
                .ok()
                .flatten()
                .copied()
                .unwrap_or(false),
            server_url: string(SERVER_URL),
            user: string(USER),
            password: string(PASSWORD).filter(|p| !p.is_empty()),
        }
    }
}

/// Result of inspecting the raw arguments.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreScan {
    /// Positional tokens in order.
    pub positionals: Vec<String>,
    /// Positional tokens joined with `.`, absent when there are none.
    pub main_command: Option<String>,
    pub verbose: bool,
    pub version: bool,
    pub help: bool,
    /// `--password` was given without a value.
    pub password_required: bool,
    pub server_url: Option<String>,
}

impl PreScan {
    /// Inspect `args` (without the program name).
    pub fn scan<S: AsRef<str>>(args: &[S]) -> Self {
        let mut scan = PreScan::default();
        let mut tokens = args.iter().map(|arg| -> &str { arg.as_ref() }).peekable();

        while let Some(token) = tokens.next() {
            if token == "--" {
                scan.positionals.extend(tokens.by_ref().map(str::to_string));
                break;
            }

            if let Some(long) = token.strip_prefix("--") {
                let (name, inline) = split_inline(long);
                let value = match inline {
                    Some(value) => Some(value.to_string()),
                    None if is_boolean(name) => None,
                    None => tokens.next_if(|next| !next.starts_with('-')).map(str::to_string),
                };
                scan.apply(name, value);
                continue;
            }

            match token.strip_prefix('-').filter(|shorts| !shorts.is_empty()) {
                Some(shorts) => {
                    let (flags, inline) = split_inline(shorts);
                    let count = flags.chars().count();
                    for (i, flag) in flags.chars().enumerate() {
                        let name = flag.to_string();
                        let value = if i + 1 < count {
                            None
                        } else if let Some(value) = inline {
                            Some(value.to_string())
                        } else if is_boolean(&name) {
                            None
                        } else {
                            tokens.next_if(|next| !next.starts_with('-')).map(str::to_string)
                        };
                        scan.apply(&name, value);
                    }
                }
                None => scan.positionals.push(token.to_string()),
            }
        }

        if !scan.positionals.is_empty() {
            scan.main_command = Some(scan.positionals.join("."));
        }
        scan
    }

    fn apply(&mut self, name: &str, value: Option<String>) {
        let enabled = value.as_deref().map_or(true, |v| v != "false");
        match name {
            "b" | VERBOSE => self.verbose = enabled,
            "v" | VERSION => self.version = enabled,
            "h" | "help" => self.help = enabled,
            "p" | PASSWORD => {
                self.password_required = value.as_deref().map_or(true, str::is_empty)
            }
            "s" | SERVER_URL => self.server_url = value,
            _ => {}
        }
    }
}

fn split_inline(option: &str) -> (&str, Option<&str>) {
    match option.split_once('=') {
        Some((name, value)) => (name, Some(value)),
        None => (option, None),
    }
}

fn is_boolean(name: &str) -> bool {
    matches!(name, "b" | VERBOSE | "v" | VERSION | "h" | "help")
}

/// Supported shells for completion
#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::enum_variant_names)]
pub enum Shell {
    Bash,
    Zsh,
    Fish,
    PowerShell,
}
