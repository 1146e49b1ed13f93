//! engine::commander
//!
//! The dispatcher: pre-scan, instance preparation, parsing, execution.
//!
//! # States
//!
//! ```text
//! Idle -> PreScanned -> NoCommand
//!                    -> Delegating -> [prompt] -> context -> [next turn] -> verify
//!                       -> started -> parse -> execute
//! ```
//!
//! # Invariants
//!
//! - When a command needs an instance, resolution and initialization finish
//!   (successfully or fatally) before the parser runs
//! - Any failure before the parser runs emits `started` with the error and
//!   ends the dispatch with [`ExitCode::Failure`]; the parser is never invoked
//! - The parser runs on a later scheduler turn than context construction
//! - An entry point that completes its resolution a second time before the
//!   parser runs aborts the dispatch; no handler is invoked
//! - Entry-point independence is decided from the command the parser will
//!   dispatch to, so positional arguments after it do not change it
//! - The library never exits the process; `start` returns an [`ExitCode`]

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::Instrument;
use uuid::Uuid;

use super::context::{CommandArgs, ExecutionContext, InstanceAccess};
use super::error::CommanderError;
use super::events::{CommandObserver, CommanderObserver, EventBus, StartInfo};
use super::executor;
use super::parser::{self, ParserSettings};
use super::pipeline::InstancePipeline;
use super::registry::{CommandRegistry, CommandSpec};
use crate::cli::args::{GlobalOptions, PreScan, VERSION};
use crate::cli::commands;
use crate::core::paths::StatePaths;
use crate::instance::{InstanceProvider, Resolver};
use crate::ui::output;
use crate::ui::prompts::{PasswordPrompt, PromptError, TerminalPrompt};

/// Outcome of a dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitCode {
    Success,
    Failure,
}

impl ExitCode {
    pub fn as_i32(self) -> i32 {
        match self {
            ExitCode::Success => 0,
            ExitCode::Failure => 1,
        }
    }

    pub fn is_success(self) -> bool {
        self == ExitCode::Success
    }
}

impl From<ExitCode> for std::process::ExitCode {
    fn from(code: ExitCode) -> Self {
        match code {
            ExitCode::Success => std::process::ExitCode::SUCCESS,
            ExitCode::Failure => std::process::ExitCode::FAILURE,
        }
    }
}

/// Construction-time configuration.
pub struct CommanderOptions {
    pub cwd: PathBuf,
    pub paths: StatePaths,
    pub provider: Arc<dyn InstanceProvider>,
    /// Commands registered at construction.
    pub builtin_commands: Vec<CommandSpec>,
    /// Commands that run without a prepared instance.
    pub ignore_entry_point_commands: Vec<String>,
    pub prompt: Arc<dyn PasswordPrompt>,
    pub parser: ParserSettings,
    /// Verbose mode even without `--verbose`.
    pub verbose: bool,
    /// Observers subscribed before construction events fire.
    pub observers: Vec<Arc<dyn CommanderObserver>>,
    /// Wait for Ctrl-C when a command asks to keep the process alive.
    pub wait_on_keep_alive: bool,
}

impl fmt::Debug for CommanderOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommanderOptions")
            .field("cwd", &self.cwd)
            .field("paths", &self.paths)
            .field("builtin_commands", &self.builtin_commands)
            .field("ignore_entry_point_commands", &self.ignore_entry_point_commands)
            .field("parser", &self.parser)
            .field("verbose", &self.verbose)
            .field("wait_on_keep_alive", &self.wait_on_keep_alive)
            .finish_non_exhaustive()
    }
}

impl CommanderOptions {
    /// Options with the built-in commands and the terminal prompt.
    pub fn new(cwd: impl Into<PathBuf>, paths: StatePaths, provider: Arc<dyn InstanceProvider>) -> Self {
        Self {
            cwd: cwd.into(),
            paths,
            provider,
            builtin_commands: commands::built_in_commands(),
            ignore_entry_point_commands: commands::IGNORE_ENTRY_POINT_COMMANDS
                .iter()
                .map(|name| name.to_string())
                .collect(),
            prompt: Arc::new(TerminalPrompt),
            parser: ParserSettings::default(),
            verbose: false,
            observers: Vec::new(),
            wait_on_keep_alive: true,
        }
    }

    /// Replace the built-in commands.
    ///
    /// The default entry-point-independent list belongs to the default
    /// built-ins, so it is replaced as well.
    pub fn with_builtin_commands(
        mut self,
        commands: Vec<CommandSpec>,
        ignore_entry_point: Vec<String>,
    ) -> Self {
        self.builtin_commands = commands;
        self.ignore_entry_point_commands = ignore_entry_point;
        self
    }

    /// Add entry-point-independent command names.
    pub fn ignoring_entry_point<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.ignore_entry_point_commands
            .extend(names.into_iter().map(Into::into));
        self
    }

    pub fn with_prompt(mut self, prompt: Arc<dyn PasswordPrompt>) -> Self {
        self.prompt = prompt;
        self
    }

    pub fn with_parser(mut self, parser: ParserSettings) -> Self {
        self.parser = parser;
        self
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn with_observer(mut self, observer: Arc<dyn CommanderObserver>) -> Self {
        self.observers.push(observer);
        self
    }

    pub fn wait_on_keep_alive(mut self, wait: bool) -> Self {
        self.wait_on_keep_alive = wait;
        self
    }
}

/// Command dispatcher.
pub struct Commander {
    cwd: PathBuf,
    paths: StatePaths,
    registry: CommandRegistry,
    builtin_names: Vec<String>,
    ignore_entry_point: Vec<String>,
    resolver: Resolver,
    prompt: Arc<dyn PasswordPrompt>,
    parser: ParserSettings,
    verbose: bool,
    wait_on_keep_alive: bool,
    bus: EventBus,
}

impl fmt::Debug for Commander {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Commander")
            .field("cwd", &self.cwd)
            .field("commands", &self.registry.names())
            .field("ignore_entry_point", &self.ignore_entry_point)
            .finish_non_exhaustive()
    }
}

impl Commander {
    /// Register the built-in commands and emit `initialized`.
    pub fn new(options: CommanderOptions) -> Result<Self, CommanderError> {
        let bus = EventBus::new();
        for observer in options.observers {
            bus.subscribe(observer);
        }

        let builtin_names = options
            .builtin_commands
            .iter()
            .map(|spec| spec.name().to_string())
            .collect();

        let mut commander = Self {
            cwd: options.cwd,
            paths: options.paths,
            registry: CommandRegistry::new(),
            builtin_names,
            ignore_entry_point: options.ignore_entry_point_commands,
            resolver: Resolver::new(options.provider),
            prompt: options.prompt,
            parser: options.parser,
            verbose: options.verbose,
            wait_on_keep_alive: options.wait_on_keep_alive,
            bus,
        };

        for spec in options.builtin_commands {
            commander.register_command(spec)?;
        }

        commander.bus.initialized();
        Ok(commander)
    }

    pub fn cwd(&self) -> &Path {
        &self.cwd
    }

    pub fn registry(&self) -> &CommandRegistry {
        &self.registry
    }

    pub fn events(&self) -> &EventBus {
        &self.bus
    }

    pub fn subscribe(&self, observer: Arc<dyn CommanderObserver>) {
        self.bus.subscribe(observer);
    }

    pub fn subscribe_command(&self, name: impl Into<String>, observer: Arc<dyn CommandObserver>) {
        self.bus.subscribe_command(name, observer);
    }

    /// Register a command and emit `command.register`.
    pub fn register_command(&mut self, spec: CommandSpec) -> Result<Arc<CommandSpec>, CommanderError> {
        let spec = self.registry.register(spec)?;
        tracing::debug!(command = spec.name(), "registered command");
        self.bus.command_registered(spec.name(), &spec);
        Ok(spec)
    }

    /// Dispatch `args` (without the program name).
    pub async fn start<I, T>(&self, args: I) -> ExitCode
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let args: Vec<String> = args.into_iter().map(Into::into).collect();
        let span = tracing::info_span!(
            "dispatch",
            id = %Uuid::new_v4(),
            command = tracing::field::Empty
        );
        self.dispatch(args).instrument(span).await
    }

    async fn dispatch(&self, args: Vec<String>) -> ExitCode {
        self.bus.starting();

        let scan = PreScan::scan(&args);
        let verbose = self.verbose || scan.verbose;

        let Some(main_command) = scan.main_command.clone() else {
            self.bus.started(Ok(&StartInfo {
                handled: scan.version || scan.help,
                main_command: None,
            }));
            return self.run_parser(&args, None, None).await;
        };

        tracing::Span::current().record("command", main_command.as_str());
        let ignore_entry_point = self.ignores_entry_point(&scan);
        tracing::debug!(command = %main_command, ignore_entry_point, "dispatching");

        let mut password = None;
        if scan.password_required {
            match self.prompt_password().await {
                Ok(value) => password = Some(value),
                Err(err) => return self.abort(err),
            }
        }

        let (context, pipeline) = match self.build_context(ignore_entry_point, verbose).await {
            Ok(prepared) => prepared,
            Err(err) => return self.abort(err),
        };

        // Parse on a later turn so parser failures stay apart from
        // instance preparation failures.
        tokio::task::yield_now().await;

        if let Err(err) = pipeline.verify_resolution() {
            return self.abort(err);
        }

        self.bus.started(Ok(&StartInfo {
            handled: command_candidates(&scan).any(|name| self.registry.contains(&name))
                || scan.version
                || scan.help,
            main_command: Some(main_command),
        }));

        let code = self
            .run_parser(&args, Some(Arc::clone(&context)), password)
            .await;
        if !code.is_success() || context.has_failed() {
            return ExitCode::Failure;
        }

        if context.keeps_process_alive() && self.wait_on_keep_alive {
            tracing::debug!("waiting for interrupt");
            if let Err(err) = tokio::signal::ctrl_c().await {
                tracing::warn!(error = %err, "failed to listen for interrupt");
            }
        }
        ExitCode::Success
    }

    /// Whether the scanned command runs without a prepared instance.
    ///
    /// Listed commands never need one. Help or version output for a command
    /// that is not built in does not need one either.
    fn ignores_entry_point(&self, scan: &PreScan) -> bool {
        let listed = command_candidates(scan).any(|name| self.ignore_entry_point.contains(&name));
        let builtin = command_candidates(scan).any(|name| self.builtin_names.contains(&name));
        listed || (!builtin && (scan.version || scan.help))
    }

    async fn prompt_password(&self) -> Result<String, CommanderError> {
        let prompt = Arc::clone(&self.prompt);
        tokio::task::spawn_blocking(move || prompt.password("Password"))
            .await
            .unwrap_or_else(|join_error| Err(PromptError::IoError(join_error.to_string())))
            .map_err(CommanderError::Password)
    }

    async fn build_context(
        &self,
        ignore_entry_point: bool,
        verbose: bool,
    ) -> Result<(Arc<ExecutionContext>, InstancePipeline), CommanderError> {
        self.paths.ensure()?;

        let pipeline = InstancePipeline::new(
            self.cwd.clone(),
            self.resolver.clone(),
            verbose,
            self.bus.clone(),
        );
        let access = if ignore_entry_point {
            InstanceAccess::Deferred(pipeline.clone())
        } else {
            InstanceAccess::Ready(pipeline.ready_instance().await?)
        };

        let context = ExecutionContext::new(self.cwd.clone(), &self.paths, verbose, access);
        Ok((Arc::new(context), pipeline))
    }

    fn abort(&self, err: CommanderError) -> ExitCode {
        tracing::debug!(error = %err, "dispatch aborted");
        self.bus.started(Err(&err));
        err.report();
        ExitCode::Failure
    }

    async fn run_parser(
        &self,
        args: &[String],
        context: Option<Arc<ExecutionContext>>,
        password: Option<String>,
    ) -> ExitCode {
        let mut parser = parser::build(&self.parser, &self.registry);
        let argv = std::iter::once(self.parser.bin_name.clone()).chain(args.iter().cloned());

        let matches = match parser.clone().try_get_matches_from(argv) {
            Ok(matches) => matches,
            Err(err) => return report_parse_error(err),
        };

        if matches.get_flag(VERSION) {
            output::print(&self.parser.version);
            return ExitCode::Success;
        }

        let (Some(context), Some((name, sub_matches))) = (context, matches.subcommand()) else {
            if let Err(err) = parser.print_help() {
                tracing::warn!(error = %err, "failed to print help");
            }
            return ExitCode::Success;
        };

        let mut globals = GlobalOptions::from_matches(sub_matches);
        if password.is_some() {
            globals.password = password;
        }

        let command_args = CommandArgs {
            command: name.to_string(),
            matches: sub_matches.clone(),
            globals,
            context,
            parser,
        };

        match executor::execute(&self.registry, &self.bus, name, command_args).await {
            Ok(()) => ExitCode::Success,
            Err(err) => {
                CommanderError::UnexpectedParser {
                    detail: err.to_string(),
                }
                .report();
                ExitCode::Failure
            }
        }
    }
}

/// Dotted prefixes of the positionals, longest first.
///
/// `completion bash` dispatches to `completion`; the positionals after the
/// command are its arguments.
fn command_candidates(scan: &PreScan) -> impl Iterator<Item = String> + '_ {
    (1..=scan.positionals.len())
        .rev()
        .map(|end| scan.positionals[..end].join("."))
}

fn report_parse_error(err: clap::Error) -> ExitCode {
    use clap::error::ErrorKind;

    if let Err(print_err) = err.print() {
        tracing::warn!(error = %print_err, "failed to print parser output");
    }
    match err.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::Success,
        _ => ExitCode::Failure,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::context::CommandValue;
    use crate::engine::events::EventLog;
    use crate::instance::mock::{MockInstance, MockProvider};
    use crate::ui::prompts::StaticPrompt;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn installed_project() -> TempDir {
        let temp = TempDir::new().unwrap();
        std::fs::write(
            temp.path().join("package.json"),
            r#"{ "dependencies": { "jsreport": "2.0.0" } }"#,
        )
        .unwrap();
        temp
    }

    fn options(temp: &TempDir, provider: MockProvider) -> CommanderOptions {
        CommanderOptions::new(
            temp.path(),
            StatePaths::new(temp.path().join(".state")),
            Arc::new(provider),
        )
        .with_builtin_commands(Vec::new(), Vec::new())
        .wait_on_keep_alive(false)
    }

    type Done = std::future::Ready<anyhow::Result<CommandValue>>;

    fn done() -> Done {
        std::future::ready(Ok(CommandValue::Empty))
    }

    fn recording(
        captured: Arc<Mutex<Option<GlobalOptions>>>,
    ) -> impl Fn(CommandArgs) -> Done + Send + Sync + 'static {
        move |args: CommandArgs| {
            *captured.lock().unwrap() = Some(args.globals.clone());
            done()
        }
    }

    mod decisions {
        use super::*;

        #[test]
        fn ignore_entry_point_rules() {
            let temp = TempDir::new().unwrap();
            let commander = Commander::new(
                options(&temp, MockProvider::new()).with_builtin_commands(
                    vec![CommandSpec::new("render", "Render", |_args: CommandArgs| {
                        done()
                    })],
                    vec!["init".to_string()],
                ),
            )
            .unwrap();

            let ignores = |args: &[&str]| commander.ignores_entry_point(&PreScan::scan(args));

            assert!(ignores(&["init"]));
            assert!(!ignores(&["render"]));
            assert!(!ignores(&["render", "-h"]));
            assert!(ignores(&["custom", "-h"]));
            assert!(!ignores(&["custom"]));
        }

        #[test]
        fn positional_arguments_do_not_change_the_command() {
            let temp = TempDir::new().unwrap();
            let commander = Commander::new(
                options(&temp, MockProvider::new()).with_builtin_commands(
                    vec![CommandSpec::new("render", "Render", |_args: CommandArgs| {
                        done()
                    })],
                    vec!["init".to_string(), "repair.deep".to_string()],
                ),
            )
            .unwrap();
            let ignores = |args: &[&str]| commander.ignores_entry_point(&PreScan::scan(args));

            assert!(ignores(&["init", "myproj"]));
            assert!(ignores(&["repair", "deep", "now"]));
            assert!(!ignores(&["repair", "now"]));
            assert!(!ignores(&["render", "invoice", "-h"]));
            assert!(ignores(&["custom", "thing", "--help"]));
        }

        #[test]
        fn exit_code_conversion() {
            assert_eq!(ExitCode::Success.as_i32(), 0);
            assert_eq!(ExitCode::Failure.as_i32(), 1);
            assert!(!ExitCode::Failure.is_success());
        }
    }

    mod password {
        use super::*;

        #[tokio::test]
        async fn prompted_password_reaches_handler() {
            let temp = installed_project();
            let captured = Arc::new(Mutex::new(None));
            let mut commander = Commander::new(
                options(&temp, MockProvider::new())
                    .with_prompt(Arc::new(StaticPrompt::answering("secret"))),
            )
            .unwrap();
            commander
                .register_command(CommandSpec::new("render", "Render", recording(captured.clone())))
                .unwrap();

            let code = commander.start(["render", "-p", "-u", "admin"]).await;

            assert_eq!(code, ExitCode::Success);
            let globals = captured.lock().unwrap().clone().unwrap();
            assert_eq!(globals.password.as_deref(), Some("secret"));
            assert_eq!(globals.user.as_deref(), Some("admin"));
        }

        #[tokio::test]
        async fn inline_password_skips_prompt() {
            let temp = installed_project();
            let captured = Arc::new(Mutex::new(None));
            let mut commander = Commander::new(
                options(&temp, MockProvider::new()).with_prompt(Arc::new(StaticPrompt::cancelled())),
            )
            .unwrap();
            commander
                .register_command(CommandSpec::new("render", "Render", recording(captured.clone())))
                .unwrap();

            let code = commander.start(["render", "--password=inline"]).await;

            assert_eq!(code, ExitCode::Success);
            let globals = captured.lock().unwrap().clone().unwrap();
            assert_eq!(globals.password.as_deref(), Some("inline"));
        }

        #[tokio::test]
        async fn separated_password_skips_prompt() {
            let temp = installed_project();
            let captured = Arc::new(Mutex::new(None));
            let mut commander = Commander::new(
                options(&temp, MockProvider::new()).with_prompt(Arc::new(StaticPrompt::cancelled())),
            )
            .unwrap();
            commander
                .register_command(CommandSpec::new("render", "Render", recording(captured.clone())))
                .unwrap();

            let code = commander.start(["render", "-p", "secret"]).await;

            assert_eq!(code, ExitCode::Success);
            let globals = captured.lock().unwrap().clone().unwrap();
            assert_eq!(globals.password.as_deref(), Some("secret"));
        }

        #[tokio::test]
        async fn cancelled_prompt_aborts_before_resolution() {
            let temp = installed_project();
            let log = EventLog::new();
            let provider = MockProvider::new();
            let mut commander = Commander::new(
                options(&temp, provider.clone())
                    .with_prompt(Arc::new(StaticPrompt::cancelled()))
                    .with_observer(Arc::new(log.clone())),
            )
            .unwrap();
            commander
                .register_command(CommandSpec::new("render", "Render", |_args: CommandArgs| {
                    done()
                }))
                .unwrap();

            let code = commander.start(["render", "-p"]).await;

            assert_eq!(code, ExitCode::Failure);
            assert!(provider.operations().is_empty());
            assert!(!log.has_instance_events());
            assert_eq!(log.count("command.init"), 0);
        }
    }

    mod keep_alive {
        use super::*;

        #[tokio::test]
        async fn failed_command_reported_through_context() {
            let temp = installed_project();
            let mut commander = Commander::new(options(&temp, MockProvider::new())).unwrap();
            commander
                .register_command(CommandSpec::new("fail", "Fail", |args: CommandArgs| async move {
                    let err = anyhow::anyhow!("template missing");
                    args.context.on_error(&err);
                    Err::<CommandValue, _>(err)
                }))
                .unwrap();

            assert_eq!(commander.start(["fail"]).await, ExitCode::Failure);
        }

        #[tokio::test]
        async fn unhandled_command_error_keeps_success() {
            let temp = installed_project();
            let mut commander = Commander::new(options(&temp, MockProvider::new())).unwrap();
            commander
                .register_command(CommandSpec::new("fail", "Fail", |_args: CommandArgs| async {
                    Err::<CommandValue, _>(anyhow::anyhow!("ignored"))
                }))
                .unwrap();

            assert_eq!(commander.start(["fail"]).await, ExitCode::Success);
        }
    }

    #[tokio::test]
    async fn state_directories_are_created() {
        let temp = installed_project();
        let mut commander = Commander::new(options(&temp, MockProvider::new())).unwrap();
        commander
            .register_command(CommandSpec::new("noop", "Noop", |_args: CommandArgs| {
                done()
            }))
            .unwrap();

        assert_eq!(commander.start(["noop"]).await, ExitCode::Success);
        assert!(temp.path().join(".state").join("sock").join("workerSock").is_dir());
    }

    #[tokio::test]
    async fn default_instance_is_initialized_before_handler() {
        let temp = installed_project();
        let mock = MockInstance::new("default");
        let provider = MockProvider::new().with_default_instance(mock.shared());
        let initialized_in_handler = Arc::new(Mutex::new(false));
        let seen = initialized_in_handler.clone();

        let mut commander = Commander::new(options(&temp, provider)).unwrap();
        commander
            .register_command(CommandSpec::new("check", "Check", move |args: CommandArgs| {
                let ready = args
                    .context
                    .instance()
                    .map(|instance| instance.is_initialized())
                    .unwrap_or(false);
                *seen.lock().unwrap() = ready;
                done()
            }))
            .unwrap();

        assert_eq!(commander.start(["check"]).await, ExitCode::Success);
        assert!(*initialized_in_handler.lock().unwrap());
        assert_eq!(mock.init_calls(), 1);
    }
}
