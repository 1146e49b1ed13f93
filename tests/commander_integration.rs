//! Integration tests for the dispatcher.
//!
//! These tests drive `Commander::start` end to end against real project
//! directories and a mock provider, and verify the event sequence observers
//! receive.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use jsreport_cli::core::paths::StatePaths;
use jsreport_cli::engine::{
    CommandArgs, CommandSpec, CommandValue, Commander, CommanderError, CommanderObserver,
    CommanderOptions, Event, EventLog, ExitCode, RegistryError, StartInfo,
};
use jsreport_cli::instance::mock::{MockInstance, MockProvider, MockProviderOp};
use jsreport_cli::instance::{same_instance, EntryPointReturn, ExportValue, InitError, Package};
use jsreport_cli::ui::prompts::StaticPrompt;

// =============================================================================
// Test Fixtures
// =============================================================================

/// Project directory with an optional `package.json`.
struct TestProject {
    dir: TempDir,
}

impl TestProject {
    /// Empty directory, no installation.
    fn empty() -> Self {
        Self {
            dir: TempDir::new().expect("failed to create temp dir"),
        }
    }

    /// Directory with `jsreport` declared as a dependency.
    fn installed() -> Self {
        let project = Self::empty();
        project.write_descriptor(r#"{ "dependencies": { "jsreport": "2.0.0" } }"#);
        project
    }

    /// Directory with `jsreport` installed and `server.js` as entry point.
    fn with_entry_point() -> Self {
        let project = Self::empty();
        project.write_descriptor(
            r#"{ "dependencies": { "jsreport": "2.0.0" }, "jsreport": { "entryPoint": "server.js" } }"#,
        );
        project
    }

    fn write_descriptor(&self, content: &str) {
        std::fs::write(self.path().join("package.json"), content).unwrap();
    }

    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn entry_point(&self) -> PathBuf {
        self.path().join("server.js")
    }

    fn options(&self, provider: MockProvider, log: &EventLog) -> CommanderOptions {
        CommanderOptions::new(
            self.path(),
            StatePaths::new(self.path().join(".state")),
            Arc::new(provider),
        )
        .with_builtin_commands(Vec::new(), Vec::new())
        .with_prompt(Arc::new(StaticPrompt::cancelled()))
        .with_observer(Arc::new(log.clone()))
        .wait_on_keep_alive(false)
    }
}

fn noop(_args: CommandArgs) -> std::future::Ready<anyhow::Result<CommandValue>> {
    std::future::ready(Ok(CommandValue::Empty))
}

/// Handler counting its invocations.
fn counting(
    calls: Arc<AtomicUsize>,
) -> impl Fn(CommandArgs) -> std::future::Ready<anyhow::Result<CommandValue>> + Send + Sync + 'static
{
    move |_args: CommandArgs| {
        calls.fetch_add(1, Ordering::SeqCst);
        std::future::ready(Ok(CommandValue::Empty))
    }
}

/// Records the port hint carried by failed `started` events.
#[derive(Default)]
struct StartFailures {
    ports: Mutex<Vec<Option<u16>>>,
}

impl CommanderObserver for StartFailures {
    fn started(&self, result: Result<&StartInfo, &CommanderError>) {
        if let Err(err) = result {
            self.ports.lock().unwrap().push(err.port_in_use());
        }
    }
}

fn started_error(log: &EventLog) -> String {
    match started_info(log).as_slice() {
        [Err(message)] => message.clone(),
        other => panic!("expected one failed started event, got {:?}", other),
    }
}

fn started_info(log: &EventLog) -> Vec<Result<(bool, Option<String>), String>> {
    log.events()
        .into_iter()
        .filter_map(|event| match event {
            Event::Started(result) => {
                Some(result.map(|info| (info.handled, info.main_command)))
            }
            _ => None,
        })
        .collect()
}

// =============================================================================
// Registry
// =============================================================================

mod registry {
    use super::*;

    #[test]
    fn registered_command_is_returned_by_lookup() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();

        let registered = commander
            .register_command(CommandSpec::new("render", "Render a template", noop))
            .unwrap();
        let found = commander.registry().lookup("render").unwrap();

        assert!(Arc::ptr_eq(&registered, &found));
        assert_eq!(found.description(), "Render a template");
        assert_eq!(log.count("command.register"), 1);
    }

    #[test]
    fn duplicate_registration_is_rejected() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "first", noop))
            .unwrap();

        let err = commander
            .register_command(CommandSpec::new("render", "second", noop))
            .unwrap_err();

        assert!(matches!(
            err,
            CommanderError::Registry(RegistryError::Duplicate(ref name)) if name == "render"
        ));
        assert_eq!(commander.registry().lookup("render").unwrap().description(), "first");
        assert_eq!(log.count("command.register"), 1);
    }

    #[test]
    fn builtin_commands_are_registered_at_construction() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let commander = Commander::new(
            CommanderOptions::new(
                project.path(),
                StatePaths::new(project.path().join(".state")),
                Arc::new(MockProvider::new()),
            )
            .with_observer(Arc::new(log.clone())),
        )
        .unwrap();

        assert!(commander.registry().contains("start"));
        assert!(commander.registry().contains("completion"));
        assert_eq!(log.position("initialized"), Some(log.names().len() - 1));
    }
}

// =============================================================================
// Instance resolution
// =============================================================================

mod resolution {
    use super::*;

    #[tokio::test]
    async fn missing_installation_fails_without_instance_events() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", counting(calls.clone())))
            .unwrap();

        let code = commander.start(["render"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(!log.has_instance_events());
        assert!(matches!(started_info(&log).as_slice(), [Err(_)]));
    }

    #[tokio::test]
    async fn entry_point_instance_resolved_before_command() {
        let project = TestProject::with_entry_point();
        let mock = MockInstance::new("server");
        let provider = MockProvider::new().with_entry_instance(project.entry_point(), mock.shared());
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(provider, &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", noop))
            .unwrap();
        commander.subscribe_command("render", log.scoped("render"));

        let code = commander.start(["render"]).await;

        assert_eq!(code, ExitCode::Success);
        let lookup = log.position("instance.lookup").unwrap();
        let found = log.position("instance.found").unwrap();
        let initialized = log.position("instance.initialized").unwrap();
        let init = log.position("command.render.init").unwrap();
        assert!(lookup < found);
        assert!(found < initialized);
        assert!(initialized < init);
        assert_eq!(log.count("instance.default"), 0);
        assert_eq!(mock.init_calls(), 1);
    }

    #[tokio::test]
    async fn entry_point_function_resolving_through_handle() {
        let project = TestProject::with_entry_point();
        let mock = MockInstance::new("server");
        let exported = mock.shared();
        let provider = MockProvider::new().with_entry_fn(project.entry_point(), move |handle| {
            let instance = exported.clone();
            tokio::spawn(async move {
                let _ = handle.resolve(instance);
            });
            EntryPointReturn::Nothing
        });
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(provider, &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", noop))
            .unwrap();

        assert_eq!(commander.start(["render"]).await, ExitCode::Success);
        assert_eq!(log.count("instance.found"), 1);
        assert_eq!(mock.init_calls(), 1);
    }

    #[tokio::test]
    async fn default_instance_announced() {
        let project = TestProject::installed();
        let mock = MockInstance::new("default");
        let provider = MockProvider::new().with_default_instance(mock.shared());
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(provider.clone(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", noop))
            .unwrap();

        assert_eq!(commander.start(["render"]).await, ExitCode::Success);

        let default = log
            .events()
            .into_iter()
            .find_map(|event| match event {
                Event::InstanceDefault { instance, package } => Some((instance, package)),
                _ => None,
            })
            .unwrap();
        assert_eq!(default.1, Package::Full);
        assert!(default.0.is_initialized());
        assert_eq!(log.count("instance.found"), 0);
        assert_eq!(
            provider.operations(),
            vec![MockProviderOp::CreateDefault {
                package: Package::Full,
                quiet_logging: true,
            }]
        );
    }

    #[tokio::test]
    async fn duplicate_resolution_aborts_dispatch() {
        let project = TestProject::with_entry_point();
        let mock = MockInstance::new("server");
        let exported = mock.shared();
        let provider = MockProvider::new().with_entry_fn(project.entry_point(), move |handle| {
            let _ = handle.resolve(exported.clone());
            EntryPointReturn::Value(ExportValue::Instance(exported.clone()))
        });
        let log = EventLog::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut commander = Commander::new(project.options(provider, &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", counting(calls.clone())))
            .unwrap();

        let code = commander.start(["render"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mock.init_calls(), 0);
        assert_eq!(log.count("instance.found"), 0);
        assert_eq!(log.count("command.init"), 0);
    }

    #[tokio::test]
    async fn initialized_instance_is_not_initialized_again() {
        let project = TestProject::with_entry_point();
        let mock = MockInstance::new("server");
        let provider = MockProvider::new().with_entry_instance(project.entry_point(), mock.shared());
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(provider, &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", noop))
            .unwrap();

        assert_eq!(commander.start(["render"]).await, ExitCode::Success);
        assert_eq!(commander.start(["render"]).await, ExitCode::Success);

        assert_eq!(mock.init_calls(), 1);
        assert_eq!(log.count("instance.initializing"), 1);
        assert_eq!(log.count("instance.initialized"), 2);
    }

    #[tokio::test]
    async fn ignored_command_resolves_nothing() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let provider = MockProvider::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut commander = Commander::new(
            project
                .options(provider.clone(), &log)
                .ignoring_entry_point(["init"]),
        )
        .unwrap();
        commander
            .register_command(CommandSpec::new("init", "Init", counting(calls.clone())))
            .unwrap();

        assert_eq!(commander.start(["init"]).await, ExitCode::Success);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(provider.operations().is_empty());
        assert!(!log.has_instance_events());
    }

    #[tokio::test]
    async fn handler_receives_same_instance_as_event() {
        let project = TestProject::with_entry_point();
        let mock = MockInstance::new("server");
        let provider = MockProvider::new().with_entry_instance(project.entry_point(), mock.shared());
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(provider, &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", |args: CommandArgs| async move {
                let instance = args
                    .context
                    .instance()
                    .cloned()
                    .ok_or_else(|| anyhow::anyhow!("no instance"))?;
                Ok::<_, anyhow::Error>(CommandValue::Instance(instance))
            }))
            .unwrap();

        assert_eq!(commander.start(["render"]).await, ExitCode::Success);

        let events = log.events();
        let found = events.iter().find_map(|event| match event {
            Event::InstanceFound { instance, .. } => Some(instance.clone()),
            _ => None,
        });
        let returned = events.iter().find_map(|event| match event {
            Event::CommandSuccess { value, .. } => value.instance().cloned(),
            _ => None,
        });
        assert!(same_instance(&found.unwrap(), &returned.unwrap()));
    }
}

// =============================================================================
// Command lifecycle
// =============================================================================

mod lifecycle {
    use super::*;

    #[tokio::test]
    async fn handler_error_emits_error_then_finish() {
        let project = TestProject::installed();
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", |_args: CommandArgs| async {
                Err::<CommandValue, _>(anyhow::anyhow!("template not found"))
            }))
            .unwrap();
        commander.subscribe_command("render", log.scoped("render"));

        commander.start(["render"]).await;

        let error = log.position("command.error").unwrap();
        let scoped_error = log.position("command.render.error").unwrap();
        let finish = log.position("command.finish").unwrap();
        let scoped_finish = log.position("command.render.finish").unwrap();
        assert!(error < scoped_error);
        assert!(scoped_error < finish);
        assert!(finish < scoped_finish);
        assert_eq!(log.count("command.success"), 0);
        assert_eq!(log.count("command.finish"), 1);
    }

    #[tokio::test]
    async fn success_emits_success_then_finish() {
        let project = TestProject::installed();
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", |_args: CommandArgs| async {
                Ok::<_, anyhow::Error>(CommandValue::Text("done".into()))
            }))
            .unwrap();

        assert_eq!(commander.start(["render"]).await, ExitCode::Success);

        let names = log.names();
        let tail: Vec<&str> = names[names.len() - 3..].iter().map(String::as_str).collect();
        assert_eq!(tail, ["command.init", "command.success", "command.finish"]);
    }

    #[tokio::test]
    async fn no_command_is_unhandled() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();

        let code = commander.start(Vec::<String>::new()).await;

        assert_eq!(code, ExitCode::Success);
        assert_eq!(started_info(&log), vec![Ok((false, None))]);
        assert!(!log.has_instance_events());
    }

    #[tokio::test]
    async fn started_reports_main_command() {
        let project = TestProject::installed();
        let log = EventLog::new();
        let mut commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", noop))
            .unwrap();

        commander.start(["render"]).await;

        assert_eq!(started_info(&log), vec![Ok((true, Some("render".to_string())))]);
        assert!(log.position("starting").unwrap() < log.position("started").unwrap());
    }

    #[tokio::test]
    async fn cancelled_password_prompt_fails() {
        let project = TestProject::installed();
        let log = EventLog::new();
        let provider = MockProvider::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut commander = Commander::new(project.options(provider.clone(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", counting(calls.clone())))
            .unwrap();

        let code = commander.start(["render", "--password"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert!(provider.operations().is_empty());
        assert!(matches!(started_info(&log).as_slice(), [Err(message)] if message.contains("password")));
    }

    #[tokio::test]
    async fn invalid_server_url_fails_parsing() {
        let project = TestProject::installed();
        let log = EventLog::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let mut commander = Commander::new(project.options(MockProvider::new(), &log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", counting(calls.clone())))
            .unwrap();

        let code = commander.start(["render", "--serverUrl", "not a url"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}

// =============================================================================
// Entry-point independence
// =============================================================================

mod entry_point_independence {
    use super::*;

    #[tokio::test]
    async fn ignored_command_with_positional_resolves_nothing() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let provider = MockProvider::new();
        let seen = Arc::new(Mutex::new(None));
        let captured = seen.clone();
        let mut commander = Commander::new(
            project
                .options(provider.clone(), &log)
                .ignoring_entry_point(["init"]),
        )
        .unwrap();
        commander
            .register_command(
                CommandSpec::new("init", "Init", move |args: CommandArgs| {
                    *captured.lock().unwrap() = args.matches.get_one::<String>("name").cloned();
                    std::future::ready(Ok::<_, anyhow::Error>(CommandValue::Empty))
                })
                .with_builder(|cmd| cmd.arg(clap::Arg::new("name").required(true))),
            )
            .unwrap();

        let code = commander.start(["init", "myproj"]).await;

        assert_eq!(code, ExitCode::Success);
        assert_eq!(seen.lock().unwrap().as_deref(), Some("myproj"));
        assert!(provider.operations().is_empty());
        assert!(!log.has_instance_events());
        assert_eq!(started_info(&log), vec![Ok((true, Some("init.myproj".to_string())))]);
    }

    #[tokio::test]
    async fn builtin_completion_runs_in_empty_project() {
        let project = TestProject::empty();
        let log = EventLog::new();
        let provider = MockProvider::new();
        let commander = Commander::new(
            CommanderOptions::new(
                project.path(),
                StatePaths::new(project.path().join(".state")),
                Arc::new(provider.clone()),
            )
            .with_observer(Arc::new(log.clone()))
            .wait_on_keep_alive(false),
        )
        .unwrap();

        let code = commander.start(["completion", "bash"]).await;

        assert_eq!(code, ExitCode::Success);
        assert!(provider.operations().is_empty());
        assert!(!log.has_instance_events());
        assert_eq!(log.count("command.success"), 1);
    }
}

// =============================================================================
// Fatal preparation failures
// =============================================================================

mod fatal_failures {
    use super::*;

    fn commander_with(
        project: &TestProject,
        provider: MockProvider,
        log: &EventLog,
        calls: &Arc<AtomicUsize>,
    ) -> Commander {
        let mut commander = Commander::new(project.options(provider, log)).unwrap();
        commander
            .register_command(CommandSpec::new("render", "Render", counting(calls.clone())))
            .unwrap();
        commander
    }

    #[tokio::test]
    async fn late_duplicate_resolution_aborts_dispatch() {
        let project = TestProject::with_entry_point();
        let mock = MockInstance::new("server");
        let exported = mock.shared();
        let provider = MockProvider::new().with_entry_fn(project.entry_point(), move |handle| {
            let late = exported.clone();
            tokio::spawn(async move {
                let _ = handle.resolve(late);
            });
            EntryPointReturn::Value(ExportValue::Instance(exported.clone()))
        });
        let log = EventLog::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let commander = commander_with(&project, provider, &log, &calls);

        let code = commander.start(["render"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.count("command.init"), 0);
        assert!(started_error(&log).contains("jsreport instance is already resolved"));
    }

    #[tokio::test]
    async fn port_in_use_aborts_with_hint() {
        let project = TestProject::with_entry_point();
        let mock = MockInstance::new("server").fail_init(InitError::AddrInUse { port: 5488 });
        let provider = MockProvider::new().with_entry_instance(project.entry_point(), mock.shared());
        let log = EventLog::new();
        let failures = Arc::new(StartFailures::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let commander = commander_with(&project, provider, &log, &calls);
        commander.subscribe(failures.clone());

        let code = commander.start(["render"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(mock.init_calls(), 1);
        assert_eq!(log.count("instance.initializing"), 1);
        assert_eq!(log.count("instance.initialized"), 0);
        assert!(started_error(&log).contains("An error has occurred when trying to initialize jsreport"));
        assert_eq!(*failures.ports.lock().unwrap(), vec![Some(5488)]);
    }

    #[tokio::test]
    async fn generic_init_failure_has_no_port() {
        let project = TestProject::installed();
        let mock = MockInstance::new("default").fail_init(InitError::Failed("no license".into()));
        let provider = MockProvider::new().with_default_instance(mock.shared());
        let log = EventLog::new();
        let failures = Arc::new(StartFailures::default());
        let calls = Arc::new(AtomicUsize::new(0));
        let commander = commander_with(&project, provider, &log, &calls);
        commander.subscribe(failures.clone());

        assert_eq!(commander.start(["render"]).await, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(*failures.ports.lock().unwrap(), vec![None]);
    }

    #[tokio::test]
    async fn missing_entry_point_file_aborts() {
        let project = TestProject::with_entry_point();
        let log = EventLog::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let commander = commander_with(&project, MockProvider::new(), &log, &calls);

        let code = commander.start(["render"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.count("instance.lookup"), 1);
        assert_eq!(log.count("instance.found"), 0);
        let message = started_error(&log);
        assert!(message.contains("Couldn't find a jsreport entry point in"));
        assert!(message.contains("server.js"));
    }

    #[tokio::test]
    async fn invalid_entry_point_export_aborts() {
        let project = TestProject::with_entry_point();
        let provider = MockProvider::new().with_entry_other(project.entry_point(), "object");
        let log = EventLog::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let commander = commander_with(&project, provider, &log, &calls);

        let code = commander.start(["render"]).await;

        assert_eq!(code, ExitCode::Failure);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(log.count("instance.found"), 0);
        assert!(started_error(&log)
            .contains("Entry point must return a valid jsreport instance or a function"));
    }
}
