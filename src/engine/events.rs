//! engine::events
//!
//! Typed observer interface for dispatcher lifecycle events.
//!
//! # Events
//!
//! | Event | Observer method |
//! |-------|-----------------|
//! | `initialized` | [`CommanderObserver::initialized`] |
//! | `starting` | [`CommanderObserver::starting`] |
//! | `started` | [`CommanderObserver::started`] |
//! | `instance.lookup` | [`CommanderObserver::instance_lookup`] |
//! | `instance.found` / `instance.default` | [`CommanderObserver::instance_found`] / [`CommanderObserver::instance_default`] |
//! | `instance.initializing` / `instance.initialized` | [`CommanderObserver::instance_initializing`] / [`CommanderObserver::instance_initialized`] |
//! | `command.register` | [`CommanderObserver::command_registered`] |
//! | `command.init/success/error/finish` | `command_*` methods |
//! | `command.<name>.init/success/error/finish` | [`CommandObserver`] subscribed for `<name>` |
//!
//! # Ordering
//!
//! For every dispatched command: the global `init` is delivered before the
//! command-scoped `init`, both before the handler runs; the terminal event
//! (`success` or `error`, global then scoped) is delivered before `finish`
//! (global then scoped). Observers are called synchronously in subscription
//! order.

use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError, RwLock};

use super::context::{CommandArgs, CommandValue};
use super::error::CommanderError;
use super::registry::CommandSpec;
use crate::instance::{InstanceInfo, Package, SharedInstance};

/// Payload of a successful `started` event.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StartInfo {
    /// Whether the arguments name a registered command or ask for help/version.
    pub handled: bool,
    /// The dotted main command, absent when no command was given.
    pub main_command: Option<String>,
}

/// Observer for dispatcher-wide events.
///
/// Every method has an empty default, so observers only implement what they
/// care about.
#[allow(unused_variables)]
pub trait CommanderObserver: Send + Sync {
    fn initialized(&self) {}
    fn starting(&self) {}
    fn started(&self, result: Result<&StartInfo, &CommanderError>) {}
    fn instance_lookup(&self, info: &InstanceInfo) {}
    fn instance_found(&self, instance: &SharedInstance, entry_point: &Path) {}
    fn instance_default(&self, instance: &SharedInstance, package: Package) {}
    fn instance_initializing(&self) {}
    fn instance_initialized(&self, instance: &SharedInstance) {}
    fn command_registered(&self, name: &str, spec: &CommandSpec) {}
    fn command_init(&self, name: &str, args: &CommandArgs) {}
    fn command_success(&self, name: &str, value: &CommandValue) {}
    fn command_error(&self, name: &str, error: &anyhow::Error) {}
    fn command_finish(&self, name: &str) {}
}

/// Observer for the events of one command.
#[allow(unused_variables)]
pub trait CommandObserver: Send + Sync {
    fn init(&self, args: &CommandArgs) {}
    fn success(&self, value: &CommandValue) {}
    fn error(&self, error: &anyhow::Error) {}
    fn finish(&self) {}
}

#[derive(Default)]
struct Observers {
    global: Vec<Arc<dyn CommanderObserver>>,
    named: HashMap<String, Vec<Arc<dyn CommandObserver>>>,
}

/// Fan-out of events to subscribed observers.
///
/// Clones share the same subscriber lists. Observers are snapshotted before
/// delivery, so an observer may subscribe others without deadlocking.
#[derive(Clone, Default)]
pub struct EventBus {
    observers: Arc<RwLock<Observers>>,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let observers = self.observers.read().unwrap_or_else(PoisonError::into_inner);
        f.debug_struct("EventBus")
            .field("global", &observers.global.len())
            .field("named", &observers.named.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, observer: Arc<dyn CommanderObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .global
            .push(observer);
    }

    pub fn subscribe_command(&self, name: impl Into<String>, observer: Arc<dyn CommandObserver>) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .named
            .entry(name.into())
            .or_default()
            .push(observer);
    }

    fn global(&self) -> Vec<Arc<dyn CommanderObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .global
            .clone()
    }

    fn named(&self, name: &str) -> Vec<Arc<dyn CommandObserver>> {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .named
            .get(name)
            .cloned()
            .unwrap_or_default()
    }

    pub fn initialized(&self) {
        self.global().iter().for_each(|o| o.initialized());
    }

    pub fn starting(&self) {
        self.global().iter().for_each(|o| o.starting());
    }

    pub fn started(&self, result: Result<&StartInfo, &CommanderError>) {
        self.global().iter().for_each(|o| o.started(result));
    }

    pub fn instance_lookup(&self, info: &InstanceInfo) {
        self.global().iter().for_each(|o| o.instance_lookup(info));
    }

    pub fn instance_found(&self, instance: &SharedInstance, entry_point: &Path) {
        self.global()
            .iter()
            .for_each(|o| o.instance_found(instance, entry_point));
    }

    pub fn instance_default(&self, instance: &SharedInstance, package: Package) {
        self.global()
            .iter()
            .for_each(|o| o.instance_default(instance, package));
    }

    pub fn instance_initializing(&self) {
        self.global().iter().for_each(|o| o.instance_initializing());
    }

    pub fn instance_initialized(&self, instance: &SharedInstance) {
        self.global()
            .iter()
            .for_each(|o| o.instance_initialized(instance));
    }

    pub fn command_registered(&self, name: &str, spec: &CommandSpec) {
        self.global()
            .iter()
            .for_each(|o| o.command_registered(name, spec));
    }

    pub fn command_init(&self, name: &str, args: &CommandArgs) {
        self.global().iter().for_each(|o| o.command_init(name, args));
        self.named(name).iter().for_each(|o| o.init(args));
    }

    pub fn command_success(&self, name: &str, value: &CommandValue) {
        self.global()
            .iter()
            .for_each(|o| o.command_success(name, value));
        self.named(name).iter().for_each(|o| o.success(value));
    }

    pub fn command_error(&self, name: &str, error: &anyhow::Error) {
        self.global().iter().for_each(|o| o.command_error(name, error));
        self.named(name).iter().for_each(|o| o.error(error));
    }

    pub fn command_finish(&self, name: &str) {
        self.global().iter().for_each(|o| o.command_finish(name));
        self.named(name).iter().for_each(|o| o.finish());
    }
}

/// A recorded event.
#[derive(Debug, Clone)]
pub enum Event {
    Initialized,
    Starting,
    Started(Result<StartInfo, String>),
    InstanceLookup(InstanceInfo),
    InstanceFound {
        instance: SharedInstance,
        entry_point: PathBuf,
    },
    InstanceDefault {
        instance: SharedInstance,
        package: Package,
    },
    InstanceInitializing,
    InstanceInitialized(SharedInstance),
    CommandRegistered(String),
    CommandInit { command: String, scoped: bool },
    CommandSuccess {
        command: String,
        value: CommandValue,
        scoped: bool,
    },
    CommandError {
        command: String,
        message: String,
        scoped: bool,
    },
    CommandFinish { command: String, scoped: bool },
}

impl Event {
    /// Dotted event name, e.g. `instance.found` or `command.render.init`.
    pub fn name(&self) -> String {
        fn command_event(command: &str, scoped: bool, suffix: &str) -> String {
            if scoped {
                format!("command.{}.{}", command, suffix)
            } else {
                format!("command.{}", suffix)
            }
        }

        match self {
            Event::Initialized => "initialized".into(),
            Event::Starting => "starting".into(),
            Event::Started(_) => "started".into(),
            Event::InstanceLookup(_) => "instance.lookup".into(),
            Event::InstanceFound { .. } => "instance.found".into(),
            Event::InstanceDefault { .. } => "instance.default".into(),
            Event::InstanceInitializing => "instance.initializing".into(),
            Event::InstanceInitialized(_) => "instance.initialized".into(),
            Event::CommandRegistered(_) => "command.register".into(),
            Event::CommandInit { command, scoped } => command_event(command, *scoped, "init"),
            Event::CommandSuccess {
                command, scoped, ..
            } => command_event(command, *scoped, "success"),
            Event::CommandError {
                command, scoped, ..
            } => command_event(command, *scoped, "error"),
            Event::CommandFinish { command, scoped } => command_event(command, *scoped, "finish"),
        }
    }
}

/// Observer that records every event it receives.
///
/// Subscribe it globally with [`EventBus::subscribe`] and per command with
/// [`EventLog::scoped`].
#[derive(Debug, Clone, Default)]
pub struct EventLog {
    events: Arc<Mutex<Vec<Event>>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Observer recording the scoped events of `command` into this log.
    pub fn scoped(&self, command: impl Into<String>) -> Arc<dyn CommandObserver> {
        Arc::new(ScopedLog {
            command: command.into(),
            log: self.clone(),
        })
    }

    pub fn events(&self) -> Vec<Event> {
        self.lock().clone()
    }

    /// Event names in delivery order.
    pub fn names(&self) -> Vec<String> {
        self.lock().iter().map(Event::name).collect()
    }

    /// Position of the first event called `name`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.lock().iter().position(|e| e.name() == name)
    }

    /// Number of events called `name`.
    pub fn count(&self, name: &str) -> usize {
        self.lock().iter().filter(|e| e.name() == name).count()
    }

    /// Whether any `instance.*` event was recorded.
    pub fn has_instance_events(&self) -> bool {
        self.lock().iter().any(|e| e.name().starts_with("instance."))
    }

    fn push(&self, event: Event) {
        self.lock().push(event);
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Event>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl CommanderObserver for EventLog {
    fn initialized(&self) {
        self.push(Event::Initialized);
    }

    fn starting(&self) {
        self.push(Event::Starting);
    }

    fn started(&self, result: Result<&StartInfo, &CommanderError>) {
        self.push(Event::Started(
            result.map(Clone::clone).map_err(|e| e.to_string()),
        ));
    }

    fn instance_lookup(&self, info: &InstanceInfo) {
        self.push(Event::InstanceLookup(info.clone()));
    }

    fn instance_found(&self, instance: &SharedInstance, entry_point: &Path) {
        self.push(Event::InstanceFound {
            instance: Arc::clone(instance),
            entry_point: entry_point.to_path_buf(),
        });
    }

    fn instance_default(&self, instance: &SharedInstance, package: Package) {
        self.push(Event::InstanceDefault {
            instance: Arc::clone(instance),
            package,
        });
    }

    fn instance_initializing(&self) {
        self.push(Event::InstanceInitializing);
    }

    fn instance_initialized(&self, instance: &SharedInstance) {
        self.push(Event::InstanceInitialized(Arc::clone(instance)));
    }

    fn command_registered(&self, name: &str, _spec: &CommandSpec) {
        self.push(Event::CommandRegistered(name.to_string()));
    }

    fn command_init(&self, name: &str, _args: &CommandArgs) {
        self.push(Event::CommandInit {
            command: name.to_string(),
            scoped: false,
        });
    }

    fn command_success(&self, name: &str, value: &CommandValue) {
        self.push(Event::CommandSuccess {
            command: name.to_string(),
            value: value.clone(),
            scoped: false,
        });
    }

    fn command_error(&self, name: &str, error: &anyhow::Error) {
        self.push(Event::CommandError {
            command: name.to_string(),
            message: format!("{:#}", error),
            scoped: false,
        });
    }

    fn command_finish(&self, name: &str) {
        self.push(Event::CommandFinish {
            command: name.to_string(),
            scoped: false,
        });
    }
}

struct ScopedLog {
    command: String,
    log: EventLog,
}

impl CommandObserver for ScopedLog {
    fn init(&self, _args: &CommandArgs) {
        self.log.push(Event::CommandInit {
            command: self.command.clone(),
            scoped: true,
        });
    }

    fn success(&self, value: &CommandValue) {
        self.log.push(Event::CommandSuccess {
            command: self.command.clone(),
            value: value.clone(),
            scoped: true,
        });
    }

    fn error(&self, error: &anyhow::Error) {
        self.log.push(Event::CommandError {
            command: self.command.clone(),
            message: format!("{:#}", error),
            scoped: true,
        });
    }

    fn finish(&self) {
        self.log.push(Event::CommandFinish {
            command: self.command.clone(),
            scoped: true,
        });
    }
}
