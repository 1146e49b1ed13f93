//! instance::process
//!
//! Provider that runs the reporting runtime as a `node` child process.
//!
//! # Design
//!
//! - Default construction runs a small bootstrap script that requires the
//!   installed package from the project directory, calls its factory, and
//!   starts it.
//! - An entry-point file is run directly as the process's main module.
//! - `init()` spawns the child and waits for a short startup window. A child
//!   still running after the window is considered started. A child that exits
//!   with a failure status during the window is a startup failure, with
//!   `EADDRINUSE` in its stderr reported as a port conflict.
//! - Loaded entry points are cached per path, so a later dispatch in the same
//!   process reuses the already started instance.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncReadExt;
use tokio::process::{Child, Command};

use super::locator::Package;
use super::provider::{DefaultOptions, ExportValue, InstanceProvider, LoadError};
use super::{InitError, ServiceInstance, SharedInstance};

/// How long a freshly spawned runtime must survive to count as started.
pub const STARTUP_WINDOW: Duration = Duration::from_millis(1500);

/// Marker printed by the bootstrap script when the port is taken.
const ADDR_IN_USE: &str = "EADDRINUSE";

/// Provider backed by `node` child processes.
#[derive(Debug)]
pub struct NodeProcessProvider {
    node: PathBuf,
    cwd: PathBuf,
    startup_window: Duration,
    cache: Mutex<HashMap<PathBuf, SharedInstance>>,
}

impl NodeProcessProvider {
    /// Create a provider running `node` from `PATH` in `cwd`.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        Self {
            node: PathBuf::from("node"),
            cwd: cwd.into(),
            startup_window: STARTUP_WINDOW,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Use a specific `node` executable.
    pub fn with_node(mut self, node: impl Into<PathBuf>) -> Self {
        self.node = node.into();
        self
    }

    /// Override the startup window.
    pub fn with_startup_window(mut self, window: Duration) -> Self {
        self.startup_window = window;
        self
    }

    fn spawn_spec(&self, args: Vec<String>) -> NodeProcess {
        NodeProcess {
            program: self.node.clone(),
            args,
            cwd: self.cwd.clone(),
            startup_window: self.startup_window,
            quiet: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            child: tokio::sync::Mutex::new(None),
        }
    }
}

#[async_trait]
impl InstanceProvider for NodeProcessProvider {
    fn create_default(
        &self,
        package: Package,
        options: DefaultOptions,
    ) -> anyhow::Result<SharedInstance> {
        let script = bootstrap_script(package, options);
        let process = self.spawn_spec(vec!["-e".to_string(), script]);
        if options.quiet_logging {
            process.silence_logging();
        }
        Ok(Arc::new(process))
    }

    async fn load_entry_point(&self, path: &Path) -> Result<ExportValue, LoadError> {
        if !path.is_file() {
            return Err(LoadError::NotFound);
        }

        let mut cache = self.cache.lock().unwrap_or_else(PoisonError::into_inner);
        let instance = cache
            .entry(path.to_path_buf())
            .or_insert_with(|| {
                Arc::new(self.spawn_spec(vec![path.to_string_lossy().into_owned()]))
            })
            .clone();
        Ok(ExportValue::Instance(instance))
    }
}

/// Build the script that default-constructs and starts `package`.
fn bootstrap_script(package: Package, options: DefaultOptions) -> String {
    let factory_options = if options.quiet_logging {
        "{ logger: { silent: true } }"
    } else {
        ""
    };

    format!(
        "const instance = require({name:?})({factory_options});\n\
         instance.init().catch((e) => {{\n\
         \x20 if (e && e.code === '{ADDR_IN_USE}') {{ console.error('{ADDR_IN_USE} port:' + e.port); }}\n\
         \x20 console.error(e && e.stack ? e.stack : e);\n\
         \x20 process.exit(1);\n\
         }});",
        name = package.name(),
    )
}

/// Runtime running in a child process.
#[derive(Debug)]
pub struct NodeProcess {
    program: PathBuf,
    args: Vec<String>,
    cwd: PathBuf,
    startup_window: Duration,
    quiet: AtomicBool,
    initialized: AtomicBool,
    child: tokio::sync::Mutex<Option<Child>>,
}

#[async_trait]
impl ServiceInstance for NodeProcess {
    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    async fn init(&self) -> Result<(), InitError> {
        let mut slot = self.child.lock().await;

        let mut command = Command::new(&self.program);
        command
            .args(&self.args)
            .current_dir(&self.cwd)
            .stdin(Stdio::null())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if self.quiet.load(Ordering::SeqCst) {
            command.stdout(Stdio::null());
        }

        tracing::debug!(program = %self.program.display(), args = ?self.args, "spawning runtime");
        let mut child = command
            .spawn()
            .map_err(|e| InitError::Failed(format!("failed to spawn {}: {}", self.program.display(), e)))?;
        let mut stderr = child.stderr.take();

        match tokio::time::timeout(self.startup_window, child.wait()).await {
            Ok(Ok(status)) => {
                let mut output = String::new();
                if let Some(stderr) = stderr.as_mut() {
                    let _ = stderr.read_to_string(&mut output).await;
                }
                if status.success() {
                    self.initialized.store(true, Ordering::SeqCst);
                    return Ok(());
                }
                Err(classify_failure(&output, &status.to_string()))
            }
            Ok(Err(e)) => Err(InitError::Failed(format!("failed to wait for runtime: {}", e))),
            Err(_elapsed) => {
                if let Some(mut stderr) = stderr {
                    tokio::spawn(async move {
                        let _ = tokio::io::copy(&mut stderr, &mut tokio::io::stderr()).await;
                    });
                }
                *slot = Some(child);
                self.initialized.store(true, Ordering::SeqCst);
                Ok(())
            }
        }
    }

    fn silence_logging(&self) {
        self.quiet.store(true, Ordering::SeqCst);
    }
}

/// Turn a failed child's stderr into an [`InitError`].
fn classify_failure(stderr: &str, status: &str) -> InitError {
    if let Some(port) = stderr
        .lines()
        .filter(|line| line.contains(ADDR_IN_USE))
        .find_map(trailing_port)
    {
        return InitError::AddrInUse { port };
    }

    let detail = stderr.trim();
    if detail.is_empty() {
        InitError::Failed(format!("runtime exited during startup ({})", status))
    } else {
        InitError::Failed(detail.to_string())
    }
}

fn trailing_port(line: &str) -> Option<u16> {
    let trimmed = line.trim_end();
    let digits_start = trimmed
        .rfind(|c: char| !c.is_ascii_digit())
        .map(|i| i + 1)
        .unwrap_or(0);
    trimmed[digits_start..].parse().ok()
}
