//! instance::mock
//!
//! Mock instance and provider for deterministic testing.
//!
//! # Design
//!
//! [`MockInstance`] counts `init()` calls and can be configured to fail.
//! [`MockProvider`] serves pre-registered entry-point exports by path and
//! records every operation, so tests can drive the resolution state machine
//! without loading real modules.
//!
//! # Example
//!
//! ```
//! use jsreport_cli::instance::mock::{MockInstance, MockProvider};
//! use jsreport_cli::instance::{ensure_initialized, Resolver};
//! use std::sync::Arc;
//!
//! # tokio_test::block_on(async {
//! let mock = MockInstance::new("server");
//! let provider = MockProvider::new().with_entry_instance("/app/server.js", mock.shared());
//! let resolver = Resolver::new(Arc::new(provider));
//! # let _ = resolver;
//!
//! ensure_initialized(&mock.shared(), true).await.unwrap();
//! assert_eq!(mock.init_calls(), 1);
//! # });
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use super::guard::ResolveHandle;
use super::locator::Package;
use super::provider::{DefaultOptions, EntryPointReturn, ExportValue, InstanceProvider, LoadError};
use super::{InitError, ServiceInstance, SharedInstance};

/// Mock runtime instance.
///
/// Clones share state; [`MockInstance::shared`] returns a new handle to the
/// same state each time.
#[derive(Debug, Clone)]
pub struct MockInstance {
    name: String,
    inner: Arc<Mutex<MockInstanceInner>>,
}

#[derive(Debug, Default)]
struct MockInstanceInner {
    initialized: bool,
    init_calls: usize,
    silenced: bool,
    fail_with: Option<InitError>,
}

impl MockInstance {
    /// Create an uninitialized instance.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            inner: Arc::new(Mutex::new(MockInstanceInner::default())),
        }
    }

    /// Create an instance that is already initialized.
    pub fn initialized(name: impl Into<String>) -> Self {
        let mock = Self::new(name);
        mock.inner.lock().unwrap().initialized = true;
        mock
    }

    /// Make `init()` fail with `error`.
    pub fn fail_init(self, error: InitError) -> Self {
        self.inner.lock().unwrap().fail_with = Some(error);
        self
    }

    /// Wrap in a shared handle.
    pub fn shared(&self) -> SharedInstance {
        Arc::new(self.clone())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of times `init()` was called.
    pub fn init_calls(&self) -> usize {
        self.inner.lock().unwrap().init_calls
    }

    /// Whether `silence_logging()` was called.
    pub fn is_silenced(&self) -> bool {
        self.inner.lock().unwrap().silenced
    }
}

#[async_trait]
impl ServiceInstance for MockInstance {
    fn is_initialized(&self) -> bool {
        self.inner.lock().unwrap().initialized
    }

    async fn init(&self) -> Result<(), InitError> {
        let mut inner = self.inner.lock().unwrap();
        inner.init_calls += 1;
        if let Some(error) = inner.fail_with.clone() {
            return Err(error);
        }
        inner.initialized = true;
        Ok(())
    }

    fn silence_logging(&self) {
        self.inner.lock().unwrap().silenced = true;
    }
}

type EntryFactory = Arc<dyn Fn(ResolveHandle) -> EntryPointReturn + Send + Sync>;

#[derive(Clone)]
enum MockEntry {
    Instance(SharedInstance),
    Function(EntryFactory),
    Other(String),
    Error(String),
}

/// Recorded provider operation for test verification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockProviderOp {
    CreateDefault {
        package: Package,
        quiet_logging: bool,
    },
    LoadEntryPoint {
        path: PathBuf,
    },
}

/// Mock instance provider.
///
/// Thread-safe via internal `Arc<Mutex<...>>` wrapping.
#[derive(Clone, Default)]
pub struct MockProvider {
    inner: Arc<Mutex<MockProviderInner>>,
}

#[derive(Default)]
struct MockProviderInner {
    default_instance: Option<SharedInstance>,
    default_error: Option<String>,
    entries: HashMap<PathBuf, MockEntry>,
    operations: Vec<MockProviderOp>,
}

impl std::fmt::Debug for MockProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockProvider").finish_non_exhaustive()
    }
}

impl MockProvider {
    /// Create an empty provider.
    ///
    /// Default construction lazily creates one instance and keeps returning
    /// it; unknown entry-point paths are reported as not found.
    pub fn new() -> Self {
        Self::default()
    }

    /// Instance returned by default construction.
    pub fn with_default_instance(self, instance: SharedInstance) -> Self {
        self.inner.lock().unwrap().default_instance = Some(instance);
        self
    }

    /// Make default construction fail.
    pub fn fail_default(self, message: impl Into<String>) -> Self {
        self.inner.lock().unwrap().default_error = Some(message.into());
        self
    }

    /// Entry point exporting a ready instance.
    pub fn with_entry_instance(self, path: impl Into<PathBuf>, instance: SharedInstance) -> Self {
        self.insert(path, MockEntry::Instance(instance))
    }

    /// Entry point exporting a resolution function.
    ///
    /// `f` runs once per load, like a module function called per dispatch.
    pub fn with_entry_fn<F>(self, path: impl Into<PathBuf>, f: F) -> Self
    where
        F: Fn(ResolveHandle) -> EntryPointReturn + Send + Sync + 'static,
    {
        self.insert(path, MockEntry::Function(Arc::new(f)))
    }

    /// Entry point exporting an unrecognized value.
    pub fn with_entry_other(self, path: impl Into<PathBuf>, kind: impl Into<String>) -> Self {
        self.insert(path, MockEntry::Other(kind.into()))
    }

    /// Entry point that fails to load.
    pub fn with_entry_error(self, path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        self.insert(path, MockEntry::Error(message.into()))
    }

    /// Get all recorded operations.
    pub fn operations(&self) -> Vec<MockProviderOp> {
        self.inner.lock().unwrap().operations.clone()
    }

    fn insert(self, path: impl Into<PathBuf>, entry: MockEntry) -> Self {
        self.inner.lock().unwrap().entries.insert(path.into(), entry);
        self
    }

    fn record(&self, op: MockProviderOp) {
        self.inner.lock().unwrap().operations.push(op);
    }
}

#[async_trait]
impl InstanceProvider for MockProvider {
    fn create_default(
        &self,
        package: Package,
        options: DefaultOptions,
    ) -> anyhow::Result<SharedInstance> {
        self.record(MockProviderOp::CreateDefault {
            package,
            quiet_logging: options.quiet_logging,
        });

        let mut inner = self.inner.lock().unwrap();
        if let Some(message) = &inner.default_error {
            anyhow::bail!("{}", message);
        }
        let instance = inner
            .default_instance
            .get_or_insert_with(|| MockInstance::new(package.name()).shared());
        Ok(Arc::clone(instance))
    }

    async fn load_entry_point(&self, path: &Path) -> Result<ExportValue, LoadError> {
        self.record(MockProviderOp::LoadEntryPoint {
            path: path.to_path_buf(),
        });

        let entry = self.inner.lock().unwrap().entries.get(path).cloned();
        match entry {
            None => Err(LoadError::NotFound),
            Some(MockEntry::Instance(instance)) => Ok(ExportValue::Instance(instance)),
            Some(MockEntry::Function(f)) => Ok(ExportValue::function(move |handle| f(handle))),
            Some(MockEntry::Other(kind)) => Ok(ExportValue::Other(kind)),
            Some(MockEntry::Error(message)) => Err(LoadError::Failed(anyhow::anyhow!(message))),
        }
    }
}
