//! instance::guard
//!
//! One-shot guard for entry-point resolution.
//!
//! An entry-point function can complete in two ways: through its return
//! value, or by calling the [`ResolveHandle`] it was given. Only the first
//! completion is honored. Every later attempt moves the guard to
//! [`GuardState::DuplicateAttempted`] and is reported as a protocol violation.
//!
//! ```text
//! Unresolved --resolve--> Resolved
//!            --reject---> Rejected
//! Resolved | Rejected --any completion--> DuplicateAttempted
//! ```
//!
//! When every handle is dropped while the guard is still unresolved, waiting
//! on the guard yields `None` instead of hanging. A [`GuardWatch`] keeps
//! reporting the state after the guard itself has been consumed.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use thiserror::Error;
use tokio::sync::oneshot;

use super::provider::ExportValue;

/// A completion delivered through a handle.
pub type Completion = anyhow::Result<ExportValue>;

/// Guard state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardState {
    Unresolved,
    Resolved,
    Rejected,
    DuplicateAttempted,
}

/// A second completion was attempted.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
#[error("instance was already resolved")]
pub struct DuplicateResolution;

#[derive(Debug)]
struct Shared {
    state: GuardState,
    sender: Option<oneshot::Sender<Completion>>,
    live_handles: usize,
}

impl Shared {
    fn transition(&mut self, ok: bool) -> Result<(), DuplicateResolution> {
        match self.state {
            GuardState::Unresolved => {
                self.state = if ok {
                    GuardState::Resolved
                } else {
                    GuardState::Rejected
                };
                Ok(())
            }
            _ => {
                self.state = GuardState::DuplicateAttempted;
                Err(DuplicateResolution)
            }
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Owner side of the guard, held by the resolver.
#[derive(Debug)]
pub struct ResolutionGuard {
    shared: Arc<Mutex<Shared>>,
    receiver: oneshot::Receiver<Completion>,
}

impl Default for ResolutionGuard {
    fn default() -> Self {
        Self::new()
    }
}

impl ResolutionGuard {
    pub fn new() -> Self {
        let (sender, receiver) = oneshot::channel();
        Self {
            shared: Arc::new(Mutex::new(Shared {
                state: GuardState::Unresolved,
                sender: Some(sender),
                live_handles: 0,
            })),
            receiver,
        }
    }

    /// Create a handle to give to the entry point.
    pub fn handle(&self) -> ResolveHandle {
        lock(&self.shared).live_handles += 1;
        ResolveHandle {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Current state.
    pub fn state(&self) -> GuardState {
        lock(&self.shared).state
    }

    /// Record a completion that arrived through a return value.
    pub fn settle(&self, ok: bool) -> Result<(), DuplicateResolution> {
        lock(&self.shared).transition(ok)
    }

    /// Observer of the guard state that outlives the guard.
    pub fn watch(&self) -> GuardWatch {
        GuardWatch {
            shared: Arc::clone(&self.shared),
        }
    }

    /// Wait for the first completion delivered through a handle.
    ///
    /// Returns `None` if every handle was dropped without completing.
    pub async fn wait(self) -> Option<Completion> {
        self.receiver.await.ok()
    }
}

/// Read-only view of a guard's state.
///
/// Kept after resolution so that a completion attempted later can still be
/// detected.
#[derive(Debug, Clone)]
pub struct GuardWatch {
    shared: Arc<Mutex<Shared>>,
}

impl GuardWatch {
    pub fn state(&self) -> GuardState {
        lock(&self.shared).state
    }

    /// Whether a second completion was attempted.
    pub fn duplicate_attempted(&self) -> bool {
        self.state() == GuardState::DuplicateAttempted
    }
}

/// One-shot resolution capability passed to entry-point functions.
#[derive(Debug)]
pub struct ResolveHandle {
    shared: Arc<Mutex<Shared>>,
}

impl ResolveHandle {
    /// Resolve with an instance (or any exported value).
    pub fn resolve(&self, value: impl Into<ExportValue>) -> Result<(), DuplicateResolution> {
        self.complete(Ok(value.into()))
    }

    /// Reject with an error.
    pub fn reject(&self, error: impl Into<anyhow::Error>) -> Result<(), DuplicateResolution> {
        self.complete(Err(error.into()))
    }

    /// Whether any completion already went through this guard.
    pub fn is_settled(&self) -> bool {
        lock(&self.shared).state != GuardState::Unresolved
    }

    fn complete(&self, completion: Completion) -> Result<(), DuplicateResolution> {
        let mut shared = lock(&self.shared);
        if let Err(duplicate) = shared.transition(completion.is_ok()) {
            tracing::error!("entry point attempted to resolve the instance more than once");
            return Err(duplicate);
        }
        if let Some(sender) = shared.sender.take() {
            // The receiver is gone when the resolver settled through a return value.
            let _ = sender.send(completion);
        }
        Ok(())
    }
}

impl Clone for ResolveHandle {
    fn clone(&self) -> Self {
        lock(&self.shared).live_handles += 1;
        Self {
            shared: Arc::clone(&self.shared),
        }
    }
}

impl Drop for ResolveHandle {
    fn drop(&mut self) {
        let mut shared = lock(&self.shared);
        shared.live_handles = shared.live_handles.saturating_sub(1);
        if shared.live_handles == 0 && shared.state == GuardState::Unresolved {
            shared.sender = None;
        }
    }
}
