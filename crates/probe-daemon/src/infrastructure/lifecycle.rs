//! Start/stop bookkeeping shared by the discovery and log-ingest listeners.
//!
//! # States (for beginners)
//!
//! ```text
//!            start()                     stop()
//!   Idle ───────────────► Running ───────────────► Draining
//!    ▲                                                │
//!    └──────────── next start() joins worker ─────────┘
//! ```
//!
//! `stop()` only raises the worker's cancellation token and returns; the
//! worker notices within one poll interval and exits.  The next `start()`
//! joins that old worker before spawning a new one, so the old socket is
//! closed and the port can be bound again.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;

use tracing::warn;

use super::cancel::CancellationToken;
use super::error::{LifecycleError, ServiceError};

/// Reported by `discovery_status()` and `log_ingest_status()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceStatus {
    Running,
    Stopped,
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ServiceStatus::Running => f.write_str("running"),
            ServiceStatus::Stopped => f.write_str("stopped"),
        }
    }
}

#[derive(Debug, Default)]
struct SlotState {
    token: Option<CancellationToken>,
    worker: Option<JoinHandle<()>>,
}

/// Holds at most one running worker thread.
#[derive(Debug)]
pub struct ListenerSlot {
    name: &'static str,
    state: Mutex<SlotState>,
}

impl ListenerSlot {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            state: Mutex::new(SlotState::default()),
        }
    }

    /// Starts a worker through `spawn`, which receives the worker's token.
    ///
    /// `spawn` runs with the slot locked, so two concurrent starts cannot both
    /// succeed.  Its errors are returned unchanged and leave the slot idle.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::AlreadyRunning`] if a worker is running, or whatever
    /// `spawn` returns.
    pub fn start<F>(&self, spawn: F) -> Result<(), ServiceError>
    where
        F: FnOnce(CancellationToken) -> Result<JoinHandle<()>, ServiceError>,
    {
        let mut state = self.lock();
        if state.token.as_ref().is_some_and(|t| !t.is_cancelled()) {
            return Err(LifecycleError::AlreadyRunning.into());
        }

        if let Some(previous) = state.worker.take() {
            if previous.join().is_err() {
                warn!("{} worker panicked", self.name);
            }
        }
        state.token = None;

        let token = CancellationToken::new();
        let worker = spawn(token.clone())?;
        state.token = Some(token);
        state.worker = Some(worker);
        Ok(())
    }

    /// Raises the running worker's token without waiting for it to exit.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotRunning`] if no worker is running.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        let state = self.lock();
        match &state.token {
            Some(token) if !token.is_cancelled() => {
                token.cancel();
                Ok(())
            }
            _ => Err(LifecycleError::NotRunning),
        }
    }

    /// Stops the worker if it is running and waits for it to exit.
    pub fn stop_and_join(&self) {
        let worker = {
            let mut state = self.lock();
            if let Some(token) = state.token.take() {
                token.cancel();
            }
            state.worker.take()
        };
        if let Some(worker) = worker {
            if worker.join().is_err() {
                warn!("{} worker panicked", self.name);
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.lock()
            .token
            .as_ref()
            .is_some_and(|t| !t.is_cancelled())
    }

    pub fn status(&self) -> ServiceStatus {
        if self.is_running() {
            ServiceStatus::Running
        } else {
            ServiceStatus::Stopped
        }
    }

    fn lock(&self) -> MutexGuard<'_, SlotState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
