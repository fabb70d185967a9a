//! Error types returned by the daemon's control surface.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

use super::storage::config::ConfigError;

/// Start/stop called in the wrong state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("already running")]
    AlreadyRunning,
    #[error("not running")]
    NotRunning,
}

/// Error type for starting a listener (discovery or log ingest).
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    /// The UDP socket could not be bound.  The listener was not started.
    #[error("failed to bind UDP socket on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// The log directory or log file could not be created.
    #[error("failed to open log file {path}: {source}")]
    LogFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The OS refused to spawn the worker thread.
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Error type for session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// The target is not an IP address literal.
    #[error("invalid device address {0:?}")]
    InvalidAddress(String),

    /// The session socket could not be created or pointed at the device.
    #[error("failed to open session to {ip}: {source}")]
    Connect {
        ip: String,
        #[source]
        source: std::io::Error,
    },

    #[error("no session with {0}")]
    NoSession(String),

    #[error("failed to send to {ip}: {source}")]
    Send {
        ip: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn session worker: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Error type for eviction sweeps.
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("an eviction sweep is already in progress")]
    AlreadyInProgress,

    /// The temporary listener could not bind.  Nothing was evicted.
    #[error("failed to bind sweep listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to spawn sweep thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// Error type for building the core-state object.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to spawn publisher thread: {0}")]
    Spawn(#[source] std::io::Error),
}
