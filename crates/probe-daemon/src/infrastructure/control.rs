//! `ProbeCore`: the core-state object behind the daemon's control surface.
//!
//! One `ProbeCore` is built at process start and shared (behind an `Arc`) by
//! the observer server and the entry point.  It owns the registry, both
//! hubs, the publisher thread and every network component, and wires them
//! together:
//!
//! ```text
//!  DiscoveryService ─┐
//!  EvictionSweep ────┼──► DeviceRegistry ──► Publisher ──► Hubs ──► observers
//!  SessionManager ───┤                          ▲
//!  LogIngestService ─┴──────────────────────────┘
//! ```
//!
//! Components only talk to each other through the registry and the
//! publisher.  [`ProbeCore::shutdown`] tears everything down.

use std::net::SocketAddr;
use std::sync::Arc;
use std::thread::JoinHandle;

use probe_core::Device;
use tracing::info;

use super::error::{CoreError, LifecycleError, ServiceError, SessionError, SweepError};
use super::hub::{Hubs, Observer, ObserverId, SubscriptionKind};
use super::lifecycle::ServiceStatus;
use super::network::discovery::DiscoveryService;
use super::network::log_ingest::LogIngestService;
use super::network::session::{ConnectOutcome, SessionManager, SessionSettings};
use super::network::sweep::{EvictionSweep, SweepReport};
use super::publisher::Publisher;
use super::storage::config::AppConfig;
use crate::application::log_line::LogClock;
use crate::application::DeviceRegistry;

#[derive(Debug)]
pub struct ProbeCore {
    registry: Arc<DeviceRegistry>,
    hubs: Arc<Hubs>,
    publisher: Publisher,
    discovery: Arc<DiscoveryService>,
    sweep: EvictionSweep,
    sessions: SessionManager,
    log_ingest: LogIngestService,
}

impl ProbeCore {
    /// Builds the core from `config` and starts the publisher thread.
    ///
    /// No listener is started; call [`ProbeCore::start_discovery`] or
    /// [`ProbeCore::start_log_ingest`] for that.
    ///
    /// # Errors
    ///
    /// [`CoreError::Config`] for an invalid bind address, or
    /// [`CoreError::Spawn`] if the publisher thread cannot start.
    pub fn new(config: &AppConfig) -> Result<Self, CoreError> {
        let bind_ip = config.network.bind_ip()?;
        let poll_interval = config.timing.poll_interval();

        let registry = Arc::new(DeviceRegistry::new());
        let hubs = Arc::new(Hubs::new());
        let (publisher, _publisher_thread) =
            Publisher::spawn(Arc::clone(&registry), Arc::clone(&hubs)).map_err(CoreError::Spawn)?;

        let discovery = Arc::new(DiscoveryService::new(
            SocketAddr::new(bind_ip, config.network.discovery_port),
            poll_interval,
            Arc::clone(&registry),
            publisher.clone(),
        ));
        let sweep = EvictionSweep::new(
            Arc::clone(&discovery),
            Arc::clone(&registry),
            publisher.clone(),
            config.timing.sweep_duration(),
            config.discovery.merge_continuous_into_sweep,
        );
        let sessions = SessionManager::new(
            SessionSettings {
                session_port: config.network.session_port,
                poll_interval,
                keepalive_interval: config.timing.keepalive_interval(),
            },
            Arc::clone(&registry),
            publisher.clone(),
        );
        let log_ingest = LogIngestService::new(
            SocketAddr::new(bind_ip, config.network.log_port),
            poll_interval,
            config.log_ingest.directory.clone(),
            LogClock::from_config(&config.log_ingest.time_zone),
            publisher.clone(),
        );

        Ok(Self {
            registry,
            hubs,
            publisher,
            discovery,
            sweep,
            sessions,
            log_ingest,
        })
    }

    // ── Discovery ─────────────────────────────────────────────────────────────

    pub fn start_discovery(&self) -> Result<(), ServiceError> {
        self.discovery.start()
    }

    pub fn stop_discovery(&self) -> Result<(), LifecycleError> {
        self.discovery.stop()
    }

    pub fn discovery_status(&self) -> ServiceStatus {
        self.discovery.status()
    }

    /// Starts an eviction sweep in the background and returns immediately.
    pub fn run_eviction_sweep(
        &self,
    ) -> Result<JoinHandle<Result<SweepReport, SweepError>>, SweepError> {
        self.sweep.spawn()
    }

    /// Runs an eviction sweep on the calling thread.
    pub fn run_eviction_sweep_blocking(&self) -> Result<SweepReport, SweepError> {
        self.sweep.run_blocking()
    }

    // ── Log ingest ────────────────────────────────────────────────────────────

    pub fn start_log_ingest(&self) -> Result<(), ServiceError> {
        self.log_ingest.start()
    }

    pub fn stop_log_ingest(&self) -> Result<(), LifecycleError> {
        self.log_ingest.stop()
    }

    pub fn log_ingest_status(&self) -> ServiceStatus {
        self.log_ingest.status()
    }

    pub fn current_log_file(&self) -> Option<std::path::PathBuf> {
        self.log_ingest.current_file()
    }

    // ── Sessions ──────────────────────────────────────────────────────────────

    pub fn connect(&self, ip: &str) -> Result<ConnectOutcome, SessionError> {
        self.sessions.connect(ip)
    }

    /// Closes the session with `ip`; a no-op returning `false` without one.
    pub fn disconnect(&self, ip: &str) -> bool {
        self.sessions.disconnect(ip)
    }

    pub fn send_raw(
        &self,
        ip: &str,
        function: u32,
        stage: u32,
        data: &[u8],
    ) -> Result<(), SessionError> {
        self.sessions.send_raw(ip, function, stage, data)
    }

    // ── Registry and observers ────────────────────────────────────────────────

    pub fn current_device_snapshot(&self) -> Vec<Device> {
        self.registry.snapshot()
    }

    /// Adds `observer` to the hub for `kind`.
    ///
    /// A device subscription queues a snapshot broadcast so the new observer
    /// sees the current state without waiting for the next change.
    pub fn subscribe(&self, kind: SubscriptionKind, observer: Box<dyn Observer>) -> ObserverId {
        let id = self.hubs.get(kind).subscribe(observer);
        if kind == SubscriptionKind::Devices {
            self.publisher.devices_changed();
        }
        id
    }

    pub fn unsubscribe(&self, kind: SubscriptionKind, id: ObserverId) -> bool {
        self.hubs.get(kind).unsubscribe(id)
    }

    pub fn observer_count(&self, kind: SubscriptionKind) -> usize {
        self.hubs.get(kind).len()
    }

    /// Stops both listeners and closes every session.
    pub fn shutdown(&self) {
        self.discovery.shutdown();
        self.log_ingest.shutdown();
        let closed = self.sessions.disconnect_all();
        info!("probe core shut down ({closed} sessions closed)");
    }
}
