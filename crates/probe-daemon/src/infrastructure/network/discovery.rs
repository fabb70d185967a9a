//! UDP broadcast-based device discovery.
//!
//! Devices broadcast a datagram on the discovery port (default 6000) whose
//! payload is their identifier, optionally NUL-terminated.  The daemon binds
//! that port and, for every datagram:
//!
//! 1. Cuts the payload at the first NUL byte and trims whitespace.
//! 2. Upserts `(sender IP, identifier)` into the [`DeviceRegistry`].
//! 3. Queues a device snapshot broadcast through the [`Publisher`].
//!
//! # Read timeout
//!
//! The socket is configured with the poll interval (default 500 ms) as its
//! read timeout.  `recv_from` blocks for at most that long before returning
//! a timeout error, and on each timeout the loop checks its cancellation
//! token.  Stopping the listener therefore takes effect within one interval.
//!
//! # Sweep windows
//!
//! The same receive loop runs the temporary listener of an eviction sweep.
//! Every sender is then also recorded into the sweep's [`ScanWindow`].  The
//! continuous listener records into a window only while one is attached
//! through [`DiscoveryService::attach_window`], which the sweep does only when
//! `merge_continuous_into_sweep` is enabled.

use std::net::{SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{bind_udp, is_timeout_error};
use crate::application::{DeviceRegistry, ScanWindow, UpsertOutcome};
use crate::infrastructure::cancel::CancellationToken;
use crate::infrastructure::error::{LifecycleError, ServiceError};
use crate::infrastructure::lifecycle::{ListenerSlot, ServiceStatus};
use crate::infrastructure::publisher::Publisher;

/// Receive buffer size; announcements are short identifiers.
const DISCOVERY_BUFFER_SIZE: usize = 1024;

/// Where a discovery loop records the IPs it hears.
#[derive(Debug, Clone)]
pub(crate) enum WindowTap {
    /// Always record into this window (sweep listener).
    Fixed(Arc<ScanWindow>),
    /// Record into whatever window is attached, if any (continuous listener).
    Attachable(Arc<Mutex<Option<Arc<ScanWindow>>>>),
}

impl WindowTap {
    fn record(&self, ip: &str) {
        match self {
            WindowTap::Fixed(window) => window.record(ip),
            WindowTap::Attachable(slot) => {
                let attached = slot.lock().unwrap_or_else(PoisonError::into_inner);
                if let Some(window) = attached.as_ref() {
                    window.record(ip);
                }
            }
        }
    }
}

/// Extracts the announced identifier from a discovery datagram.
///
/// Bytes after the first NUL are ignored; invalid UTF-8 is replaced, never
/// rejected.
pub fn parse_announcement(payload: &[u8]) -> String {
    let end = payload.iter().position(|b| *b == 0).unwrap_or(payload.len());
    String::from_utf8_lossy(&payload[..end]).trim().to_string()
}

/// Continuous discovery listener.
#[derive(Debug)]
pub struct DiscoveryService {
    addr: SocketAddr,
    poll_interval: Duration,
    registry: Arc<DeviceRegistry>,
    publisher: Publisher,
    attached: Arc<Mutex<Option<Arc<ScanWindow>>>>,
    slot: ListenerSlot,
}

impl DiscoveryService {
    pub fn new(
        addr: SocketAddr,
        poll_interval: Duration,
        registry: Arc<DeviceRegistry>,
        publisher: Publisher,
    ) -> Self {
        Self {
            addr,
            poll_interval,
            registry,
            publisher,
            attached: Arc::new(Mutex::new(None)),
            slot: ListenerSlot::new("discovery"),
        }
    }

    /// Binds the discovery port and spawns the `probe-discovery` thread.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyRunning`] if the listener is running.
    /// - [`ServiceError::Bind`] if the port cannot be bound; the listener
    ///   stays stopped and is not retried.
    pub fn start(&self) -> Result<(), ServiceError> {
        let tap = WindowTap::Attachable(Arc::clone(&self.attached));
        self.slot.start(|token| {
            let socket = bind_udp(self.addr, self.poll_interval).map_err(|source| {
                ServiceError::Bind {
                    addr: self.addr,
                    source,
                }
            })?;
            let handle = spawn_listener(
                "probe-discovery",
                socket,
                token,
                Arc::clone(&self.registry),
                self.publisher.clone(),
                tap,
            )
            .map_err(ServiceError::Spawn)?;
            info!("discovery listening on UDP {}", self.addr);
            Ok(handle)
        })
    }

    /// Signals the listener to stop.  Returns without waiting for the thread.
    ///
    /// # Errors
    ///
    /// [`LifecycleError::NotRunning`] if the listener is not running.
    pub fn stop(&self) -> Result<(), LifecycleError> {
        self.slot.stop()?;
        info!("discovery stopping");
        Ok(())
    }

    /// Stops the listener if running and waits for its thread to exit.
    pub fn shutdown(&self) {
        self.slot.stop_and_join();
    }

    pub fn status(&self) -> ServiceStatus {
        self.slot.status()
    }

    pub fn is_running(&self) -> bool {
        self.slot.is_running()
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Routes this listener's senders into `window` until detached.
    pub fn attach_window(&self, window: Arc<ScanWindow>) {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = Some(window);
    }

    pub fn detach_window(&self) {
        *self.attached.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }
}

/// Spawns a discovery receive loop on its own named thread.
pub(crate) fn spawn_listener(
    thread_name: &str,
    socket: UdpSocket,
    token: CancellationToken,
    registry: Arc<DeviceRegistry>,
    publisher: Publisher,
    tap: WindowTap,
) -> std::io::Result<std::thread::JoinHandle<()>> {
    std::thread::Builder::new()
        .name(thread_name.to_string())
        .spawn(move || discovery_loop(socket, token, &registry, &publisher, &tap))
}

/// The receive loop executed on a discovery thread.
fn discovery_loop(
    socket: UdpSocket,
    token: CancellationToken,
    registry: &DeviceRegistry,
    publisher: &Publisher,
    tap: &WindowTap,
) {
    let mut buf = vec![0u8; DISCOVERY_BUFFER_SIZE];

    while !token.is_cancelled() {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                warn!("discovery recv error: {e}");
                continue;
            }
        };

        let ip = src.ip().to_string();
        let announced = parse_announcement(&buf[..len]);
        debug!("announcement from {ip}: {announced:?}");

        tap.record(&ip);
        if let UpsertOutcome::Renamed { previous } = registry.upsert(&ip, &announced) {
            debug!("{ip} was {previous}");
        }
        publisher.devices_changed();
    }

    info!("discovery listener on {:?} stopped", socket.local_addr().ok());
}
