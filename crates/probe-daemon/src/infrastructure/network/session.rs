//! Per-device UDP sessions.
//!
//! A session is a connected UDP socket aimed at the device's session port
//! (default 6001) plus two worker threads sharing one cancellation token:
//!
//! - **sender** (`probe-keepalive-<ip>`): writes the keepalive frame every
//!   keepalive interval.
//! - **receiver** (`probe-session-<ip>`): decodes every datagram the device
//!   sends back and publishes a `CMD_RESP ...` line to the log hub.
//!   Datagrams that fail to decode are dropped.
//!
//! # Locking
//!
//! The session table sits behind one mutex held for the whole of
//! [`SessionManager::connect`] and [`SessionManager::disconnect`], including
//! socket setup, the worker join and the registry update.  The registry lock
//! is only ever taken inside the session lock, never the other way round, so
//! `Connected` in the registry always matches a live entry in the table.
//!
//! I/O errors other than timeouts are logged at `debug` and the loops carry
//! on.  Only `disconnect` ends a session.

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr, SocketAddr, UdpSocket};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::JoinHandle;
use std::time::Duration;

use probe_core::{decode_frame, encode_frame, keepalive_frame};
use tracing::{debug, info, trace, warn};

use super::is_timeout_error;
use crate::application::responses::describe_response;
use crate::application::DeviceRegistry;
use crate::infrastructure::cancel::CancellationToken;
use crate::infrastructure::error::SessionError;
use crate::infrastructure::publisher::Publisher;

/// Receive buffer size for session datagrams.
const SESSION_BUFFER_SIZE: usize = 4096;

/// Result of [`SessionManager::connect`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectOutcome {
    /// A new session was opened from `local_ip`.
    Established { local_ip: String },
    /// A session already existed; nothing was changed.
    AlreadyConnected,
}

impl ConnectOutcome {
    /// The local address a new session uses; empty when nothing changed.
    pub fn local_ip(&self) -> &str {
        match self {
            ConnectOutcome::Established { local_ip } => local_ip,
            ConnectOutcome::AlreadyConnected => "",
        }
    }
}

struct Session {
    socket: Arc<UdpSocket>,
    token: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

/// Timing and port settings shared by every session.
#[derive(Debug, Clone, Copy)]
pub struct SessionSettings {
    pub session_port: u16,
    pub poll_interval: Duration,
    pub keepalive_interval: Duration,
}

pub struct SessionManager {
    settings: SessionSettings,
    registry: Arc<DeviceRegistry>,
    publisher: Publisher,
    sessions: Mutex<HashMap<String, Session>>,
}

impl SessionManager {
    pub fn new(settings: SessionSettings, registry: Arc<DeviceRegistry>, publisher: Publisher) -> Self {
        Self {
            settings,
            registry,
            publisher,
            sessions: Mutex::new(HashMap::new()),
        }
    }

    /// Opens a session to `ip`, or does nothing if one is already open.
    ///
    /// On success the device is marked `Connected` with the local address and
    /// a snapshot broadcast is queued.
    ///
    /// # Errors
    ///
    /// - [`SessionError::InvalidAddress`] if `ip` is not an IP literal.
    /// - [`SessionError::Connect`] if the socket cannot be created.
    /// - [`SessionError::Spawn`] if a worker thread cannot be started.
    pub fn connect(&self, ip: &str) -> Result<ConnectOutcome, SessionError> {
        let remote_ip: IpAddr = ip
            .trim()
            .parse()
            .map_err(|_| SessionError::InvalidAddress(ip.to_string()))?;
        let key = remote_ip.to_string();

        let mut sessions = self.lock();
        if sessions.contains_key(&key) {
            debug!("session with {key} already open");
            return Ok(ConnectOutcome::AlreadyConnected);
        }

        let remote = SocketAddr::new(remote_ip, self.settings.session_port);
        let socket = open_session_socket(remote, self.settings.poll_interval)
            .map_err(|source| SessionError::Connect {
                ip: key.clone(),
                source,
            })?;
        let local_ip = socket
            .local_addr()
            .map(|a| a.ip().to_string())
            .map_err(|source| SessionError::Connect {
                ip: key.clone(),
                source,
            })?;

        let socket = Arc::new(socket);
        let token = CancellationToken::new();
        let workers = self.spawn_workers(&key, &socket, &token)?;

        sessions.insert(
            key.clone(),
            Session {
                socket,
                token,
                workers,
            },
        );
        self.registry.mark_connected(&key, &local_ip);
        drop(sessions);

        info!("session opened with {remote} via {local_ip}");
        self.publisher.devices_changed();
        Ok(ConnectOutcome::Established { local_ip })
    }

    /// Closes the session with `ip` and waits for both workers to exit.
    ///
    /// Returns `false` if there was no session.
    pub fn disconnect(&self, ip: &str) -> bool {
        let key = normalize(ip);
        let mut sessions = self.lock();
        let Some(session) = sessions.remove(&key) else {
            debug!("disconnect: no session with {key}");
            return false;
        };

        close_session(&key, session);
        self.registry.mark_disconnected(&key);
        drop(sessions);

        info!("session with {key} closed");
        self.publisher.devices_changed();
        true
    }

    /// Closes every open session.  Returns how many were closed.
    pub fn disconnect_all(&self) -> usize {
        let mut sessions = self.lock();
        let drained: Vec<(String, Session)> = sessions.drain().collect();

        for (_, session) in &drained {
            session.token.cancel();
        }
        let count = drained.len();
        for (key, session) in drained {
            close_session(&key, session);
            self.registry.mark_disconnected(&key);
        }
        drop(sessions);

        if count > 0 {
            info!("closed {count} sessions");
            self.publisher.devices_changed();
        }
        count
    }

    /// Encodes and sends one frame on the session with `ip`.
    ///
    /// The write happens under the session lock, so it cannot land after a
    /// concurrent [`SessionManager::disconnect`] has returned.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoSession`] without a session, or
    /// [`SessionError::Send`] if the write fails.
    pub fn send_raw(&self, ip: &str, function: u32, stage: u32, data: &[u8]) -> Result<(), SessionError> {
        let key = normalize(ip);
        let frame = encode_frame(function, stage, data);
        let sessions = self.lock();
        let session = sessions
            .get(&key)
            .ok_or_else(|| SessionError::NoSession(key.clone()))?;
        session
            .socket
            .send(&frame)
            .map_err(|source| SessionError::Send { ip: key.clone(), source })?;
        drop(sessions);
        debug!("sent FN:{function} STAGE:{stage} ({} data bytes) to {key}", data.len());
        Ok(())
    }

    pub fn is_connected(&self, ip: &str) -> bool {
        self.lock().contains_key(&normalize(ip))
    }

    /// IPs with an open session, sorted.
    pub fn connected_ips(&self) -> Vec<String> {
        let mut ips: Vec<String> = self.lock().keys().cloned().collect();
        ips.sort();
        ips
    }

    fn spawn_workers(
        &self,
        ip: &str,
        socket: &Arc<UdpSocket>,
        token: &CancellationToken,
    ) -> Result<Vec<JoinHandle<()>>, SessionError> {
        let sender = {
            let socket = Arc::clone(socket);
            let token = token.clone();
            let interval = self.settings.keepalive_interval;
            let ip = ip.to_string();
            std::thread::Builder::new()
                .name(format!("probe-keepalive-{ip}"))
                .spawn(move || keepalive_loop(&socket, &token, interval, &ip))
                .map_err(SessionError::Spawn)?
        };

        let receiver = {
            let socket = Arc::clone(socket);
            let token = token.clone();
            let publisher = self.publisher.clone();
            let ip = ip.to_string();
            std::thread::Builder::new()
                .name(format!("probe-session-{ip}"))
                .spawn(move || receive_loop(&socket, &token, &publisher, &ip))
        };

        match receiver {
            Ok(receiver) => Ok(vec![sender, receiver]),
            Err(e) => {
                token.cancel();
                let _ = sender.join();
                Err(SessionError::Spawn(e))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, Session>> {
        self.sessions.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for SessionManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionManager")
            .field("settings", &self.settings)
            .field("sessions", &self.connected_ips())
            .finish()
    }
}

/// Canonical table key for `ip`; falls back to the trimmed input.
fn normalize(ip: &str) -> String {
    let ip = ip.trim();
    ip.parse::<IpAddr>()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| ip.to_string())
}

fn open_session_socket(remote: SocketAddr, poll_interval: Duration) -> std::io::Result<UdpSocket> {
    let unspecified: IpAddr = match remote {
        SocketAddr::V4(_) => Ipv4Addr::UNSPECIFIED.into(),
        SocketAddr::V6(_) => Ipv6Addr::UNSPECIFIED.into(),
    };
    let socket = UdpSocket::bind(SocketAddr::new(unspecified, 0))?;
    socket.connect(remote)?;
    socket.set_read_timeout(Some(poll_interval))?;
    Ok(socket)
}

/// Cancels the workers, waits for both, then drops the socket.
fn close_session(ip: &str, session: Session) {
    session.token.cancel();
    for worker in session.workers {
        if worker.join().is_err() {
            warn!("session worker for {ip} panicked");
        }
    }
    drop(session.socket);
}

fn keepalive_loop(socket: &UdpSocket, token: &CancellationToken, interval: Duration, ip: &str) {
    let frame = keepalive_frame();
    while !token.wait(interval) {
        match socket.send(&frame) {
            Ok(_) => trace!("keepalive sent to {ip}"),
            Err(e) => debug!("keepalive to {ip} failed: {e}"),
        }
    }
    trace!("keepalive sender for {ip} stopped");
}

fn receive_loop(socket: &UdpSocket, token: &CancellationToken, publisher: &Publisher, ip: &str) {
    let mut buf = vec![0u8; SESSION_BUFFER_SIZE];

    while !token.is_cancelled() {
        let len = match socket.recv(&mut buf) {
            Ok(len) => len,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                debug!("session recv from {ip} failed: {e}");
                // Connected UDP sockets report ICMP errors immediately;
                // pace the loop to the poll interval.
                if token.wait(socket.read_timeout().ok().flatten().unwrap_or_default()) {
                    break;
                }
                continue;
            }
        };

        // A datagram that lands after cancellation is not reported.
        if token.is_cancelled() {
            break;
        }

        match decode_frame(&buf[..len]) {
            Ok(frame) => publisher.log(describe_response(ip, &frame)),
            Err(e) => trace!("dropping undecodable datagram from {ip}: {e}"),
        }
    }
    trace!("session receiver for {ip} stopped");
}
