//! Device log ingestion over UDP.
//!
//! Devices send one text line per datagram to the log port (default 6002).
//! For each datagram the listener:
//!
//! 1. Trims the text and stamps it with the configured [`LogClock`]:
//!    `[2024-03-01 14:05:09.042] [10.0.0.5] boot complete`.
//! 2. Queues the line for the log hub.
//! 3. Appends the line plus `\n` to the log file.
//!
//! The log file is opened once per start, inside the configured directory
//! (created if missing), and named after the start time in the same zone,
//! e.g. `log_20240301_140500.txt`.  It stays open until the listener stops.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::net::{SocketAddr, UdpSocket};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use tracing::{debug, info, warn};

use super::{bind_udp, is_timeout_error};
use crate::application::log_line::{format_log_line, log_file_name, LogClock};
use crate::infrastructure::cancel::CancellationToken;
use crate::infrastructure::error::{LifecycleError, ServiceError};
use crate::infrastructure::lifecycle::{ListenerSlot, ServiceStatus};
use crate::infrastructure::publisher::Publisher;

/// Receive buffer size for log datagrams.
const LOG_BUFFER_SIZE: usize = 4096;

#[derive(Debug)]
pub struct LogIngestService {
    addr: SocketAddr,
    poll_interval: Duration,
    directory: PathBuf,
    clock: LogClock,
    publisher: Publisher,
    current_file: Arc<Mutex<Option<PathBuf>>>,
    slot: ListenerSlot,
}

impl LogIngestService {
    pub fn new(
        addr: SocketAddr,
        poll_interval: Duration,
        directory: PathBuf,
        clock: LogClock,
        publisher: Publisher,
    ) -> Self {
        Self {
            addr,
            poll_interval,
            directory,
            clock,
            publisher,
            current_file: Arc::new(Mutex::new(None)),
            slot: ListenerSlot::new("log ingest"),
        }
    }

    /// Binds the log port, opens a new log file and spawns the
    /// `probe-log-ingest` thread.
    ///
    /// # Errors
    ///
    /// - [`LifecycleError::AlreadyRunning`] if the listener is running.
    /// - [`ServiceError::Bind`] if the port cannot be bound.
    /// - [`ServiceError::LogFile`] if the directory or file cannot be created.
    pub fn start(&self) -> Result<(), ServiceError> {
        self.slot.start(|token| {
            let socket = bind_udp(self.addr, self.poll_interval).map_err(|source| {
                ServiceError::Bind {
                    addr: self.addr,
                    source,
                }
            })?;

            let path = self.directory.join(log_file_name(&self.clock.now()));
            let file = open_log_file(&self.directory, &path)?;

            let clock = self.clock;
            let publisher = self.publisher.clone();
            let handle = std::thread::Builder::new()
                .name("probe-log-ingest".to_string())
                .spawn(move || ingest_loop(socket, file, token, clock, &publisher))
                .map_err(ServiceError::Spawn)?;

            info!("log ingest listening on UDP {}, writing {}", self.addr, path.display());
            *self
                .current_file
                .lock()
                .unwrap_or_else(PoisonError::into_inner) = Some(path);
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
        info!("log ingest stopping");
        Ok(())
    }

    /// Stops the listener if running and waits for the file to be closed.
    pub fn shutdown(&self) {
        self.slot.stop_and_join();
    }

    pub fn status(&self) -> ServiceStatus {
        self.slot.status()
    }

    /// Path of the file opened by the most recent start.
    pub fn current_file(&self) -> Option<PathBuf> {
        self.current_file
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn open_log_file(directory: &Path, path: &Path) -> Result<File, ServiceError> {
    std::fs::create_dir_all(directory).map_err(|source| ServiceError::LogFile {
        path: directory.to_path_buf(),
        source,
    })?;
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|source| ServiceError::LogFile {
            path: path.to_path_buf(),
            source,
        })
}

fn ingest_loop(
    socket: UdpSocket,
    mut file: File,
    token: CancellationToken,
    clock: LogClock,
    publisher: &Publisher,
) {
    let mut buf = vec![0u8; LOG_BUFFER_SIZE];

    while !token.is_cancelled() {
        let (len, src) = match socket.recv_from(&mut buf) {
            Ok(pair) => pair,
            Err(e) if is_timeout_error(&e) => continue,
            Err(e) => {
                debug!("log ingest recv error: {e}");
                continue;
            }
        };

        let text = String::from_utf8_lossy(&buf[..len]);
        let line = format_log_line(&clock.now(), &src.ip().to_string(), &text);

        if let Err(e) = writeln!(file, "{line}") {
            warn!("failed to append to log file: {e}");
        }
        publisher.log(line);
    }

    if let Err(e) = file.flush() {
        warn!("failed to flush log file: {e}");
    }
    info!("log ingest stopped");
}
