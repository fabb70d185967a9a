//! Network infrastructure for the probe daemon.
//!
//! # Sub-modules
//!
//! - **`discovery`** – Listens for device announcements on the discovery
//!   port and upserts every sender into the registry.  The same receive loop
//!   backs the temporary listener of an eviction sweep.
//!
//! - **`sweep`** – Runs one bounded eviction cycle: listen for a fixed
//!   window, then drop every `Available` device that stayed silent.
//!
//! - **`session`** – Owns one UDP session per connected device, each with a
//!   keepalive sender thread and a frame receiver thread.
//!
//! - **`log_ingest`** – Receives text log lines from devices, stamps them,
//!   publishes them and appends them to a log file.
//!
//! Every loop here runs on a dedicated OS thread with a blocking
//! `std::net::UdpSocket` whose read timeout is the configured poll interval,
//! so a cancelled worker exits within one interval.

pub mod discovery;
pub mod log_ingest;
pub mod session;
pub mod sweep;

use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

/// Binds a UDP socket on `addr` with `poll_interval` as its read timeout.
pub(crate) fn bind_udp(addr: SocketAddr, poll_interval: Duration) -> std::io::Result<UdpSocket> {
    let socket = UdpSocket::bind(addr)?;
    socket.set_read_timeout(Some(poll_interval))?;
    Ok(socket)
}

/// Returns `true` for OS timeout / would-block errors that should be retried.
pub(crate) fn is_timeout_error(e: &std::io::Error) -> bool {
    matches!(
        e.kind(),
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut
    )
}
