//! Helpers shared by the probe-daemon integration tests.
//!
//! Every test binds its own loopback ports so tests can run in parallel.

#![allow(dead_code)]

use std::net::{SocketAddr, UdpSocket};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use probe_daemon::application::DeviceRegistry;
use probe_daemon::infrastructure::hub::{Hubs, Observer, ObserverError};
use probe_daemon::infrastructure::publisher::Publisher;

/// Poll interval used by every test listener; keeps shutdown fast.
pub const POLL: Duration = Duration::from_millis(50);

/// Generous upper bound for anything crossing a thread boundary.
pub const DEADLINE: Duration = Duration::from_secs(5);

/// Returns a loopback UDP port that was free a moment ago.
pub fn free_udp_port() -> u16 {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind ephemeral UDP port");
    socket.local_addr().expect("local addr").port()
}

pub fn loopback(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Sends `payload` to `port` on loopback from a fresh ephemeral socket.
pub fn send_datagram(port: u16, payload: &[u8]) {
    let socket = UdpSocket::bind("127.0.0.1:0").expect("bind sender");
    socket
        .send_to(payload, loopback(port))
        .expect("send datagram");
}

/// Calls `check` until it returns `true` or [`DEADLINE`] passes.
pub fn wait_until(mut check: impl FnMut() -> bool) -> bool {
    let start = Instant::now();
    while start.elapsed() < DEADLINE {
        if check() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(10));
    }
    check()
}

/// Observer that forwards every delivered message onto a std channel.
pub struct CollectingObserver {
    tx: Mutex<Sender<String>>,
}

impl CollectingObserver {
    pub fn new() -> (Self, Receiver<String>) {
        let (tx, rx) = mpsc::channel();
        (Self { tx: Mutex::new(tx) }, rx)
    }
}

impl Observer for CollectingObserver {
    fn deliver(&self, message: &str) -> Result<(), ObserverError> {
        self.tx
            .lock()
            .map_err(|_| ObserverError::Disconnected)?
            .send(message.to_string())
            .map_err(|_| ObserverError::Disconnected)
    }
}

/// Registry, hubs and a running publisher thread.
pub struct Fixture {
    pub registry: Arc<DeviceRegistry>,
    pub hubs: Arc<Hubs>,
    pub publisher: Publisher,
}

impl Fixture {
    pub fn new() -> Self {
        let registry = Arc::new(DeviceRegistry::new());
        let hubs = Arc::new(Hubs::new());
        let (publisher, _thread) =
            Publisher::spawn(Arc::clone(&registry), Arc::clone(&hubs)).expect("spawn publisher");
        Self {
            registry,
            hubs,
            publisher,
        }
    }

    /// Subscribes a collecting observer to the log hub.
    pub fn log_observer(&self) -> Receiver<String> {
        let (observer, rx) = CollectingObserver::new();
        self.hubs.log.subscribe(Box::new(observer));
        rx
    }

    /// Subscribes a collecting observer to the device hub.
    pub fn device_observer(&self) -> Receiver<String> {
        let (observer, rx) = CollectingObserver::new();
        self.hubs.devices.subscribe(Box::new(observer));
        rx
    }
}

/// Receives messages until one satisfies `pred` or [`DEADLINE`] passes.
pub fn recv_matching(rx: &Receiver<String>, pred: impl Fn(&str) -> bool) -> Option<String> {
    let start = Instant::now();
    while let Some(remaining) = DEADLINE.checked_sub(start.elapsed()) {
        match rx.recv_timeout(remaining) {
            Ok(msg) if pred(&msg) => return Some(msg),
            Ok(_) => continue,
            Err(_) => return None,
        }
    }
    None
}
