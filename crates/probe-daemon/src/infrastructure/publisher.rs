//! Publisher thread: moves hub publication off the threads that mutate state.
//!
//! Discovery, sweeps, sessions and log ingest never write to observers
//! themselves.  They push a [`PublishRequest`] onto an unbounded channel
//! through a cloneable [`Publisher`] handle, and a single `probe-publisher`
//! thread drains the channel:
//!
//! - `DevicesChanged` → take a registry snapshot, send it to the device hub.
//!   Requests that queue up while a snapshot is being published collapse into
//!   one, since only the latest snapshot matters.
//! - `Log(line)` → send the line to the log hub, in order.
//!
//! The thread exits once every `Publisher` handle has been dropped.

use std::sync::mpsc::{self, Receiver, Sender, TryRecvError};
use std::sync::Arc;
use std::thread::JoinHandle;

use probe_core::Device;
use serde::Serialize;
use tracing::{debug, error, trace};

use super::hub::Hubs;
use crate::application::DeviceRegistry;

/// Outbound message shapes of the observer protocol.
///
/// ```json
/// {"type":"devices","data":[{"ip":"10.0.0.5","id":"Sensor1","status":"Available"}]}
/// {"type":"log","data":"[2024-03-01 14:05:09.042] [10.0.0.5] boot complete"}
/// ```
#[derive(Debug, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
pub enum ObserverMessage<'a> {
    Devices(&'a [Device]),
    Log(&'a str),
}

impl ObserverMessage<'_> {
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[derive(Debug)]
enum PublishRequest {
    DevicesChanged,
    Log(String),
}

/// Cheap handle for queueing hub publications.
#[derive(Debug, Clone)]
pub struct Publisher {
    tx: Sender<PublishRequest>,
}

impl Publisher {
    /// Spawns the publisher thread.
    ///
    /// # Errors
    ///
    /// Returns the OS error if the thread cannot be spawned.
    pub fn spawn(
        registry: Arc<DeviceRegistry>,
        hubs: Arc<Hubs>,
    ) -> std::io::Result<(Self, JoinHandle<()>)> {
        let (tx, rx) = mpsc::channel();
        let handle = std::thread::Builder::new()
            .name("probe-publisher".to_string())
            .spawn(move || publish_loop(rx, &registry, &hubs))?;
        Ok((Self { tx }, handle))
    }

    /// Queues a device snapshot broadcast.
    pub fn devices_changed(&self) {
        self.send(PublishRequest::DevicesChanged);
    }

    /// Queues one line for the log hub.
    pub fn log(&self, line: impl Into<String>) {
        self.send(PublishRequest::Log(line.into()));
    }

    fn send(&self, request: PublishRequest) {
        if self.tx.send(request).is_err() {
            debug!("publisher thread gone; dropping publication");
        }
    }
}

fn publish_loop(rx: Receiver<PublishRequest>, registry: &DeviceRegistry, hubs: &Hubs) {
    while let Ok(first) = rx.recv() {
        let mut devices_pending = false;
        let mut next = Some(first);

        // Drain whatever is already queued so bursts of DevicesChanged
        // produce one snapshot.  Log lines keep their order.
        while let Some(request) = next {
            match request {
                PublishRequest::DevicesChanged => devices_pending = true,
                PublishRequest::Log(line) => publish_log(hubs, &line),
            }
            next = match rx.try_recv() {
                Ok(request) => Some(request),
                Err(TryRecvError::Empty | TryRecvError::Disconnected) => None,
            };
        }

        if devices_pending {
            publish_devices(registry, hubs);
        }
    }
    debug!("publisher thread stopped");
}

fn publish_devices(registry: &DeviceRegistry, hubs: &Hubs) {
    let snapshot = registry.snapshot();
    match ObserverMessage::Devices(&snapshot).to_json() {
        Ok(json) => {
            let reached = hubs.devices.publish(&json);
            trace!("device snapshot ({} devices) sent to {reached} observers", snapshot.len());
        }
        Err(e) => error!("failed to serialize device snapshot: {e}"),
    }
}

fn publish_log(hubs: &Hubs, line: &str) {
    match ObserverMessage::Log(line).to_json() {
        Ok(json) => {
            hubs.log.publish(&json);
        }
        Err(e) => error!("failed to serialize log line: {e}"),
    }
}
