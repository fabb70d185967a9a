//! The device record and its naming rules.
//!
//! # Device lifecycle (for beginners)
//!
//! ```text
//!   announcement / connect
//!            │
//!            ▼
//!       Available  ◄────── disconnect ──────┐
//!            │                              │
//!            └────────── connect ──────►  Connected
//! ```
//!
//! - A device appears the first time the daemon hears an announcement from
//!   its IP, or when an operator connects to an IP directly.
//! - Until the device announces a real identifier it carries a deterministic
//!   placeholder such as `Unnamed_Device_10_0_0_5`.
//! - Only `Available` devices can be evicted by a sweep; a `Connected` device
//!   stays until its session is closed.

use serde::{Deserialize, Serialize};

/// Identifier given to a device first seen through a direct connect.
pub const DIRECT_CONNECT_ID: &str = "Direct_Connect";

/// Prefix shared by every placeholder identifier.
const PLACEHOLDER_PREFIX: &str = "Unnamed_Device_";

/// Whether a device currently has an open session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeviceStatus {
    /// Known to the registry, no session.
    Available,
    /// A session to this device is live.
    Connected,
}

impl std::fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DeviceStatus::Available => f.write_str("Available"),
            DeviceStatus::Connected => f.write_str("Connected"),
        }
    }
}

/// One device tracked by the registry, keyed by IP.
///
/// Serializes to the shape observers expect:
/// `{"ip": "...", "id": "...", "status": "Available", "connected_via": "..."}`
/// with `connected_via` omitted while no session is open.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Device {
    pub ip: String,
    pub id: String,
    pub status: DeviceStatus,
    /// Local address the session socket was bound to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub connected_via: Option<String>,
}

impl Device {
    /// Creates an `Available` device with the given identifier.
    pub fn available(ip: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            ip: ip.into(),
            id: id.into(),
            status: DeviceStatus::Available,
            connected_via: None,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == DeviceStatus::Connected
    }
}

/// Returns the placeholder identifier for a device that has not announced one.
///
/// # Examples
///
/// ```rust
/// use probe_core::placeholder_id;
///
/// assert_eq!(placeholder_id("10.0.0.5"), "Unnamed_Device_10_0_0_5");
/// ```
pub fn placeholder_id(ip: &str) -> String {
    format!("{PLACEHOLDER_PREFIX}{}", ip.replace('.', "_"))
}

/// Returns `true` if `id` was produced by [`placeholder_id`].
pub fn is_placeholder_id(id: &str) -> bool {
    id.starts_with(PLACEHOLDER_PREFIX)
}
