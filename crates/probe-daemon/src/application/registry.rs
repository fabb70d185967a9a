//! DeviceRegistry: the daemon's in-memory table of known devices.
//!
//! The registry is keyed by IP address.  Discovery inserts and renames
//! entries, the session manager flips them between `Available` and
//! `Connected`, and the eviction sweep removes `Available` entries that were
//! not heard from during its window.
//!
//! # Locking
//!
//! The table sits behind a single `std::sync::RwLock` owned by the registry.
//! Every method takes the lock for exactly one operation and returns owned
//! data, so no caller can hold a reference into the table across a lock
//! boundary.  [`DeviceRegistry::snapshot`] takes the read lock and may run
//! concurrently with other snapshots; everything else is exclusive.
//!
//! The registry never acquires any other lock while holding its own.

use std::collections::{BTreeMap, HashSet};
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use probe_core::{is_placeholder_id, placeholder_id, Device, DeviceStatus, DIRECT_CONNECT_ID};
use tracing::info;

/// What an [`DeviceRegistry::upsert`] call did to the table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// The IP was new and a device was inserted.
    Inserted,
    /// The device already existed and its identifier changed.
    Renamed { previous: String },
    /// Nothing changed.
    Unchanged,
}

/// Thread-safe table of devices keyed by IP.
///
/// A `BTreeMap` keeps snapshots ordered by IP string, which gives observers
/// a stable list without sorting on every publish.
#[derive(Debug, Default)]
pub struct DeviceRegistry {
    devices: RwLock<BTreeMap<String, Device>>,
}

impl DeviceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records an announcement from `ip` carrying `announced_id`.
    ///
    /// - Unknown IP: inserted as `Available` with `announced_id`, or with the
    ///   placeholder identifier when `announced_id` is empty.
    /// - Known IP: the identifier is replaced only when `announced_id` is
    ///   non-empty and different.  An empty announcement never erases a real
    ///   identifier.  Status is left untouched.
    pub fn upsert(&self, ip: &str, announced_id: &str) -> UpsertOutcome {
        let mut devices = self.write();

        match devices.get_mut(ip) {
            None => {
                let id = if announced_id.is_empty() {
                    placeholder_id(ip)
                } else {
                    announced_id.to_string()
                };
                info!("new device: {ip} ({id})");
                devices.insert(ip.to_string(), Device::available(ip, id));
                UpsertOutcome::Inserted
            }
            Some(device) => {
                if announced_id.is_empty() || device.id == announced_id {
                    return UpsertOutcome::Unchanged;
                }
                let previous = std::mem::replace(&mut device.id, announced_id.to_string());
                if is_placeholder_id(&previous) {
                    info!("device {ip} identified as {announced_id}");
                } else {
                    info!("device {ip} renamed: {previous} -> {announced_id}");
                }
                UpsertOutcome::Renamed { previous }
            }
        }
    }

    /// Marks `ip` as connected through `via`, creating the entry if needed.
    ///
    /// Devices created here carry [`DIRECT_CONNECT_ID`] until they announce.
    pub fn mark_connected(&self, ip: &str, via: &str) {
        let mut devices = self.write();
        let device = devices
            .entry(ip.to_string())
            .or_insert_with(|| Device::available(ip, DIRECT_CONNECT_ID));
        device.status = DeviceStatus::Connected;
        device.connected_via = Some(via.to_string());
    }

    /// Marks `ip` as available again.  Unknown IPs are ignored.
    pub fn mark_disconnected(&self, ip: &str) {
        if let Some(device) = self.write().get_mut(ip) {
            device.status = DeviceStatus::Available;
            device.connected_via = None;
        }
    }

    /// Returns a copy of every device, ordered by IP.
    pub fn snapshot(&self) -> Vec<Device> {
        self.read().values().cloned().collect()
    }

    /// Returns a copy of the device at `ip`, if any.
    pub fn get(&self, ip: &str) -> Option<Device> {
        self.read().get(ip).cloned()
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    /// Removes every `Available` device whose IP is not in `seen`.
    ///
    /// `Connected` devices are never removed.  Returns the evicted IPs.
    pub fn evict_stale_available(&self, seen: &HashSet<String>) -> Vec<String> {
        let mut devices = self.write();
        let stale: Vec<String> = devices
            .values()
            .filter(|d| !d.is_connected() && !seen.contains(&d.ip))
            .map(|d| d.ip.clone())
            .collect();

        for ip in &stale {
            devices.remove(ip);
            info!("removing stale device: {ip}");
        }
        stale
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<String, Device>> {
        self.devices.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<String, Device>> {
        self.devices.write().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seen(ips: &[&str]) -> HashSet<String> {
        ips.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_registry_starts_empty() {
        let registry = DeviceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.snapshot().is_empty());
    }

    #[test]
    fn test_upsert_inserts_with_placeholder_when_id_empty() {
        let registry = DeviceRegistry::new();

        let outcome = registry.upsert("10.0.0.5", "");

        assert_eq!(outcome, UpsertOutcome::Inserted);
        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.id, "Unnamed_Device_10_0_0_5");
        assert_eq!(device.status, DeviceStatus::Available);
    }

    #[test]
    fn test_upsert_is_idempotent_for_same_id() {
        let registry = DeviceRegistry::new();
        registry.upsert("10.0.0.5", "Sensor1");
        let before = registry.get("10.0.0.5").unwrap();

        for _ in 0..5 {
            assert_eq!(registry.upsert("10.0.0.5", "Sensor1"), UpsertOutcome::Unchanged);
        }

        assert_eq!(registry.get("10.0.0.5").unwrap(), before);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_placeholder_is_upgraded_and_never_reverted() {
        // Arrange
        let registry = DeviceRegistry::new();
        registry.upsert("10.0.0.5", "");

        // Act
        let upgraded = registry.upsert("10.0.0.5", "Sensor1");
        let reverted = registry.upsert("10.0.0.5", "");

        // Assert
        assert_eq!(
            upgraded,
            UpsertOutcome::Renamed {
                previous: "Unnamed_Device_10_0_0_5".to_string()
            }
        );
        assert_eq!(reverted, UpsertOutcome::Unchanged);
        assert_eq!(registry.get("10.0.0.5").unwrap().id, "Sensor1");
    }

    #[test]
    fn test_upsert_renames_when_announced_id_changes() {
        let registry = DeviceRegistry::new();
        registry.upsert("10.0.0.5", "Sensor1");
        registry.upsert("10.0.0.5", "Sensor2");
        assert_eq!(registry.get("10.0.0.5").unwrap().id, "Sensor2");
    }

    #[test]
    fn test_upsert_does_not_touch_connected_status() {
        let registry = DeviceRegistry::new();
        registry.mark_connected("10.0.0.5", "10.0.0.2");

        registry.upsert("10.0.0.5", "Sensor1");

        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.id, "Sensor1");
        assert_eq!(device.status, DeviceStatus::Connected);
        assert_eq!(device.connected_via.as_deref(), Some("10.0.0.2"));
    }

    #[test]
    fn test_mark_connected_creates_direct_connect_entry() {
        let registry = DeviceRegistry::new();

        registry.mark_connected("10.0.0.9", "10.0.0.2");

        let device = registry.get("10.0.0.9").unwrap();
        assert_eq!(device.id, DIRECT_CONNECT_ID);
        assert_eq!(device.status, DeviceStatus::Connected);
    }

    #[test]
    fn test_mark_disconnected_clears_session_address() {
        let registry = DeviceRegistry::new();
        registry.upsert("10.0.0.5", "Sensor1");
        registry.mark_connected("10.0.0.5", "10.0.0.2");

        registry.mark_disconnected("10.0.0.5");

        let device = registry.get("10.0.0.5").unwrap();
        assert_eq!(device.status, DeviceStatus::Available);
        assert!(device.connected_via.is_none());
        assert_eq!(device.id, "Sensor1");
    }

    #[test]
    fn test_mark_disconnected_unknown_ip_is_noop() {
        let registry = DeviceRegistry::new();
        registry.mark_disconnected("10.0.0.5");
        assert!(registry.is_empty());
    }

    #[test]
    fn test_evict_removes_unseen_available_and_keeps_connected() {
        // Arrange: A available, B connected, neither in the window
        let registry = DeviceRegistry::new();
        registry.upsert("10.0.0.1", "A");
        registry.upsert("10.0.0.2", "B");
        registry.mark_connected("10.0.0.2", "10.0.0.100");

        // Act
        let evicted = registry.evict_stale_available(&seen(&[]));

        // Assert
        assert_eq!(evicted, vec!["10.0.0.1".to_string()]);
        assert!(registry.get("10.0.0.1").is_none());
        assert!(registry.get("10.0.0.2").is_some());
    }

    #[test]
    fn test_evict_keeps_available_devices_seen_in_window() {
        let registry = DeviceRegistry::new();
        registry.upsert("10.0.0.1", "A");
        registry.upsert("10.0.0.3", "C");

        let evicted = registry.evict_stale_available(&seen(&["10.0.0.3"]));

        assert_eq!(evicted, vec!["10.0.0.1".to_string()]);
        assert!(registry.get("10.0.0.3").is_some());
    }

    #[test]
    fn test_snapshot_is_ordered_by_ip() {
        let registry = DeviceRegistry::new();
        registry.upsert("10.0.0.3", "C");
        registry.upsert("10.0.0.1", "A");
        registry.upsert("10.0.0.2", "B");

        let ids: Vec<String> = registry.snapshot().into_iter().map(|d| d.id).collect();

        assert_eq!(ids, vec!["A", "B", "C"]);
    }
}
