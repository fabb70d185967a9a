//! Broadcast hubs: self-pruning fan-out of text messages to observers.
//!
//! The daemon keeps two independent hubs, one carrying device snapshots and
//! one carrying log lines.  Each hub owns its membership behind its own lock.
//!
//! # Failure handling
//!
//! [`Hub::publish`] writes the message to every member.  A member whose
//! [`Observer::deliver`] fails is removed from the hub and closed; it is never
//! retried and the failure is not reported to the publisher.  Healthy members
//! are unaffected.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

/// Key under which an observer is registered with a hub.
pub type ObserverId = Uuid;

/// Reason a delivery to an observer failed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ObserverError {
    /// The observer's connection is gone.
    #[error("observer disconnected")]
    Disconnected,
    #[error("write failed: {0}")]
    Write(String),
}

/// The receiving end of a hub subscription.
///
/// Implemented by the observer WebSocket connections; tests supply mocks.
#[cfg_attr(test, mockall::automock)]
pub trait Observer: Send + Sync {
    /// Writes one text message to the observer.
    fn deliver(&self, message: &str) -> Result<(), ObserverError>;

    /// Called once after the observer has been removed for a failed write.
    fn close(&self) {}
}

/// Which hub an observer asks to join.
///
/// Parsed from the observer's registration message, `{"type":"devices"}` or
/// `{"type":"log"}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SubscriptionKind {
    Devices,
    Log,
}

impl fmt::Display for SubscriptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SubscriptionKind::Devices => f.write_str("devices"),
            SubscriptionKind::Log => f.write_str("log"),
        }
    }
}

/// One fan-out point.
pub struct Hub {
    name: &'static str,
    members: Mutex<HashMap<ObserverId, Box<dyn Observer>>>,
}

impl Hub {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            members: Mutex::new(HashMap::new()),
        }
    }

    pub fn subscribe(&self, observer: Box<dyn Observer>) -> ObserverId {
        let id = Uuid::new_v4();
        let count = {
            let mut members = self.lock();
            members.insert(id, observer);
            members.len()
        };
        info!("{} hub: observer {id} subscribed ({count} total)", self.name);
        id
    }

    /// Removes `id`.  Returns `false` if it was not a member.
    pub fn unsubscribe(&self, id: ObserverId) -> bool {
        let removed = self.lock().remove(&id).is_some();
        if removed {
            debug!("{} hub: observer {id} unsubscribed", self.name);
        }
        removed
    }

    /// Sends `message` to every member, pruning members that fail.
    ///
    /// Returns the number of members the message reached.
    pub fn publish(&self, message: &str) -> usize {
        let mut members = self.lock();
        let mut failed = Vec::new();

        for (id, observer) in members.iter() {
            if let Err(e) = observer.deliver(message) {
                debug!("{} hub: dropping observer {id}: {e}", self.name);
                failed.push(*id);
            }
        }

        for id in &failed {
            if let Some(observer) = members.remove(id) {
                observer.close();
            }
        }
        members.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<ObserverId, Box<dyn Observer>>> {
        self.members.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Hub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Hub")
            .field("name", &self.name)
            .field("members", &self.len())
            .finish()
    }
}

/// The device hub and the log hub.
#[derive(Debug)]
pub struct Hubs {
    pub devices: Hub,
    pub log: Hub,
}

impl Hubs {
    pub fn new() -> Self {
        Self {
            devices: Hub::new("devices"),
            log: Hub::new("log"),
        }
    }

    pub fn get(&self, kind: SubscriptionKind) -> &Hub {
        match kind {
            SubscriptionKind::Devices => &self.devices,
            SubscriptionKind::Log => &self.log,
        }
    }
}

impl Default for Hubs {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failing_observer_is_pruned_and_healthy_one_receives() {
        // Arrange
        let hub = Hub::new("test");

        let mut healthy = MockObserver::new();
        healthy
            .expect_deliver()
            .withf(|msg| msg.to_string() == "hello")
            .times(1)
            .returning(|_| Ok(()));
        healthy.expect_close().never();

        let mut failing = MockObserver::new();
        failing
            .expect_deliver()
            .times(1)
            .returning(|_| Err(ObserverError::Disconnected));
        failing.expect_close().times(1).return_const(());

        hub.subscribe(Box::new(healthy));
        hub.subscribe(Box::new(failing));

        // Act
        let reached = hub.publish("hello");

        // Assert
        assert_eq!(reached, 1);
        assert_eq!(hub.len(), 1);
    }

    #[test]
    fn test_pruned_observer_is_not_retried() {
        let hub = Hub::new("test");
        let mut failing = MockObserver::new();
        failing
            .expect_deliver()
            .times(1)
            .returning(|_| Err(ObserverError::Write("broken pipe".to_string())));
        failing.expect_close().times(1).return_const(());
        hub.subscribe(Box::new(failing));

        assert_eq!(hub.publish("first"), 0);
        assert_eq!(hub.publish("second"), 0);
        assert!(hub.is_empty());
    }

    #[test]
    fn test_publish_to_empty_hub_is_noop() {
        let hub = Hub::new("test");
        assert_eq!(hub.publish("anything"), 0);
    }

    #[test]
    fn test_unsubscribe_removes_member() {
        let hub = Hub::new("test");
        let mut observer = MockObserver::new();
        observer.expect_deliver().never();
        let id = hub.subscribe(Box::new(observer));

        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.publish("late"), 0);
    }

    #[test]
    fn test_hubs_are_independent() {
        let hubs = Hubs::new();
        let mut log_observer = MockObserver::new();
        log_observer.expect_deliver().never();
        hubs.log.subscribe(Box::new(log_observer));

        assert_eq!(hubs.devices.publish("[]"), 0);
        assert_eq!(hubs.get(SubscriptionKind::Log).len(), 1);
    }

    #[test]
    fn test_subscription_kind_parses_registration_messages() {
        let devices: SubscriptionKind = serde_json::from_str(r#"{"type":"devices"}"#).unwrap();
        let log: SubscriptionKind = serde_json::from_str(r#"{"type":"log"}"#).unwrap();

        assert_eq!(devices, SubscriptionKind::Devices);
        assert_eq!(log, SubscriptionKind::Log);
        assert!(serde_json::from_str::<SubscriptionKind>(r#"{"type":"metrics"}"#).is_err());
    }
}
