//! Domain layer: entities shared between the daemon and its observers.
//!
//! Nothing in here touches sockets or threads.  The registry that stores
//! these records lives in the daemon crate; this module only defines what a
//! device *is* and how it is named before it introduces itself.

pub mod device;

pub use device::{is_placeholder_id, placeholder_id, Device, DeviceStatus, DIRECT_CONNECT_ID};
