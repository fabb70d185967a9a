//! # probe-core
//!
//! Shared library for the probe tool containing the device wire codec and
//! the device entity tracked by the daemon.
//!
//! It has zero dependencies on OS APIs, threads, or network sockets.
//!
//! # Architecture overview (for beginners)
//!
//! The probe tool talks to small networked devices over UDP.  Devices
//! announce themselves with a broadcast datagram, and once an operator opens
//! a session the daemon and the device exchange *frames*: a fixed 25-byte
//! preamble followed by an opaque data blob.
//!
//! This crate (`probe-core`) is the shared foundation.  It defines:
//!
//! - **`protocol`** – How bytes travel over the network.  Frames are encoded
//!   into the little-endian layout the device firmware expects and decoded
//!   back into a borrowed [`Frame`] view.
//!
//! - **`domain`** – The [`Device`] record that the daemon's registry keeps for
//!   every IP it has heard from, plus the naming rules for devices that have
//!   not announced an identifier yet.

pub mod domain;
pub mod protocol;

pub use domain::device::{is_placeholder_id, placeholder_id, Device, DeviceStatus, DIRECT_CONNECT_ID};
pub use protocol::codec::{checksum, decode_frame, encode_frame, keepalive_frame, ProtocolError};
pub use protocol::frame::Frame;
