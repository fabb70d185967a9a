//! Infrastructure layer for the probe daemon.
//!
//! Contains the OS-facing adapters (UDP listeners and sessions, the
//! observer WebSocket endpoint, the TOML config file) together with the
//! hubs, the publisher thread and the [`control::ProbeCore`] object that
//! wires them up.
//!
//! **Dependency rule**: this layer may depend on `application` and
//! `probe_core`, but MUST NOT be imported by the `application` layer.

pub mod cancel;
pub mod control;
pub mod error;
pub mod hub;
pub mod lifecycle;
pub mod network;
pub mod publisher;
pub mod storage;
pub mod ws_server;
