//! Application layer: device bookkeeping and the text the daemon emits.
//!
//! # Modules
//!
//! - **`registry`** – The [`DeviceRegistry`]: every device the daemon knows
//!   about, guarded by one reader/writer lock.
//!
//! - **`scan_window`** – The set of IPs heard during one eviction sweep.
//!
//! - **`responses`** – Formats decoded session frames into the
//!   `CMD_RESP ...` lines observers see.
//!
//! - **`log_line`** – The configured clock, log-line formatting and log file
//!   naming used by log ingest.
//!
//! **Dependency rule**: nothing here opens a socket or spawns a thread.  The
//! `infrastructure` layer drives these types from its worker threads.

pub mod log_line;
pub mod registry;
pub mod responses;
pub mod scan_window;

pub use registry::{DeviceRegistry, UpsertOutcome};
pub use scan_window::ScanWindow;
