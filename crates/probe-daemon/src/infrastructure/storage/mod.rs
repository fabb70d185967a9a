//! File-system storage for the daemon: the TOML config file.

pub mod config;
