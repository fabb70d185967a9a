//! TOML-based configuration for the probe daemon.
//!
//! The daemon reads `probe-daemon.toml` from the working directory unless
//! `--config` names another file.  A missing file is not an error: every
//! field has a default, so the daemon runs out of the box.
//!
//! ```toml
//! [network]
//! discovery_port = 6000
//! session_port = 6001
//!
//! [log_ingest]
//! directory = "logs"
//! time_zone = "+08:00"
//! ```
//!
//! # Serde default values
//!
//! Fields annotated with `#[serde(default = "some_fn")]` use the return value
//! of `some_fn()` when the field is absent from the TOML file.  Whole
//! sections may be omitted too; they fall back to their `Default` impl.

use std::net::IpAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// File name looked up in the working directory when no path is given.
pub const DEFAULT_CONFIG_FILE: &str = "probe-daemon.toml";

/// Error type for configuration file operations.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A file system I/O error occurred.
    #[error("I/O error accessing config at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The TOML content could not be parsed.
    #[error("failed to parse config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    /// `network.bind_address` is not an IP address.
    #[error("invalid bind address {0:?}")]
    BindAddress(String),
}

// ── Config schema types ───────────────────────────────────────────────────────

/// Top-level daemon configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub daemon: DaemonConfig,
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub timing: TimingConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub log_ingest: LogIngestConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DaemonConfig {
    /// `tracing` filter used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Ports and bind address for every socket the daemon opens.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NetworkConfig {
    /// IP address listeners bind to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// UDP port devices broadcast their announcements to.
    #[serde(default = "default_discovery_port")]
    pub discovery_port: u16,
    /// UDP port sessions target on the device.
    #[serde(default = "default_session_port")]
    pub session_port: u16,
    /// UDP port devices send log lines to.
    #[serde(default = "default_log_port")]
    pub log_port: u16,
    /// TCP port of the observer WebSocket endpoint.
    #[serde(default = "default_observer_port")]
    pub observer_port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimingConfig {
    /// Receive timeout of every listener; bounds shutdown latency.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_keepalive_interval_ms")]
    pub keepalive_interval_ms: u64,
    #[serde(default = "default_sweep_duration_secs")]
    pub sweep_duration_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoveryConfig {
    /// Route continuous discovery into an active sweep's window.
    ///
    /// Off by default: a sweep run while continuous discovery is active then
    /// sees an empty window and evicts every `Available` device.
    #[serde(default)]
    pub merge_continuous_into_sweep: bool,
    /// Run one eviction sweep when the daemon starts.
    #[serde(default = "default_true")]
    pub sweep_on_start: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LogIngestConfig {
    /// Directory log files are written to; created if missing.
    #[serde(default = "default_log_directory")]
    pub directory: PathBuf,
    /// `"UTC"`, `"local"`, a fixed offset such as `"+08:00"` or an IANA name
    /// such as `"Asia/Shanghai"`.
    #[serde(default = "default_time_zone")]
    pub time_zone: String,
    #[serde(default = "default_true")]
    pub start_on_launch: bool,
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_log_level() -> String {
    "info".to_string()
}
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_discovery_port() -> u16 {
    6000
}
fn default_session_port() -> u16 {
    6001
}
fn default_log_port() -> u16 {
    6002
}
fn default_observer_port() -> u16 {
    8001
}
fn default_poll_interval_ms() -> u64 {
    500
}
fn default_keepalive_interval_ms() -> u64 {
    1000
}
fn default_sweep_duration_secs() -> u64 {
    5
}
fn default_true() -> bool {
    true
}
fn default_log_directory() -> PathBuf {
    PathBuf::from("logs")
}
fn default_time_zone() -> String {
    "UTC".to_string()
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            discovery_port: default_discovery_port(),
            session_port: default_session_port(),
            log_port: default_log_port(),
            observer_port: default_observer_port(),
        }
    }
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            keepalive_interval_ms: default_keepalive_interval_ms(),
            sweep_duration_secs: default_sweep_duration_secs(),
        }
    }
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            merge_continuous_into_sweep: false,
            sweep_on_start: default_true(),
        }
    }
}

impl Default for LogIngestConfig {
    fn default() -> Self {
        Self {
            directory: default_log_directory(),
            time_zone: default_time_zone(),
            start_on_launch: default_true(),
        }
    }
}

impl NetworkConfig {
    /// Parses `bind_address`.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::BindAddress`] when it is not an IP literal.
    pub fn bind_ip(&self) -> Result<IpAddr, ConfigError> {
        self.bind_address
            .parse()
            .map_err(|_| ConfigError::BindAddress(self.bind_address.clone()))
    }
}

impl TimingConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_millis(self.keepalive_interval_ms.max(1))
    }

    pub fn sweep_duration(&self) -> Duration {
        Duration::from_secs(self.sweep_duration_secs)
    }
}

// ── Config loading ────────────────────────────────────────────────────────────

/// Loads `AppConfig` from `path`, returning `AppConfig::default()` if the
/// file does not exist.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] for file-system errors other than "not found",
/// and [`ConfigError::Parse`] if the TOML is malformed.
pub fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_config(&content),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(AppConfig::default()),
        Err(source) => Err(ConfigError::Io {
            path: path.to_path_buf(),
            source,
        }),
    }
}

/// Parses TOML text into an `AppConfig` and validates the bind address.
///
/// # Errors
///
/// Returns [`ConfigError::Parse`] or [`ConfigError::BindAddress`].
pub fn parse_config(content: &str) -> Result<AppConfig, ConfigError> {
    let cfg: AppConfig = toml::from_str(content)?;
    cfg.network.bind_ip()?;
    Ok(cfg)
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_config_default_has_expected_ports() {
        // Arrange / Act
        let cfg = AppConfig::default();

        // Assert
        assert_eq!(cfg.network.discovery_port, 6000);
        assert_eq!(cfg.network.session_port, 6001);
        assert_eq!(cfg.network.log_port, 6002);
        assert_eq!(cfg.network.observer_port, 8001);
    }

    #[test]
    fn test_app_config_default_timing() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.timing.poll_interval(), Duration::from_millis(500));
        assert_eq!(cfg.timing.keepalive_interval(), Duration::from_secs(1));
        assert_eq!(cfg.timing.sweep_duration(), Duration::from_secs(5));
    }

    #[test]
    fn test_app_config_default_keeps_sweep_quirk() {
        let cfg = AppConfig::default();
        assert!(!cfg.discovery.merge_continuous_into_sweep);
        assert!(cfg.discovery.sweep_on_start);
    }

    #[test]
    fn test_empty_toml_yields_defaults() {
        let cfg = parse_config("").unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_partial_section_keeps_other_defaults() {
        // Arrange
        let toml_str = r#"
            [network]
            session_port = 7001

            [log_ingest]
            time_zone = "+08:00"
        "#;

        // Act
        let cfg = parse_config(toml_str).unwrap();

        // Assert
        assert_eq!(cfg.network.session_port, 7001);
        assert_eq!(cfg.network.discovery_port, 6000);
        assert_eq!(cfg.log_ingest.time_zone, "+08:00");
        assert_eq!(cfg.log_ingest.directory, PathBuf::from("logs"));
    }

    #[test]
    fn test_invalid_bind_address_is_rejected() {
        let result = parse_config("[network]\nbind_address = \"not-an-ip\"\n");
        assert!(matches!(result, Err(ConfigError::BindAddress(_))));
    }

    #[test]
    fn test_malformed_toml_is_parse_error() {
        let result = parse_config("[network\n");
        assert!(matches!(result, Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_load_missing_file_returns_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let cfg = load_config(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(cfg, AppConfig::default());
    }

    #[test]
    fn test_load_reads_file_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(DEFAULT_CONFIG_FILE);
        std::fs::write(&path, "[timing]\nsweep_duration_secs = 2\n").unwrap();

        let cfg = load_config(&path).unwrap();

        assert_eq!(cfg.timing.sweep_duration(), Duration::from_secs(2));
    }

    #[test]
    fn test_config_serializes_and_deserializes_round_trip() {
        let mut cfg = AppConfig::default();
        cfg.discovery.merge_continuous_into_sweep = true;
        cfg.log_ingest.directory = PathBuf::from("/var/log/probe");

        let toml_str = toml::to_string_pretty(&cfg).expect("serialize");
        let restored: AppConfig = toml::from_str(&toml_str).expect("deserialize");

        assert_eq!(cfg, restored);
    }
}
