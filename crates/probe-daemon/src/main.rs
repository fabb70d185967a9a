//! Probe daemon entry point.
//!
//! Discovers devices on the LAN, keeps UDP sessions with the ones an
//! operator connects to, ingests device log lines, and streams device and
//! log updates to WebSocket observers.
//!
//! # Usage
//!
//! ```text
//! probe-daemon [OPTIONS]
//!
//! Options:
//!   --config <PATH>         Config file [default: probe-daemon.toml]
//!   --observer-port <PORT>  WebSocket observer port [config: 8001]
//!   --log-dir <DIR>         Directory for ingested device logs [config: logs]
//!   --time-zone <ZONE>      "UTC", "local", "+HH:MM" or "Asia/Shanghai" [config: UTC]
//! ```
//!
//! # Environment variable overrides
//!
//! | Variable              | Overrides          |
//! |-----------------------|--------------------|
//! | `PROBE_CONFIG`        | `--config`         |
//! | `PROBE_OBSERVER_PORT` | `--observer-port`  |
//! | `PROBE_LOG_DIR`       | `--log-dir`        |
//! | `PROBE_TIME_ZONE`     | `--time-zone`      |
//!
//! CLI values win over the environment, which wins over the config file.
//! `RUST_LOG` wins over `daemon.log_level`.
//!
//! # What happens at startup
//!
//! 1. The config file is loaded (missing file → defaults) and CLI overrides
//!    are applied.
//! 2. `tracing_subscriber` is initialised.
//! 3. [`ProbeCore`] is built, log ingest is started and one eviction sweep is
//!    launched in the background (each when enabled in the config).
//! 4. The observer WebSocket endpoint runs until Ctrl+C, then the core is
//!    shut down.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use anyhow::Context;
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use probe_daemon::infrastructure::storage::config::{load_config, AppConfig, DEFAULT_CONFIG_FILE};
use probe_daemon::infrastructure::ws_server::run_observer_server;
use probe_daemon::ProbeCore;

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Device discovery and probe daemon.
#[derive(Debug, Parser)]
#[command(
    name = "probe-daemon",
    about = "Discovers UDP devices, keeps probe sessions and streams state to observers",
    version
)]
struct Cli {
    /// Path of the TOML config file.  A missing file means all defaults.
    #[arg(long, default_value = DEFAULT_CONFIG_FILE, env = "PROBE_CONFIG")]
    config: PathBuf,

    /// TCP port for the observer WebSocket endpoint.
    #[arg(long, env = "PROBE_OBSERVER_PORT")]
    observer_port: Option<u16>,

    /// Directory ingested device logs are written to.
    #[arg(long, env = "PROBE_LOG_DIR")]
    log_dir: Option<PathBuf>,

    /// Time zone for log timestamps: "UTC", "local", a fixed offset or an IANA name.
    #[arg(long, env = "PROBE_TIME_ZONE")]
    time_zone: Option<String>,
}

impl Cli {
    /// Loads the config file and applies the CLI overrides on top.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be read or
    /// parsed.
    fn into_app_config(self) -> anyhow::Result<AppConfig> {
        let mut config = load_config(&self.config)
            .with_context(|| format!("failed to load config from {}", self.config.display()))?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    fn apply_overrides(self, config: &mut AppConfig) {
        if let Some(port) = self.observer_port {
            config.network.observer_port = port;
        }
        if let Some(dir) = self.log_dir {
            config.log_ingest.directory = dir;
        }
        if let Some(zone) = self.time_zone {
            config.log_ingest.time_zone = zone;
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Cli::parse().into_app_config()?;

    // `RUST_LOG` takes precedence; otherwise use the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.daemon.log_level)),
        )
        .init();

    info!("probe daemon starting");

    let core = Arc::new(ProbeCore::new(&config).context("failed to initialise probe core")?);

    if config.log_ingest.start_on_launch {
        match core.start_log_ingest() {
            Ok(()) => {
                if let Some(path) = core.current_log_file() {
                    info!("device logs go to {}", path.display());
                }
            }
            Err(e) => error!("log ingest not started: {e}"),
        }
    }

    if config.discovery.sweep_on_start {
        if let Err(e) = core.run_eviction_sweep() {
            warn!("initial eviction sweep not started: {e}");
        }
    }

    // ── Graceful shutdown flag ─────────────────────────────────────────────────
    let running = Arc::new(AtomicBool::new(true));
    let running_clone = Arc::clone(&running);
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                running_clone.store(false, Ordering::Relaxed);
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    let observer_addr = SocketAddr::new(
        config.network.bind_ip()?,
        config.network.observer_port,
    );
    let served = run_observer_server(observer_addr, Arc::clone(&core), running).await;

    // Shutdown joins worker threads; keep it off the async workers.
    tokio::task::spawn_blocking(move || core.shutdown())
        .await
        .context("shutdown task failed")?;

    served?;
    info!("probe daemon stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
