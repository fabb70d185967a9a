//! Eviction sweep: one bounded scan that drops silent `Available` devices.
//!
//! # Cycle
//!
//! 1. Start with an empty [`ScanWindow`].
//! 2. If continuous discovery is stopped, bind a temporary listener on the
//!    discovery port that upserts senders like the continuous listener and
//!    also records them into the window.  If the port cannot be bound the
//!    sweep aborts and evicts nothing.
//! 3. If continuous discovery is running, its senders reach the window only
//!    when `merge_continuous_into_sweep` is set.  Otherwise the window stays
//!    empty and every `Available` device is evicted.
//! 4. Wait for the sweep duration, stop the temporary listener, evict every
//!    `Available` device not in the window and publish a snapshot.
//!
//! Only one sweep runs at a time.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{info, warn};

use super::bind_udp;
use super::discovery::{spawn_listener, DiscoveryService, WindowTap};
use crate::application::{DeviceRegistry, ScanWindow};
use crate::infrastructure::cancel::CancellationToken;
use crate::infrastructure::error::SweepError;
use crate::infrastructure::publisher::Publisher;

/// Result of one completed sweep.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SweepReport {
    /// Distinct IPs heard during the window.
    pub heard: usize,
    /// IPs removed from the registry.
    pub evicted: Vec<String>,
}

/// Marks a sweep as in progress until dropped.
struct SweepClaim(Arc<AtomicBool>);

impl Drop for SweepClaim {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

#[derive(Debug, Clone)]
pub struct EvictionSweep {
    discovery: Arc<DiscoveryService>,
    registry: Arc<DeviceRegistry>,
    publisher: Publisher,
    duration: Duration,
    merge_continuous: bool,
    in_progress: Arc<AtomicBool>,
}

impl EvictionSweep {
    pub fn new(
        discovery: Arc<DiscoveryService>,
        registry: Arc<DeviceRegistry>,
        publisher: Publisher,
        duration: Duration,
        merge_continuous: bool,
    ) -> Self {
        Self {
            discovery,
            registry,
            publisher,
            duration,
            merge_continuous,
            in_progress: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn is_in_progress(&self) -> bool {
        self.in_progress.load(Ordering::Acquire)
    }

    /// Runs one sweep on the calling thread, blocking for its duration.
    ///
    /// # Errors
    ///
    /// - [`SweepError::AlreadyInProgress`] if another sweep is running.
    /// - [`SweepError::Bind`] if the temporary listener cannot bind.
    pub fn run_blocking(&self) -> Result<SweepReport, SweepError> {
        let claim = self.claim()?;
        let report = self.run_cycle();
        drop(claim);
        report
    }

    /// Runs one sweep on a background `probe-sweep` thread.
    ///
    /// The in-progress check happens before the thread is spawned, so a
    /// concurrent request is rejected here rather than inside the thread.
    ///
    /// # Errors
    ///
    /// [`SweepError::AlreadyInProgress`] or [`SweepError::Spawn`].
    pub fn spawn(&self) -> Result<JoinHandle<Result<SweepReport, SweepError>>, SweepError> {
        let claim = self.claim()?;
        let sweep = self.clone();
        std::thread::Builder::new()
            .name("probe-sweep".to_string())
            .spawn(move || {
                let _claim = claim;
                let result = sweep.run_cycle();
                if let Err(e) = &result {
                    warn!("eviction sweep failed: {e}");
                }
                result
            })
            .map_err(SweepError::Spawn)
    }

    fn claim(&self) -> Result<SweepClaim, SweepError> {
        if self.in_progress.swap(true, Ordering::AcqRel) {
            return Err(SweepError::AlreadyInProgress);
        }
        Ok(SweepClaim(Arc::clone(&self.in_progress)))
    }

    fn run_cycle(&self) -> Result<SweepReport, SweepError> {
        let window = Arc::new(ScanWindow::new());
        let mut merged = false;

        let temporary = if self.discovery.is_running() {
            if self.merge_continuous {
                self.discovery.attach_window(Arc::clone(&window));
                merged = true;
            }
            None
        } else {
            Some(self.start_temporary_listener(&window)?)
        };

        info!(
            "eviction sweep listening for {:?} (temporary listener: {}, merged: {merged})",
            self.duration,
            temporary.is_some()
        );
        std::thread::sleep(self.duration);

        if let Some((token, handle)) = temporary {
            token.cancel();
            if handle.join().is_err() {
                warn!("sweep listener panicked");
            }
        }
        if merged {
            self.discovery.detach_window();
        }

        let seen = window.take();
        let evicted = self.registry.evict_stale_available(&seen);
        self.publisher.devices_changed();

        info!(
            "eviction sweep complete: heard {}, evicted {}",
            seen.len(),
            evicted.len()
        );
        Ok(SweepReport {
            heard: seen.len(),
            evicted,
        })
    }

    fn start_temporary_listener(
        &self,
        window: &Arc<ScanWindow>,
    ) -> Result<(CancellationToken, JoinHandle<()>), SweepError> {
        let addr = self.discovery.addr();
        let socket = bind_udp(addr, self.discovery.poll_interval())
            .map_err(|source| SweepError::Bind { addr, source })?;

        let token = CancellationToken::new();
        let handle = spawn_listener(
            "probe-sweep-listener",
            socket,
            token.clone(),
            Arc::clone(&self.registry),
            self.publisher.clone(),
            WindowTap::Fixed(Arc::clone(window)),
        )
        .map_err(SweepError::Spawn)?;
        Ok((token, handle))
    }
}
