//! The set of device IPs heard during one eviction sweep.

use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};

/// IPs recorded while a sweep is listening.
///
/// Discovery threads call [`ScanWindow::record`]; the sweep calls
/// [`ScanWindow::take`] once its duration has elapsed.
#[derive(Debug, Default)]
pub struct ScanWindow {
    seen: Mutex<HashSet<String>>,
}

impl ScanWindow {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, ip: &str) {
        let mut seen = self.seen.lock().unwrap_or_else(PoisonError::into_inner);
        if !seen.contains(ip) {
            seen.insert(ip.to_string());
        }
    }

    pub fn contains(&self, ip: &str) -> bool {
        self.seen
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(ip)
    }

    /// Empties the window and returns what it held.
    pub fn take(&self) -> HashSet<String> {
        std::mem::take(&mut *self.seen.lock().unwrap_or_else(PoisonError::into_inner))
    }
}
