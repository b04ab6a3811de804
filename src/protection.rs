//! Charger relay protection
//!
//! Enforces a minimum dwell time between charger on/off/rate transitions so
//! that noisy power samples cannot toggle the relay rapidly.

use std::time::{Duration, Instant};

/// Minimum-dwell guard over charger relay transitions.
///
/// The guard owns the single authoritative last-change timestamp; every
/// accepted transition must go through `record_change`.
#[derive(Debug)]
pub struct ProtectionGuard {
    min_interval: Duration,
    last_change: Option<Instant>,
}

impl ProtectionGuard {
    /// Create a guard with the given minimum dwell; a fresh guard is clear
    pub fn new(min_interval: Duration) -> Self {
        Self {
            min_interval,
            last_change: None,
        }
    }

    /// Time remaining until the next transition is allowed; zero when clear
    pub fn remaining_wait(&self) -> Duration {
        match self.last_change {
            Some(at) => self.min_interval.saturating_sub(at.elapsed()),
            None => Duration::ZERO,
        }
    }

    /// Whether a transition is currently blocked
    pub fn is_blocked(&self) -> bool {
        !self.remaining_wait().is_zero()
    }

    /// Record an accepted transition, restarting the dwell window
    pub fn record_change(&mut self) {
        self.last_change = Some(Instant::now());
    }
}
