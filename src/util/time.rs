//! Time utilities for the synchronization core

use std::time::{Duration, Instant};

/// Process-wide epoch that network time is measured from
static NETWORK_EPOCH: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize the network epoch (call once at startup)
pub fn init_network_time() {
    NETWORK_EPOCH.get_or_init(Instant::now);
}

/// Seconds since the network epoch.
///
/// Every command and snapshot timestamp is expressed on this clock. In the
/// loopback binary all roles share one process, so they share the epoch.
pub fn network_time() -> f64 {
    NETWORK_EPOCH
        .get_or_init(Instant::now)
        .elapsed()
        .as_secs_f64()
}

/// Duration of one server tick at the given rate
pub fn tick_duration(tick_rate: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(tick_rate.max(1)))
}

/// Monotonic clock reporting seconds, with a manual mode for tests
#[derive(Debug, Clone)]
pub enum NetworkClock {
    /// Reads the process network time
    System,
    /// Fixed time, advanced explicitly
    Manual(f64),
}

impl NetworkClock {
    pub fn now(&self) -> f64 {
        match self {
            Self::System => network_time(),
            Self::Manual(t) => *t,
        }
    }

    /// Move a manual clock forward; no-op on the system clock
    pub fn advance(&mut self, secs: f64) {
        if let Self::Manual(t) = self {
            *t += secs;
        }
    }
}

impl Default for NetworkClock {
    fn default() -> Self {
        Self::System
    }
}
