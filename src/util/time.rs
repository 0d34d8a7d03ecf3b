//! Time utilities for the client simulation

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Get current Unix timestamp in milliseconds
pub fn unix_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_millis() as u64
}

/// Process start time for uptime tracking
static PROCESS_START: std::sync::OnceLock<Instant> = std::sync::OnceLock::new();

/// Initialize process start time (call once at startup)
pub fn init_process_time() {
    PROCESS_START.get_or_init(Instant::now);
}

/// Get process uptime in seconds
pub fn uptime_secs() -> u64 {
    PROCESS_START
        .get()
        .map(|start| start.elapsed().as_secs())
        .unwrap_or(0)
}

/// Tick rate configuration
pub const SIMULATION_TPS: u32 = 60; // display-refresh cadence
pub const BROADCAST_INTERVAL_MS: u64 = 50; // 20 state broadcasts per second

/// Fixed delta time for a simulation rate (in seconds)
pub fn tick_delta(tps: u32) -> f32 {
    1.0 / tps.max(1) as f32
}

/// Convert a duration in seconds to whole milliseconds
pub fn secs_to_millis(secs: f32) -> u64 {
    (secs.max(0.0) * 1000.0).round() as u64
}

/// A simple timer for measuring durations
#[derive(Debug, Clone)]
pub struct Timer {
    start: Instant,
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_micros(&self) -> u64 {
        self.start.elapsed().as_micros() as u64
    }

    pub fn reset(&mut self) {
        self.start = Instant::now();
    }
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_delta_matches_rate() {
        assert!((tick_delta(60) - 1.0 / 60.0).abs() < f32::EPSILON);
        // A zero rate never divides by zero
        assert_eq!(tick_delta(0), 1.0);
    }

    #[test]
    fn secs_to_millis_rounds() {
        assert_eq!(secs_to_millis(2.5), 2500);
        assert_eq!(secs_to_millis(0.0), 0);
        assert_eq!(secs_to_millis(-1.0), 0);
    }
}
