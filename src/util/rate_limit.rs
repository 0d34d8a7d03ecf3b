//! Rate limiting utilities

use governor::{
    clock::DefaultClock,
    state::{InMemoryState, NotKeyed},
    Quota, RateLimiter,
};
use std::num::NonZeroU32;
use std::sync::Arc;

/// Rate limiter type alias
pub type Limiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Create a rate limiter with the specified messages per second
pub fn create_limiter(messages_per_second: u32) -> Arc<Limiter> {
    let quota = Quota::per_second(NonZeroU32::new(messages_per_second).unwrap_or(NonZeroU32::MIN));
    Arc::new(RateLimiter::direct(quota))
}

/// Relay ingress limit per connection
pub const RELAY_RATE_LIMIT: u32 = 60; // Max 60 broadcasts per second

/// Per-connection rate limiter state on the relay
#[derive(Clone)]
pub struct ConnectionRateLimiter {
    broadcast_limiter: Arc<Limiter>,
}

impl ConnectionRateLimiter {
    pub fn new(messages_per_second: u32) -> Self {
        Self {
            broadcast_limiter: create_limiter(messages_per_second),
        }
    }

    /// Check if a broadcast frame is allowed (returns true if allowed)
    pub fn check_broadcast(&self) -> bool {
        self.broadcast_limiter.check().is_ok()
    }
}

impl Default for ConnectionRateLimiter {
    fn default() -> Self {
        Self::new(RELAY_RATE_LIMIT)
    }
}

/// Drop-on-busy throttle driven by caller-supplied timestamps.
///
/// Calls inside the window are rejected, not queued.
#[derive(Debug, Clone)]
pub struct Throttle {
    interval_ms: u64,
    last_ms: Option<u64>,
}

impl Throttle {
    pub fn new(interval_ms: u64) -> Self {
        Self {
            interval_ms,
            last_ms: None,
        }
    }

    /// Returns true and records `now_ms` if the window has elapsed
    pub fn try_acquire(&mut self, now_ms: u64) -> bool {
        if let Some(last) = self.last_ms {
            if now_ms.saturating_sub(last) < self.interval_ms {
                return false;
            }
        }
        self.last_ms = Some(now_ms);
        true
    }

    pub fn interval_ms(&self) -> u64 {
        self.interval_ms
    }

    pub fn reset(&mut self) {
        self.last_ms = None;
    }
}
