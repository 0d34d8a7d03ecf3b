//! Application state shared across routes

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::config::Config;
use crate::net::bus::LocalBus;

/// Shared relay state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    /// Topic fan-out shared by every connection
    pub bus: LocalBus,
    /// Open WebSocket connections
    pub connections: Arc<AtomicUsize>,
}

impl AppState {
    pub fn new(config: Config) -> Self {
        Self {
            config: Arc::new(config),
            bus: LocalBus::new(),
            connections: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::Relaxed)
    }
}
