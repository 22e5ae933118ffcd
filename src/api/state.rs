//! Application State
//!
//! Shared state accessible by all handlers.
//! Wrapped in Arc for thread-safe sharing across async tasks.

use std::sync::Arc;
use std::time::Instant;

use crate::identity::IdentityResolver;
use crate::session::SessionRegistry;

/// Shared application state for all handlers
#[derive(Clone)]
pub struct AppState {
    /// Live collaboration sessions
    pub registry: Arc<SessionRegistry>,
    /// Verifies tokens presented at upgrade time
    pub identity: Arc<dyn IdentityResolver>,
    /// Server start time for uptime tracking
    pub start_time: Instant,
}

impl AppState {
    pub fn new(registry: Arc<SessionRegistry>, identity: Arc<dyn IdentityResolver>) -> Self {
        Self {
            registry,
            identity,
            start_time: Instant::now(),
        }
    }

    /// Get server uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}
