//! Shared state for the sync gateway.

use std::sync::Arc;
use std::time::SystemTime;

use crate::store::memory::MemoryStore;

/// Cheaply cloneable handle onto the gateway state.
pub type SharedState = Arc<AppState>;

/// Central gateway state: the shared document tree every client reads,
/// writes, and watches.
pub struct AppState {
    store: MemoryStore,
    started_at: SystemTime,
}

impl AppState {
    /// Construct the gateway state wrapped in an [`Arc`].
    pub fn new() -> SharedState {
        Arc::new(Self {
            store: MemoryStore::new(),
            started_at: SystemTime::now(),
        })
    }

    /// Handle onto the shared document store.
    pub fn store(&self) -> MemoryStore {
        self.store.clone()
    }

    /// Seconds since the gateway started.
    pub fn uptime_secs(&self) -> u64 {
        self.started_at.elapsed().map(|d| d.as_secs()).unwrap_or(0)
    }
}
