//! Connection identity and in-flight tracking.
//!
//! Ids are per server, so the log lines of a parent and its successor can
//! be told apart by pid plus id.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::observability::metrics;

/// Per-server connection number, starting at 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

impl ConnectionId {
    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

#[derive(Debug, Default)]
struct Counters {
    issued: AtomicU64,
    active: AtomicU64,
}

/// Shared count of connections the serve loop has accepted and not yet
/// finished. Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct ConnectionTracker {
    counters: Arc<Counters>,
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an accepted connection. It stays counted until the guard
    /// drops, which also happens when its task is aborted.
    pub fn track(&self) -> ConnectionGuard {
        let id = ConnectionId(self.counters.issued.fetch_add(1, Ordering::Relaxed) + 1);
        let active = self.counters.active.fetch_add(1, Ordering::SeqCst) + 1;
        metrics::connection_opened(active);
        ConnectionGuard {
            counters: Arc::clone(&self.counters),
            id,
        }
    }

    pub fn active_count(&self) -> u64 {
        self.counters.active.load(Ordering::SeqCst)
    }
}

/// Keeps one connection counted as in flight.
#[derive(Debug)]
pub struct ConnectionGuard {
    counters: Arc<Counters>,
    id: ConnectionId,
}

impl ConnectionGuard {
    pub fn id(&self) -> ConnectionId {
        self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        let active = self.counters.active.fetch_sub(1, Ordering::SeqCst) - 1;
        metrics::connection_closed(active);
        tracing::trace!(connection_id = %self.id, in_flight = active, "Connection closed");
    }
}
