//! Pool lifecycle counters.

use std::sync::atomic::{AtomicU64, Ordering};

/// Monotonic counters for pool lifecycle events.
#[derive(Debug, Default)]
pub struct PoolMetrics {
    connections_created: AtomicU64,
    connections_closed: AtomicU64,
    borrows: AtomicU64,
    borrow_timeouts: AtomicU64,
    connect_failures: AtomicU64,
}

impl PoolMetrics {
    pub(crate) fn record_created(&self) {
        self.connections_created.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_closed(&self) {
        self.connections_closed.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_borrow(&self) {
        self.borrows.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self) {
        self.borrow_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_connect_failure(&self) {
        self.connect_failures.fetch_add(1, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters.
    #[must_use]
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_created: self.connections_created.load(Ordering::Relaxed),
            connections_closed: self.connections_closed.load(Ordering::Relaxed),
            borrows: self.borrows.load(Ordering::Relaxed),
            borrow_timeouts: self.borrow_timeouts.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PoolMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    /// Connections created (eager or lazy).
    pub connections_created: u64,
    /// Connections really closed.
    pub connections_closed: u64,
    /// Successful borrows.
    pub borrows: u64,
    /// Blocking borrows that hit their deadline.
    pub borrow_timeouts: u64,
    /// Creations or activations that exhausted their connect attempts.
    pub connect_failures: u64,
}
