//! Connection lifecycle tracking.
//!
//! Every pooled connection carries [`ConnectionMetadata`]: a stable identity,
//! usage timestamps and its establishment [`ConnectionState`].
//!
//! ```text
//! Unconnected -> Connecting -> Connected -> Closed
//!                     |
//!                     +-----> Failed -> Connecting (activate again)
//! ```

use std::time::{Duration, Instant};

use uuid::Uuid;

/// Establishment state of a pooled connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport yet (lazy connection).
    Unconnected,
    /// A connect-with-retry is in progress.
    Connecting,
    /// The transport is established.
    Connected,
    /// The last connect exhausted its attempts; activating again may retry.
    Failed,
    /// The transport was really closed. Terminal.
    Closed,
}

impl ConnectionState {
    /// Check if a connect may be started from this state.
    #[must_use]
    pub fn can_connect(&self) -> bool {
        matches!(self, Self::Unconnected | Self::Failed)
    }

    /// Check if the connection holds a live transport.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected)
    }

    /// Check if the connection is finished.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Metadata about a pooled connection.
#[derive(Debug, Clone)]
pub struct ConnectionMetadata {
    /// Unique identifier, stable across borrows.
    pub id: Uuid,
    /// When the connection was created.
    pub created_at: Instant,
    /// When the connection was last borrowed or returned.
    pub last_used_at: Instant,
    /// Number of times the connection has been borrowed.
    pub checkout_count: u64,
    /// Current establishment state.
    pub state: ConnectionState,
}

impl ConnectionMetadata {
    /// Create metadata for a new connection in the given state.
    pub fn new(state: ConnectionState) -> Self {
        let now = Instant::now();
        Self {
            id: Uuid::new_v4(),
            created_at: now,
            last_used_at: now,
            checkout_count: 0,
            state,
        }
    }

    /// Check if the connection has been idle too long.
    ///
    /// A zero timeout never expires.
    #[must_use]
    pub fn is_idle_expired(&self, idle_timeout: Duration) -> bool {
        !idle_timeout.is_zero() && self.last_used_at.elapsed() > idle_timeout
    }

    /// Mark the connection as borrowed.
    pub fn mark_checkout(&mut self) {
        self.last_used_at = Instant::now();
        self.checkout_count += 1;
    }

    /// Mark the connection as returned to idle.
    pub fn mark_checkin(&mut self) {
        self.last_used_at = Instant::now();
    }
}
