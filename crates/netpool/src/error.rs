//! Pool error types.

use std::time::Duration;

use thiserror::Error;

/// Errors that can occur during pool operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum PoolError {
    /// Pool or factory configuration error.
    #[error("invalid pool configuration: {0}")]
    InvalidConfig(String),

    /// Warm-up could not create the initial connections.
    ///
    /// The pool is fully torn down before this is returned.
    #[error("factory is not able to fill the pool")]
    FillFailed(#[source] Box<PoolError>),

    /// Pool is closed.
    #[error("pool is closed")]
    Closed,

    /// No idle connection and no creation permit left.
    #[error("maximum connections ({max}) reached")]
    CapacityExceeded {
        /// Maximum allowed connections.
        max: u32,
    },

    /// The connector exhausted its attempts.
    #[error("failed to connect to {address} after {attempts} attempt(s)")]
    ConnectFailed {
        /// Target address that was dialed.
        address: String,
        /// Number of dial attempts made.
        attempts: u32,
        /// Error from the last attempt.
        #[source]
        source: std::io::Error,
    },

    /// Blocking acquisition was cancelled by the caller.
    #[error("connection acquisition cancelled")]
    Cancelled,

    /// Blocking acquisition did not complete before its deadline.
    #[error("connection acquisition timeout after {0:?}")]
    DeadlineExceeded(Duration),

    /// A return was attempted without a connection.
    #[error("connection is nil, rejecting")]
    NilConnection,

    /// Really closing the underlying transport failed.
    #[error("failed to close connection")]
    Close(#[source] std::io::Error),

    /// Reading from or writing to a borrowed connection failed.
    #[error("connection I/O error")]
    Io(#[from] std::io::Error),
}

impl PoolError {
    /// Check if the failed operation may succeed if simply tried again.
    ///
    /// Exhaustion and timeouts clear as other callers return connections.
    /// A closed pool, bad configuration or an unreachable target do not.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::CapacityExceeded { .. } | Self::DeadlineExceeded(_)
        )
    }

    /// Check if this error means the target could not be reached.
    #[must_use]
    pub fn is_connect_failure(&self) -> bool {
        match self {
            Self::ConnectFailed { .. } => true,
            Self::FillFailed(inner) => inner.is_connect_failure(),
            _ => false,
        }
    }
}

/// Result type for pool operations.
pub type Result<T> = std::result::Result<T, PoolError>;
