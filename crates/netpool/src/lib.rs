//! # netpool
//!
//! Bounded pool of reusable network connections to a single target.
//!
//! Creating a connection means a handshake and often a retry loop, so the
//! pool keeps a free-list of idle connections and hands them back out. The
//! number of live connections never exceeds the configured maximum.
//!
//! ## Features
//!
//! - Eager warm-up of an initial number of connections
//! - Non-blocking borrow, and blocking borrow with deadline and cancellation
//! - Connect-with-retry with a fixed delay and a per-attempt timeout
//! - Lazy connections that dial on first use
//! - Idle timeout eviction
//! - Marking a connection unusable so it is closed instead of pooled
//! - Pluggable transports through the [`Dialer`] trait
//!
//! ## Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use netpool::Pool;
//!
//! let pool = Pool::builder()
//!     .address("127.0.0.1:8080")
//!     .initial_capacity(5)
//!     .max_capacity(30)
//!     .retry_delay(Duration::from_millis(100))
//!     .build()
//!     .await?;
//!
//! let mut conn = pool.blocking_borrow(Some(Duration::from_secs(5))).await?;
//! conn.write_all(b"ping\n").await?;
//! // Hand it back; a broken connection should be marked unusable first
//! conn.close().await?;
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod config;
pub mod connection;
pub mod connector;
pub mod error;
pub mod factory;
pub mod lifecycle;
pub mod metrics;
pub mod pool;
pub mod source;
pub mod transport;

pub use config::{FactoryConfig, PoolConfig};
pub use connection::PooledConnection;
pub use connector::Connector;
pub use error::{PoolError, Result};
pub use factory::Factory;
pub use lifecycle::{ConnectionMetadata, ConnectionState};
pub use metrics::{MetricsSnapshot, PoolMetrics};
pub use pool::{Pool, PoolBuilder, PoolStatus};
pub use source::{ConnectionSource, DirectSource};
pub use transport::{Dialer, TcpDialer};

/// Re-exported so callers can cancel blocking borrows without a direct
/// `tokio-util` dependency.
pub use tokio_util::sync::CancellationToken;
