//! # netpool-testing
//!
//! Test infrastructure for netpool.
//!
//! ## Features
//!
//! - In-memory [`MockDialer`] with scripted failures and live-connection counts
//! - TCP [`EchoServer`] for exercising the real [`TcpDialer`](netpool::TcpDialer)
//! - Fixture helpers
//!
//! ## Example
//!
//! ```rust,ignore
//! use netpool::{Factory, FactoryConfig, Pool, PoolConfig};
//! use netpool_testing::MockDialer;
//!
//! #[tokio::test]
//! async fn test_with_mock_dialer() {
//!     let dialer = MockDialer::new();
//!     let factory = Factory::new(dialer.clone(), FactoryConfig::new("mock:1")).unwrap();
//!     let pool = Pool::new(PoolConfig::new().max_capacity(3), factory).await.unwrap();
//!
//!     dialer.fail_next(2);
//!     // ...
//! }
//! ```

#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod echo_server;
pub mod fixtures;
pub mod mock_dialer;

pub use echo_server::{EchoServer, EchoServerError};
pub use fixtures::{init_tracing, unreachable_addr};
pub use mock_dialer::MockDialer;
