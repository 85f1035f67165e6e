//! The connection-source abstraction.
//!
//! Code that needs a connection can take any [`ConnectionSource`]: a [`Pool`]
//! that reuses connections, or a [`DirectSource`] that dials a fresh one for
//! every borrow and really closes it on return.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;

use crate::connection::PooledConnection;
use crate::error::PoolError;
use crate::factory::Factory;
use crate::pool::Pool;
use crate::transport::Dialer;

/// Something connections can be borrowed from and returned to.
#[async_trait]
pub trait ConnectionSource<D: Dialer>: Send + Sync {
    /// Borrow a connection without waiting.
    async fn borrow(&self) -> Result<PooledConnection<D>, PoolError>;

    /// Borrow a connection, waiting up to `timeout`.
    async fn blocking_borrow(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PooledConnection<D>, PoolError>;

    /// Return a borrowed connection.
    async fn put(&self, conn: Option<PooledConnection<D>>) -> Result<(), PoolError>;

    /// Close the source. Later borrows fail with [`PoolError::Closed`].
    async fn close(&self);

    /// Number of idle connections.
    fn len(&self) -> usize;

    /// Check if there are no idle connections.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of idle connections.
    fn idle(&self) -> usize;
}

#[async_trait]
impl<D: Dialer> ConnectionSource<D> for Pool<D> {
    async fn borrow(&self) -> Result<PooledConnection<D>, PoolError> {
        Pool::borrow(self).await
    }

    async fn blocking_borrow(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PooledConnection<D>, PoolError> {
        Pool::blocking_borrow(self, timeout).await
    }

    async fn put(&self, conn: Option<PooledConnection<D>>) -> Result<(), PoolError> {
        Pool::put(self, conn).await
    }

    async fn close(&self) {
        Pool::close(self).await;
    }

    fn len(&self) -> usize {
        Pool::len(self)
    }

    fn idle(&self) -> usize {
        Pool::idle(self)
    }
}

/// A source that never pools.
///
/// Each borrow creates a new connection through the factory (dialing unless
/// the factory is lazy) and each return really closes it. There is no
/// capacity bound, so a blocking borrow only waits for the dial itself.
pub struct DirectSource<D: Dialer> {
    factory: Arc<Factory<D>>,
    closed: AtomicBool,
}

impl<D: Dialer> DirectSource<D> {
    /// Create a direct source around a factory.
    pub fn new(factory: Factory<D>) -> Self {
        Self {
            factory: Arc::new(factory),
            closed: AtomicBool::new(false),
        }
    }

    /// Check if the source is closed.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }
}

#[async_trait]
impl<D: Dialer> ConnectionSource<D> for DirectSource<D> {
    async fn borrow(&self) -> Result<PooledConnection<D>, PoolError> {
        if self.is_closed() {
            return Err(PoolError::Closed);
        }
        let slot = self.factory.create().await?;
        Ok(PooledConnection::new(
            slot,
            Arc::clone(&self.factory),
            Weak::new(),
        ))
    }

    async fn blocking_borrow(
        &self,
        timeout: Option<Duration>,
    ) -> Result<PooledConnection<D>, PoolError> {
        match timeout.filter(|t| !t.is_zero()) {
            Some(limit) => tokio::time::timeout(limit, self.borrow())
                .await
                .map_err(|_| PoolError::DeadlineExceeded(limit))?,
            None => self.borrow().await,
        }
    }

    async fn put(&self, conn: Option<PooledConnection<D>>) -> Result<(), PoolError> {
        match conn {
            Some(conn) => conn.close().await,
            None => Err(PoolError::NilConnection),
        }
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
        tracing::debug!(address = %self.factory.config().address, "direct source closed");
    }

    fn len(&self) -> usize {
        0
    }

    fn idle(&self) -> usize {
        0
    }
}

impl<D: Dialer> std::fmt::Debug for DirectSource<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DirectSource")
            .field("factory", &self.factory)
            .field("closed", &self.is_closed())
            .finish()
    }
}
