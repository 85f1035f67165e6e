//! Borrowed connection wrapper.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use uuid::Uuid;

use crate::error::PoolError;
use crate::factory::{Factory, Slot};
use crate::lifecycle::ConnectionMetadata;
use crate::pool::Shared;
use crate::transport::Dialer;

/// A connection borrowed from a pool.
///
/// [`close`](Self::close) returns it: usable connections go back on the
/// free-list, unusable ones are really closed and their capacity is freed.
/// Dropping it without closing does the same, except that a connection that
/// must be closed is dropped without a graceful transport shutdown.
///
/// A lazy connection dials on its first I/O (or on [`connect`](Self::connect))
/// and reports [`PoolError::ConnectFailed`] if that fails.
pub struct PooledConnection<D: Dialer> {
    slot: Slot<D::Stream>,
    factory: Arc<Factory<D>>,
    owner: Weak<Shared<D>>,
    usable: AtomicBool,
    released: bool,
}

impl<D: Dialer> PooledConnection<D> {
    pub(crate) fn new(
        slot: Slot<D::Stream>,
        factory: Arc<Factory<D>>,
        owner: Weak<Shared<D>>,
    ) -> Self {
        Self {
            slot,
            factory,
            owner,
            usable: AtomicBool::new(true),
            released: false,
        }
    }

    /// Stable identifier of the underlying connection.
    #[must_use]
    pub fn id(&self) -> Uuid {
        self.slot.meta.id
    }

    /// Lifecycle metadata of the underlying connection.
    #[must_use]
    pub fn metadata(&self) -> &ConnectionMetadata {
        &self.slot.meta
    }

    /// Check if the transport is established.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.factory.validate(&self.slot)
    }

    pub(crate) fn slot(&self) -> &Slot<D::Stream> {
        &self.slot
    }

    /// Flag the connection as broken so that returning it closes it instead
    /// of pooling it. Irreversible.
    pub fn mark_unusable(&self) {
        self.usable.store(false, Ordering::Release);
    }

    /// Check if the connection may go back on the free-list.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        self.usable.load(Ordering::Acquire)
    }

    /// Establish the transport if this is a lazy connection that has not
    /// dialed yet.
    pub async fn connect(&mut self) -> Result<(), PoolError> {
        self.stream().await.map(|_| ())
    }

    /// Get the transport, dialing first if needed.
    pub async fn stream(&mut self) -> Result<&mut D::Stream, PoolError> {
        self.factory.activate(&mut self.slot).await
    }

    /// Get the transport if it is already established.
    #[must_use]
    pub fn stream_mut(&mut self) -> Option<&mut D::Stream> {
        self.slot.stream.as_mut()
    }

    /// Read bytes into `buf`, returning how many were read.
    pub async fn read(&mut self, buf: &mut [u8]) -> Result<usize, PoolError> {
        let stream = self.stream().await?;
        Ok(stream.read(buf).await?)
    }

    /// Write all of `buf`.
    pub async fn write_all(&mut self, buf: &[u8]) -> Result<(), PoolError> {
        let stream = self.stream().await?;
        Ok(stream.write_all(buf).await?)
    }

    /// Flush buffered writes.
    pub async fn flush(&mut self) -> Result<(), PoolError> {
        let stream = self.stream().await?;
        Ok(stream.flush().await?)
    }

    /// Return the connection to its pool.
    ///
    /// If the connection is unusable, its pool is closed or gone, or it never
    /// came from a pool, the transport is really closed instead and any
    /// shutdown error is reported.
    pub async fn close(mut self) -> Result<(), PoolError> {
        let slot = self.release();
        let rejected = match self.owner.upgrade() {
            Some(pool) => pool.check_in(slot, self.is_usable()),
            None => Some(slot),
        };

        match rejected {
            Some(slot) => self.factory.destroy(slot).await,
            None => Ok(()),
        }
    }

    /// Take the transport out of the pool's management.
    ///
    /// The pool forgets the connection and frees its capacity. Returns `None`
    /// for a lazy connection that never dialed.
    #[must_use]
    pub fn detach(mut self) -> Option<D::Stream> {
        let mut slot = self.release();
        if let Some(pool) = self.owner.upgrade() {
            pool.release_slot();
        }
        tracing::debug!(id = %slot.meta.id, "connection detached from pool");
        slot.stream.take()
    }

    fn release(&mut self) -> Slot<D::Stream> {
        self.released = true;
        std::mem::replace(&mut self.slot, Slot::unconnected())
    }
}

impl<D: Dialer> Drop for PooledConnection<D> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        let slot = self.release();
        if let Some(pool) = self.owner.upgrade() {
            if let Some(slot) = pool.check_in(slot, self.is_usable()) {
                tracing::debug!(id = %slot.meta.id, "dropping rejected connection");
            }
        }
    }
}

impl<D: Dialer> std::fmt::Debug for PooledConnection<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledConnection")
            .field("metadata", &self.slot.meta)
            .field("usable", &self.is_usable())
            .field("connected", &self.is_connected())
            .finish_non_exhaustive()
    }
}
