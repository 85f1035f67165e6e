//! Connection factory.
//!
//! The factory applies creation policy on top of a [`Connector`]: eager
//! factories dial inside [`Factory::create`], lazy ones hand out an
//! unconnected slot and dial on [`Factory::activate`].

use std::sync::Arc;

use tokio::io::AsyncWriteExt;

use crate::config::FactoryConfig;
use crate::connector::Connector;
use crate::error::PoolError;
use crate::lifecycle::{ConnectionMetadata, ConnectionState};
use crate::transport::{Dialer, TcpDialer};

/// One transport handle plus its lifecycle metadata.
///
/// This is what the pool keeps on its free-list; callers see it wrapped in a
/// [`PooledConnection`](crate::PooledConnection).
pub(crate) struct Slot<S> {
    pub(crate) stream: Option<S>,
    pub(crate) meta: ConnectionMetadata,
}

impl<S> Slot<S> {
    pub(crate) fn unconnected() -> Self {
        Self {
            stream: None,
            meta: ConnectionMetadata::new(ConnectionState::Unconnected),
        }
    }
}

/// Creates, activates, validates and destroys connections for one target.
pub struct Factory<D: Dialer = TcpDialer> {
    connector: Connector<D>,
}

impl Factory<TcpDialer> {
    /// Create a TCP factory.
    pub fn tcp(config: FactoryConfig) -> Result<Self, PoolError> {
        Self::new(TcpDialer::new(), config)
    }
}

impl<D: Dialer> Factory<D> {
    /// Create a factory dialing through `dialer`.
    pub fn new(dialer: D, config: FactoryConfig) -> Result<Self, PoolError> {
        Self::with_shared_dialer(Arc::new(dialer), config)
    }

    /// Create a factory around a dialer that is shared with other factories.
    pub fn with_shared_dialer(dialer: Arc<D>, config: FactoryConfig) -> Result<Self, PoolError> {
        config.validate()?;
        Ok(Self {
            connector: Connector::new(dialer, config),
        })
    }

    /// The factory configuration.
    #[must_use]
    pub fn config(&self) -> &FactoryConfig {
        self.connector.config()
    }

    /// Check if this factory defers dialing.
    #[must_use]
    pub fn is_lazy(&self) -> bool {
        self.connector.config().lazy_connect
    }

    /// Create a connection.
    ///
    /// Eager factories return a connected slot or [`PoolError::ConnectFailed`];
    /// lazy factories return an unconnected slot without dialing.
    pub(crate) async fn create(&self) -> Result<Slot<D::Stream>, PoolError> {
        let mut slot = Slot::unconnected();
        if !self.is_lazy() {
            self.activate(&mut slot).await?;
        }
        tracing::debug!(
            id = %slot.meta.id,
            address = %self.connector.address(),
            lazy = self.is_lazy(),
            "connection created"
        );
        Ok(slot)
    }

    /// Connect the slot if it has no transport yet, and return the transport.
    ///
    /// A failed activation leaves the slot in [`ConnectionState::Failed`] and
    /// may be retried by activating again.
    pub(crate) async fn activate<'a>(
        &self,
        slot: &'a mut Slot<D::Stream>,
    ) -> Result<&'a mut D::Stream, PoolError> {
        let stream = match slot.stream.take() {
            Some(stream) => stream,
            None => {
                slot.meta.state = ConnectionState::Connecting;
                match self.connector.connect().await {
                    Ok(stream) => {
                        slot.meta.state = ConnectionState::Connected;
                        stream
                    }
                    Err(e) => {
                        slot.meta.state = ConnectionState::Failed;
                        return Err(e);
                    }
                }
            }
        };
        Ok(slot.stream.insert(stream))
    }

    /// Shallow liveness check: true iff the slot holds a transport.
    ///
    /// The transport itself is not probed.
    pub(crate) fn validate(&self, slot: &Slot<D::Stream>) -> bool {
        slot.stream.is_some()
    }

    /// Really close the slot's transport, if any.
    pub(crate) async fn destroy(&self, mut slot: Slot<D::Stream>) -> Result<(), PoolError> {
        slot.meta.state = ConnectionState::Closed;
        tracing::debug!(id = %slot.meta.id, "connection destroyed");
        match slot.stream.take() {
            Some(mut stream) => stream.shutdown().await.map_err(PoolError::Close),
            None => Ok(()),
        }
    }
}

impl<D: Dialer> std::fmt::Debug for Factory<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Factory")
            .field("connector", &self.connector)
            .finish()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::io;
    use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::io::DuplexStream;

    #[derive(Default)]
    struct SwitchDialer {
        down: AtomicBool,
        dials: AtomicU32,
    }

    #[async_trait]
    impl Dialer for SwitchDialer {
        type Stream = DuplexStream;

        async fn dial(&self, _protocol: &str, _address: &str) -> io::Result<DuplexStream> {
            self.dials.fetch_add(1, Ordering::SeqCst);
            if self.down.load(Ordering::SeqCst) {
                return Err(io::Error::new(io::ErrorKind::ConnectionRefused, "down"));
            }
            let (client, _server) = tokio::io::duplex(64);
            Ok(client)
        }
    }

    fn factory(lazy: bool) -> (Arc<SwitchDialer>, Factory<SwitchDialer>) {
        let dialer = Arc::new(SwitchDialer::default());
        let config = FactoryConfig::new("mock:1")
            .lazy_connect(lazy)
            .max_connect_retries(1)
            .retry_delay(Duration::ZERO);
        let factory = Factory::with_shared_dialer(dialer.clone(), config).unwrap();
        (dialer, factory)
    }

    #[test]
    fn test_factory_rejects_invalid_config() {
        let result = Factory::new(SwitchDialer::default(), FactoryConfig::default());
        assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_eager_create_connects() {
        let (dialer, factory) = factory(false);

        let slot = factory.create().await.unwrap();
        assert!(factory.validate(&slot));
        assert_eq!(slot.meta.state, ConnectionState::Connected);
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_eager_create_fails() {
        let (dialer, factory) = factory(false);
        dialer.down.store(true, Ordering::SeqCst);

        let result = factory.create().await;
        assert!(matches!(result, Err(PoolError::ConnectFailed { .. })));
    }

    #[tokio::test]
    async fn test_lazy_create_defers_dial() {
        let (dialer, factory) = factory(true);

        let mut slot = factory.create().await.unwrap();
        assert!(!factory.validate(&slot));
        assert_eq!(slot.meta.state, ConnectionState::Unconnected);
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 0);

        factory.activate(&mut slot).await.unwrap();
        assert!(factory.validate(&slot));

        // Already connected: no second dial
        factory.activate(&mut slot).await.unwrap();
        assert_eq!(dialer.dials.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_activation_can_retry() {
        let (dialer, factory) = factory(true);
        let mut slot = factory.create().await.unwrap();

        dialer.down.store(true, Ordering::SeqCst);
        assert!(factory.activate(&mut slot).await.is_err());
        assert_eq!(slot.meta.state, ConnectionState::Failed);

        dialer.down.store(false, Ordering::SeqCst);
        factory.activate(&mut slot).await.unwrap();
        assert_eq!(slot.meta.state, ConnectionState::Connected);
    }

    #[tokio::test]
    async fn test_destroy_is_idempotent_for_unconnected() {
        let (_dialer, lazy) = factory(true);
        let slot = lazy.create().await.unwrap();
        lazy.destroy(slot).await.unwrap();

        let (_dialer, eager) = factory(false);
        let slot = eager.create().await.unwrap();
        eager.destroy(slot).await.unwrap();
    }
}
