//! Connect-with-retry.

use std::io;
use std::sync::Arc;

use tokio::time::{sleep, timeout};

use crate::config::FactoryConfig;
use crate::error::PoolError;
use crate::transport::Dialer;

/// Establishes transport connections to one target with bounded retries.
///
/// Makes at most `max_connect_retries` dial attempts, sleeping a fixed
/// `retry_delay` between them. The delay does not grow, so the worst-case
/// wait is `attempts * connect_timeout + (attempts - 1) * retry_delay`.
pub struct Connector<D: Dialer> {
    dialer: Arc<D>,
    config: FactoryConfig,
}

impl<D: Dialer> Connector<D> {
    /// Create a connector for the configured target.
    pub fn new(dialer: Arc<D>, config: FactoryConfig) -> Self {
        Self { dialer, config }
    }

    /// The factory configuration this connector dials with.
    #[must_use]
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    /// The target address.
    #[must_use]
    pub fn address(&self) -> &str {
        &self.config.address
    }

    /// Dial until an attempt succeeds or the attempts run out.
    ///
    /// Fails with [`PoolError::ConnectFailed`] carrying the last dial error.
    pub async fn connect(&self) -> Result<D::Stream, PoolError> {
        let max_attempts = self.config.max_connect_retries;
        let mut last_err = io::Error::new(
            io::ErrorKind::InvalidInput,
            "no connect attempts configured",
        );

        for attempt in 1..=max_attempts {
            match self.attempt().await {
                Ok(stream) => {
                    tracing::debug!(
                        address = %self.config.address,
                        attempt = attempt,
                        "transport connected"
                    );
                    return Ok(stream);
                }
                Err(e) => {
                    tracing::warn!(
                        address = %self.config.address,
                        attempt = attempt,
                        max_attempts = max_attempts,
                        error = %e,
                        "connect attempt failed"
                    );
                    last_err = e;
                }
            }

            if attempt < max_attempts && !self.config.retry_delay.is_zero() {
                sleep(self.config.retry_delay).await;
            }
        }

        Err(PoolError::ConnectFailed {
            address: self.config.address.clone(),
            attempts: max_attempts,
            source: last_err,
        })
    }

    async fn attempt(&self) -> io::Result<D::Stream> {
        let dial = self.dialer.dial(&self.config.protocol, &self.config.address);
        match self.config.attempt_timeout() {
            Some(limit) => timeout(limit, dial).await.map_err(|_| {
                io::Error::new(
                    io::ErrorKind::TimedOut,
                    format!("connect timed out after {limit:?}"),
                )
            })?,
            None => dial.await,
        }
    }
}

impl<D: Dialer> std::fmt::Debug for Connector<D> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connector")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
